//! Runtime gateway configuration, replacing the original's C preprocessor
//! knobs (`S2M_USE_STATIC`, `S2M_USE_THREADS`, `S2M_REDUCED`,
//! `CRC_MODBUS`/`CRC_YURA`, `PORT_IMPL_*`, `LINUX_HW_IMPL_*`) with a single
//! record, per DESIGN NOTES §9. Parsed from TOML via `serde` for the example
//! binaries, or built programmatically by library users.

use serde::Deserialize;

use crate::crc16::CrcVariant;
use crate::ser::SubsMode;
use crate::types::Role;

/// Serial line parameters (§6.3: "115200 or 230400 8N2").
#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    pub device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    pub gpio_path: Option<String>,
    pub gpio_pin: Option<u32>,
}

fn default_baud_rate() -> u32 {
    115_200
}

/// Full gateway configuration. `Default` picks the reduced, single-threaded,
/// Modbus-CRC, id-1 SLAVE shape used by the unit tests and the scenarios in
/// spec §8; the example binaries override every field from `clap` args or a
/// TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub role: Role,
    #[serde(default = "default_id")]
    pub id: u8,
    #[serde(default)]
    pub crc: CrcVariant,
    #[serde(default)]
    pub subs_mode: SubsMode,
    #[serde(default)]
    pub threaded: bool,
    pub port: PortConfig,
}

fn default_id() -> u8 {
    1
}

impl GatewayConfig {
    /// Builder entry point for programmatic construction (no TOML file).
    pub fn new(role: Role, device: impl Into<String>) -> Self {
        GatewayConfig {
            role,
            id: default_id(),
            crc: CrcVariant::default(),
            subs_mode: SubsMode::default(),
            threaded: false,
            port: PortConfig {
                device: device.into(),
                baud_rate: default_baud_rate(),
                gpio_path: None,
                gpio_pin: None,
            },
        }
    }

    pub fn with_id(mut self, id: u8) -> Self {
        self.id = id;
        self
    }

    pub fn with_crc(mut self, crc: CrcVariant) -> Self {
        self.crc = crc;
        self
    }

    pub fn with_subs_mode(mut self, subs_mode: SubsMode) -> Self {
        self.subs_mode = subs_mode;
        self
    }

    pub fn with_threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    /// Parses a `GatewayConfig` from a TOML document, per the config-file
    /// half of DESIGN NOTES §9.
    pub fn from_toml(text: &str) -> Result<Self, crate::error::GatewayError> {
        toml::from_str(text).map_err(|e| crate::error::GatewayError::Config(e.to_string()))
    }
}

impl serde::Serialize for CrcVariant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            CrcVariant::Modbus => "modbus",
            CrcVariant::Reverse => "reverse",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> serde::Deserialize<'de> for CrcVariant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "modbus" => Ok(CrcVariant::Modbus),
            "reverse" | "yura" => Ok(CrcVariant::Reverse),
            other => Err(serde::de::Error::custom(format!("unknown CRC variant: {other}"))),
        }
    }
}

impl serde::Serialize for SubsMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            SubsMode::Full => "full",
            SubsMode::Reduced => "reduced",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> serde::Deserialize<'de> for SubsMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(SubsMode::Full),
            "reduced" => Ok(SubsMode::Reduced),
            other => Err(serde::de::Error::custom(format!("unknown subscription mode: {other}"))),
        }
    }
}

impl serde::Serialize for Role {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            Role::Slave => "slave",
            Role::Poll => "poll",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> serde::Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "slave" => Ok(Role::Slave),
            "poll" => Ok(Role::Poll),
            other => Err(serde::de::Error::custom(format!("unknown role: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml() {
        let text = r#"
            role = "slave"
            id = 12

            [port]
            device = "/dev/ttyUSB0"
        "#;
        let cfg = GatewayConfig::from_toml(text).unwrap();
        assert_eq!(cfg.role, Role::Slave);
        assert_eq!(cfg.id, 12);
        assert_eq!(cfg.port.baud_rate, 115_200);
        assert_eq!(cfg.crc, CrcVariant::Modbus);
        assert_eq!(cfg.subs_mode, SubsMode::Reduced);
    }

    #[test]
    fn builder_defaults_match_toml_defaults() {
        let cfg = GatewayConfig::new(Role::Poll, "/dev/ttyUSB1");
        assert_eq!(cfg.id, 1);
        assert!(!cfg.threaded);
        assert_eq!(cfg.port.baud_rate, 115_200);
    }

    #[test]
    fn rejects_unknown_crc_variant() {
        let text = r#"
            role = "slave"
            crc = "bogus"

            [port]
            device = "/dev/ttyUSB0"
        "#;
        assert!(GatewayConfig::from_toml(text).is_err());
    }
}
