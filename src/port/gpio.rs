//! The DE-line GPIO contract (§6.3, §4.5.2) and its hosted implementation.
//!
//! Grounded in `port_rs485.c`'s ARM-only `nre_de_init`/`nre_de_set`/`nre_de_del`
//! (guarded by `#if (PORT_IMPL==PORT_IMPL_LINUX)&&(LINUX_HW_IMPL==LINUX_HW_IMPL_ARM)`)
//! and the sibling `gpio.h`. The spec's "GPIO via `/sys/class/gpio`, no-op on
//! WSL" split is modeled as two [`Gpio`] impls selected by the host at
//! construction rather than a compile-time `#if`, per DESIGN NOTES §9.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Contract for the RS-485 driver-enable line: drive it high while
/// transmitting, low while receiving.
pub trait Gpio: Send {
    fn set_high(&mut self) -> io::Result<()>;
    fn set_low(&mut self) -> io::Result<()>;
}

/// No-op DE line, for boards with no separate direction pin (the original's
/// WSL development target, or a USB-RS485 adapter that manages direction
/// internally).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGpio;

impl Gpio for NullGpio {
    fn set_high(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_low(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A `/sys/class/gpio`-backed DE line, for the original's ARM target.
/// Exports the pin on construction and writes `value` directly rather than
/// going through a `c-periphery`-style handle, since that library has no
/// Rust binding in this pack's dependency set.
pub struct SysfsGpio {
    value_path: PathBuf,
    pin: u32,
}

impl SysfsGpio {
    /// Exports `pin` under `gpio_path` (normally `/sys/class/gpio`) and sets
    /// its direction to `out`, mirroring `nre_de_init`.
    pub fn open(gpio_path: &str, pin: u32) -> io::Result<Self> {
        let base = PathBuf::from(gpio_path);
        let gpio_dir = base.join(format!("gpio{pin}"));
        if !gpio_dir.exists() {
            fs::write(base.join("export"), pin.to_string())?;
        }
        fs::write(gpio_dir.join("direction"), "out")?;
        Ok(SysfsGpio {
            value_path: gpio_dir.join("value"),
            pin,
        })
    }

    fn write_value(&mut self, v: &str) -> io::Result<()> {
        fs::write(&self.value_path, v)
    }
}

impl Gpio for SysfsGpio {
    fn set_high(&mut self) -> io::Result<()> {
        self.write_value("1")
    }

    fn set_low(&mut self) -> io::Result<()> {
        self.write_value("0")
    }
}

impl Drop for SysfsGpio {
    /// Unexports the pin, mirroring `nre_de_del`.
    fn drop(&mut self) {
        if let Some(gpio_dir) = self.value_path.parent() {
            if let Some(base) = gpio_dir.parent() {
                let _ = fs::write(base.join("unexport"), self.pin.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_gpio_never_fails() {
        let mut gpio = NullGpio;
        gpio.set_high().unwrap();
        gpio.set_low().unwrap();
    }
}
