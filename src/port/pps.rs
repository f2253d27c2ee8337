//! 1-PPS generator port (SPEC_FULL §2 supplemented feature).
//!
//! Grounded in `src/port/linux/0/port_pps.c`'s `pps_init`/`pps_enable`/
//! `pps_del`, which drives a `/sys/class/pwm` channel as a free-running
//! square wave used for external time-sync. Spec §1 calls this "optional"
//! and out of the protocol engine's core scope; kept here as a small,
//! separately-testable port, not wired into [`crate::gateway::Gateway`]
//! construction.

use std::fs;
use std::io;
use std::path::PathBuf;

/// Contract for a PWM-backed 1-PPS output channel.
pub trait PpsPort: Send {
    fn enable(&mut self, on: bool) -> io::Result<()>;
}

/// A `/sys/class/pwm`-backed [`PpsPort`], mirroring `pps_init`'s
/// export/period/duty_cycle sequence.
pub struct SysfsPps {
    chip_path: PathBuf,
    channel: u32,
    exported: bool,
}

impl SysfsPps {
    /// Exports `channel` under `chip_path` and programs `period_ns`/
    /// `duty_cycle_ns`, matching `pps_init`. `duty_cycle_ns` must not exceed
    /// `period_ns`.
    pub fn open(chip_path: &str, channel: u32, period_ns: u64, duty_cycle_ns: u64) -> io::Result<Self> {
        if duty_cycle_ns > period_ns {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "duty cycle exceeds period",
            ));
        }
        let chip_path = PathBuf::from(chip_path);
        fs::write(chip_path.join("export"), channel.to_string())?;
        std::thread::sleep(std::time::Duration::from_millis(100));

        let channel_dir = chip_path.join(format!("pwm{channel}"));
        fs::write(channel_dir.join("period"), period_ns.to_string())?;
        fs::write(channel_dir.join("duty_cycle"), duty_cycle_ns.to_string())?;

        Ok(SysfsPps {
            chip_path,
            channel,
            exported: true,
        })
    }

    fn channel_dir(&self) -> PathBuf {
        self.chip_path.join(format!("pwm{}", self.channel))
    }
}

impl PpsPort for SysfsPps {
    fn enable(&mut self, on: bool) -> io::Result<()> {
        fs::write(self.channel_dir().join("enable"), if on { "1" } else { "0" })
    }
}

impl Drop for SysfsPps {
    /// Unexports the channel, mirroring `pps_del`.
    fn drop(&mut self) {
        if self.exported {
            let _ = fs::write(self.chip_path.join("unexport"), self.channel.to_string());
        }
    }
}
