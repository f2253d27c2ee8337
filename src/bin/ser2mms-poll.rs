//! Example POLL binary, mirroring `samples/ser2mms_poll.c`: walks the
//! `(ds, page)` schedule, issues parameter/time requests, and consumes the
//! slave's replies. `SIGQUIT` drives `test_tick` (manual schedule advance,
//! matching the original's `ser2mms_test_tick` hook) and `SIGINT` toggles
//! the outgoing command between `Parameters` and `TimeSet`, matching
//! `handler_sigint`'s `mode ^= 1` behavior.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use log::info;

use ser2mms::ser::{PayloadApi, SubsMode};
use ser2mms::types::{Answ, Page, SubBank, DS_MIN};
use ser2mms::{Cmd, CrcVariant, Gateway, GatewayConfig, Role};

/// RS-485 POLL gateway: walks the dataset/page schedule against a SLAVE.
#[derive(Parser, Debug)]
#[command(name = "ser2mms-poll")]
struct Args {
    /// Serial device path (e.g. /dev/ttyUSB1).
    #[arg(long, default_value = "/dev/ttyUSB1")]
    device: String,

    /// Bus address of the SLAVE this engine polls.
    #[arg(long, default_value_t = 12)]
    id: u8,

    /// CRC byte ordering: "modbus" (low byte first) or "reverse" (high byte first).
    #[arg(long, default_value = "modbus")]
    crc: String,

    /// Omit the subscription block and use the shorter inbound frame size.
    #[arg(long)]
    reduced: bool,

    /// Run the protocol engine on its own worker thread instead of being
    /// driven cooperatively from this process's main loop.
    #[arg(long)]
    threaded: bool,

    /// Sysfs GPIO chip directory for the DE line (ARM target only).
    #[arg(long)]
    gpio_path: Option<String>,

    /// DE line pin number within `gpio_path`.
    #[arg(long)]
    gpio_pin: Option<u32>,
}

/// Produces the same `ds`-dependent page values as `ser2mms_write_page` in
/// the original sample: dataset 1 cycles `[1,2,3] .. [10,11,12]` across its
/// four pages, all other datasets are empty.
struct DemoPoll;

impl PayloadApi for DemoPoll {
    fn write_page(&mut self, page: &mut Page, ds: u8, page_idx: u8) -> usize {
        if ds != DS_MIN {
            return 0;
        }
        let base = 1 + page_idx as i16 * 3;
        page[0] = base;
        page[1] = base + 1;
        page[2] = base + 2;
        3
    }

    fn write_subs(&mut self, subs: &mut SubBank) -> usize {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let epoch = now.as_secs() as u32;
        let msec = (now.subsec_millis()) as u16;
        for (i, sub) in subs.iter_mut().enumerate() {
            sub.mag = i as i16;
            sub.t_epoch = epoch;
            sub.t_msec = msec;
        }
        subs.len()
    }

    fn read_answer(&mut self, answ: &Answ) {
        info!("read_answer: {:?}", answ.as_slice());
    }

    fn read_time(&mut self, epoch: u32, usec: u32) {
        info!("read_time: epoch={epoch} usec={usec}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let crc = match args.crc.to_ascii_lowercase().as_str() {
        "modbus" => CrcVariant::Modbus,
        "reverse" | "yura" => CrcVariant::Reverse,
        other => return Err(format!("unknown --crc variant: {other}").into()),
    };

    let mut config = GatewayConfig::new(Role::Poll, &args.device)
        .with_id(args.id)
        .with_crc(crc)
        .with_subs_mode(if args.reduced { SubsMode::Reduced } else { SubsMode::Full })
        .with_threaded(args.threaded);
    config.port.gpio_path = args.gpio_path;
    config.port.gpio_pin = args.gpio_pin;

    let mut gateway = Gateway::new(DemoPoll, &config)?;
    gateway.run()?;
    info!("poll gateway running against {} (id={})", args.device, args.id);

    let term_requested = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, term_requested.clone())?;

    let mode: Arc<AtomicU8> = Arc::new(AtomicU8::new(0));
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGQUIT,
        signal_hook::consts::SIGINT,
    ])?;

    // Drive the signal-triggered test hooks from this thread's own poll
    // loop (the engine's worker thread, if any, runs independently).
    while !term_requested.load(Ordering::SeqCst) {
        for sig in signals.pending() {
            match sig {
                s if s == signal_hook::consts::SIGQUIT => {
                    info!("SIGQUIT: test_tick");
                    gateway.test_tick();
                }
                s if s == signal_hook::consts::SIGINT => {
                    let new_mode = mode.fetch_xor(1, Ordering::SeqCst) ^ 1;
                    let cmd = if new_mode & 1 != 0 { Cmd::TimeSet } else { Cmd::Parameters };
                    info!("SIGINT: set_cmd({cmd:?})");
                    gateway.set_cmd(cmd);
                }
                _ => {}
            }
        }
        if !args.threaded {
            gateway.poll();
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    gateway.destroy();
    Ok(())
}
