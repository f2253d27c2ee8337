//! Example SLAVE binary, mirroring `samples/ser2mms_slave.c`: receives
//! parameter writes and subscription updates, replies with a short answer
//! frame. The attribute-store binding (`ser2mms_read_page`/`read_subs`/
//! `write_answer`/`get_time` in the original) is a `PayloadApi` impl that
//! just prints what it would forward to an IEC-61850 model — wiring an
//! actual MMS stack is out of scope per spec §1.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use log::info;

use ser2mms::ser::{PayloadApi, SubsMode};
use ser2mms::types::{Answ, Page, SubBank};
use ser2mms::{CrcVariant, Gateway, GatewayConfig, Role};

/// RS-485 SLAVE gateway: answers parameter/time requests from a POLL master.
#[derive(Parser, Debug)]
#[command(name = "ser2mms-slave")]
struct Args {
    /// Serial device path (e.g. /dev/ttyUSB0).
    #[arg(long, default_value = "/dev/ttyUSB0")]
    device: String,

    /// Bus address owned by this endpoint.
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

struct DemoSlave;

impl PayloadApi for DemoSlave {
    fn read_page(&mut self, page: &Page, ds: u8, page_idx: u8) {
        info!("read_page: ds={ds} page={page_idx} values={page:?}");
    }

    fn read_subs(&mut self, subs: &SubBank) {
        info!("read_subs: first record = {:?}", subs[0]);
    }

    fn write_answer(&mut self) -> Answ {
        Answ {
            values: [1, 2, 3],
            len: 3,
        }
    }

    fn get_time(&mut self) -> (u32, u32) {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        (now.as_secs() as u32, now.subsec_micros())
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

    let mut config = GatewayConfig::new(Role::Slave, &args.device)
        .with_id(args.id)
        .with_crc(crc)
        .with_subs_mode(if args.reduced { SubsMode::Reduced } else { SubsMode::Full })
        .with_threaded(args.threaded);
    config.port.gpio_path = args.gpio_path;
    config.port.gpio_pin = args.gpio_pin;

    let mut gateway = Gateway::new(DemoSlave, &config)?;
    gateway.run()?;
    info!("slave gateway running on {} (id={})", args.device, args.id);

    let term_requested = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, term_requested.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, term_requested.clone())?;

    while !term_requested.load(Ordering::SeqCst) {
        if !args.threaded {
            gateway.poll();
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    gateway.destroy();
    Ok(())
}
