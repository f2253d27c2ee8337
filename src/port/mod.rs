//! Port contracts: the seams the core protocol engine is specified against
//! but does not implement itself — the serial device driver, DE-line GPIO,
//! worker thread spawning, and timers. Each submodule defines a trait (the
//! contract) plus a hosted Linux implementation.
//!
//! Grounded in `src/port/include/*.h` from the original source
//! (`port_rs485.h`, `port_thread.h`, `port_tmr.h`) and, for the concrete
//! serial implementation, in `other_examples`'s `dynamixel2-rs`, which wraps
//! the same `serial2` crate around a half-duplex RS-485-like bus.

pub mod gpio;
pub mod pps;
pub mod serial;
pub mod thread;
pub mod timer;

pub use gpio::{Gpio, NullGpio, SysfsGpio};
pub use serial::{Serial2Link, SerialLink};
pub use thread::{StdThread, Thread};
pub use timer::{StdTimer, Timer};
