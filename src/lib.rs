//! `ser2mms`: a half-duplex RS-485 serial gateway bridging a proprietary
//! poll/response wire protocol to an IEC-61850-style data-attribute model.
//!
//! The three layers that matter are [`transp`] (framing, CRC, line
//! turnaround), [`ser`] (the application PDU codec and the dataset/page
//! schedule), and [`gateway`] (the facade that wires the two together and
//! owns the optional worker thread). Everything under [`port`] is a
//! contract the host implements or the crate provides a hosted-Linux
//! default for; binding decoded values into an actual IEC-61850 attribute
//! store is the caller's [`ser::PayloadApi`] implementation, not this
//! crate's concern.

pub mod buffer;
pub mod byte_codec;
pub mod config;
pub mod crc16;
pub mod error;
pub mod event;
pub mod gateway;
pub mod port;
pub mod ser;
pub mod transp;
pub mod types;

pub use config::{GatewayConfig, PortConfig};
pub use crc16::CrcVariant;
pub use error::{FrameError, FrameResult, GatewayError};
pub use gateway::Gateway;
pub use ser::{NullPayloadApi, PayloadApi, SubsMode};
pub use types::{Answ, Cmd, Page, Role, ScheduleCursor, Sub, SubBank};
