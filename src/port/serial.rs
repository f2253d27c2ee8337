//! The serial link contract (§6.3) and its hosted implementation.
//!
//! `port_rs485.h`'s `rs485_new`/`rs485_poll_rx`/`rs485_poll_tx`/`rs485_put`
//! shape is carried over as `open`/`rx_drain`/`tx_write`; `set_de` replaces
//! the GPIO toggling that `port_rs485.c` does inline on ARM targets (kept
//! as a separate [`crate::port::Gpio`] dependency here instead, so the link
//! and the DE line can be unit-tested independently).

use std::io;
use std::time::Duration;

/// Contract for a half-duplex serial device: open/close, drain inbound
/// bytes without blocking past a short budget, write outbound bytes, and
/// toggle the DE (driver-enable) line for bus turnaround.
pub trait SerialLink: Send {
    /// Reads up to `buf.len()` bytes, returning the number read. Must not
    /// block longer than this link's configured read timeout (§6.3: "a
    /// small select/poll with <= 1 ms budget").
    fn rx_drain(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes `bytes`, blocking until the whole slice is queued with the
    /// OS (not necessarily drained onto the wire).
    fn tx_write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Drives the DE line high (transmitting) or low (receiving). A no-op
    /// on links with no separate DE control (e.g. a USB-RS485 adapter that
    /// manages it internally).
    fn set_de(&mut self, _on: bool) {}
}

/// A `serial2`-backed [`SerialLink`] for POSIX hosts. Opens the device at a
/// fixed baud rate, 8 data bits, 2 stop bits, no parity — matching the
/// 115200/230400 8N2 line discipline called out in §6.3.
pub struct Serial2Link {
    port: serial2::SerialPort,
}

impl Serial2Link {
    /// Opens `path` at `baud_rate` (115200 or 230400 per §6.3), configured
    /// 8 data bits / 2 stop bits / no parity, with a short read timeout so
    /// `rx_drain` never blocks the poll loop for long.
    pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
        let mut settings = serial2::Settings::default();
        settings.set_raw();
        settings.set_baud_rate(baud_rate)?;
        settings.set_char_size(serial2::CharSize::Bits8);
        settings.set_stop_bits(serial2::StopBits::Two);
        settings.set_parity(serial2::Parity::None);
        settings.set_flow_control(serial2::FlowControl::None);

        let port = serial2::SerialPort::open(path, |_: &mut serial2::Settings| Ok(settings))?;
        port.set_read_timeout(Duration::from_millis(1))?;
        Ok(Serial2Link { port })
    }
}

impl SerialLink for Serial2Link {
    fn rx_drain(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn tx_write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.port.write(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A purely in-memory link used to exercise `Transp` without a real
    /// device. Not part of the public port contract.
    pub struct LoopbackLink {
        pub inbox: std::collections::VecDeque<u8>,
        pub outbox: Vec<u8>,
        pub de: bool,
    }

    impl LoopbackLink {
        pub fn new() -> Self {
            LoopbackLink {
                inbox: std::collections::VecDeque::new(),
                outbox: Vec::new(),
                de: false,
            }
        }

        pub fn feed(&mut self, bytes: &[u8]) {
            self.inbox.extend(bytes.iter().copied());
        }
    }

    impl SerialLink for LoopbackLink {
        fn rx_drain(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.inbox.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn tx_write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.outbox.extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn set_de(&mut self, on: bool) {
            self.de = on;
        }
    }

    #[test]
    fn loopback_round_trips_bytes() {
        let mut link = LoopbackLink::new();
        link.feed(&[1, 2, 3]);
        let mut buf = [0u8; 8];
        let n = link.rx_drain(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        link.tx_write(&[9, 9]).unwrap();
        assert_eq!(link.outbox, vec![9, 9]);
    }
}
