//! Application PDU codec: header/payload encode-decode, the `PayloadApi`
//! capability record, and the `(ds, page)` schedule owned by POLL.
//!
//! Grounded in `src/core/ser.c` / `ser_types.h` (`ser_s`, `SUB_TO_DS`,
//! `DS_TO_B`, `BTOSUB`, `B_TO_PG` macros) from the original source, and in
//! the byte-packing helpers in [`crate::byte_codec`].
//!
//! `t_msec_scaled` is wired here as a `u16_be` field whose value is
//! milliseconds (`nsec / 1_000_000`), not `msec * 1000`: the `ser2mms_poll.c`
//! sample computes its outgoing subscription timestamp as
//! `tspec.tv_nsec / 1_000_000`, which only fits in 16 bits under the
//! milliseconds interpretation.

use crate::byte_codec::{
    pack_i16_be, pack_u16_be, pack_u32_be, unpack_i16_be, unpack_u16_be, unpack_u32_be,
};
use crate::error::{FrameError, FrameResult};
use crate::types::{
    Answ, Cmd, Page, Role, ScheduleCursor, Sub, SubBank, ANSW_LEN_MAX, NUM_SUBS, PAGE_SIZE,
};

/// User-supplied callbacks that bind decoded wire data to an attribute
/// store (or, for POLL, produce outgoing requests). Every member defaults
/// to a weak no-op, mirroring the original's overridable weak functions —
/// a host overrides only the callbacks its role actually needs.
pub trait PayloadApi {
    /// Slave: deliver a decoded page to the attribute store.
    fn read_page(&mut self, _page: &Page, _ds: u8, _page_idx: u8) {}

    /// Slave: deliver decoded subscription records.
    fn read_subs(&mut self, _subs: &SubBank) {}

    /// Slave: produce the values of a `Parameters` reply.
    fn write_answer(&mut self) -> Answ {
        Answ::default()
    }

    /// Slave: produce the timestamp for a `TimeSet` reply, as
    /// `(epoch_seconds, microseconds)`.
    fn get_time(&mut self) -> (u32, u32) {
        (0, 0)
    }

    /// Poll: produce the outgoing page for `(ds, page)`. Returns the number
    /// of valid entries in `page` (normally `PAGE_SIZE`).
    fn write_page(&mut self, _page: &mut Page, _ds: u8, _page_idx: u8) -> usize {
        0
    }

    /// Poll: produce the outgoing subscription bank. Returns the number of
    /// valid records in `subs`.
    fn write_subs(&mut self, _subs: &mut SubBank) -> usize {
        0
    }

    /// Poll: receive a decoded `Parameters` reply's answer values.
    fn read_answer(&mut self, _answ: &Answ) {}

    /// Poll: receive a decoded `TimeSet` reply's timestamp.
    fn read_time(&mut self, _epoch: u32, _usec: u32) {}
}

/// A `PayloadApi` whose every callback is the default no-op. Used where a
/// host genuinely has nothing to bind (tests, or a role that never invokes
/// certain callbacks).
#[derive(Debug, Default)]
pub struct NullPayloadApi;

impl PayloadApi for NullPayloadApi {}

/// Whether subscription records are carried on the wire. Reduced mode
/// carries zero subscription records and shortens the expected frame size,
/// per the `#if (!S2M_REDUCED)` guard in the original around the
/// subscription codec path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsMode {
    Full,
    Reduced,
}

impl Default for SubsMode {
    fn default() -> Self {
        SubsMode::Reduced
    }
}

/// The PDU codec: owns the schedule cursor and drives `PayloadApi` callbacks
/// during encode/decode. Does not own the byte buffers or I/O — those
/// belong to [`crate::transp::Transp`].
pub struct Ser {
    role: Role,
    subs_mode: SubsMode,
    cmd_xmit: Cmd,
    cursor: ScheduleCursor,
}

impl Ser {
    pub fn new(role: Role, subs_mode: SubsMode) -> Self {
        Ser {
            role,
            subs_mode,
            cmd_xmit: Cmd::Parameters,
            cursor: ScheduleCursor::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn subs_mode(&self) -> SubsMode {
        self.subs_mode
    }

    pub fn cursor(&self) -> ScheduleCursor {
        self.cursor
    }

    /// Sets the command word used for the next POLL emission. No-op (but
    /// accepted) outside the POLL role, matching the original's
    /// `ser2mms_set_cmd`, which is only meaningful on the poll side.
    pub fn set_cmd(&mut self, cmd: Cmd) {
        self.cmd_xmit = cmd;
    }

    /// Expected inbound body size (post-address, pre-CRC-trailer is not
    /// included — this is the `Transp` frame size check target for
    /// `rx.size`, which is `1 (addr) + body + 2 (crc)`).
    pub fn expected_frame_size(&self) -> usize {
        match self.role {
            Role::Slave => self.slave_in_size(),
            Role::Poll => self.poll_in_size(),
        }
    }

    fn slave_in_size(&self) -> usize {
        let header = 1 /* addr */ + 2 /* cmd */ + 1 /* selector */;
        let page = PAGE_SIZE * 2;
        let subs = match self.subs_mode {
            SubsMode::Reduced => 0,
            SubsMode::Full => NUM_SUBS * SUB_RECORD_LEN,
        };
        header + page + subs + 2 /* crc */
    }

    /// POLL receives the mirror of a slave-outbound reply. Its size depends
    /// on which command is currently outstanding: `Parameters` replies carry
    /// `ANSW_LEN_MAX` answer values, `TimeSet` replies carry an epoch+usec
    /// pair. Computed dynamically from `cmd_xmit` rather than a single
    /// hardcoded constant, since the two commands produce different-length
    /// replies.
    fn poll_in_size(&self) -> usize {
        let header = 1 /* addr */ + 2 /* cmd */;
        let body = match self.cmd_xmit {
            Cmd::Parameters => ANSW_LEN_MAX * 2,
            Cmd::TimeSet => 4 + 2,
        };
        header + body + 2 /* crc */
    }

    /// Decodes a received slave-inbound body (the frame's address byte and
    /// CRC trailer have already been stripped/verified by `Transp`) and
    /// invokes the matching `read_*` callbacks.
    pub fn decode_slave_in(&mut self, body: &[u8], api: &mut dyn PayloadApi) -> FrameResult<()> {
        if body.len() != self.slave_in_size() - 1 - 2 {
            return Err(FrameError::SizeMismatch);
        }
        let cmd_word = unpack_u16_be(&[body[0], body[1]]);
        let cmd = Cmd::from_word(cmd_word);
        let selector = body[2];
        let cursor = ScheduleCursor::from_selector(selector).ok_or(FrameError::BadSelector)?;

        let mut off = 3;
        let mut page: Page = [0; PAGE_SIZE];
        for slot in page.iter_mut() {
            *slot = unpack_i16_be(&[body[off], body[off + 1]]);
            off += 2;
        }
        api.read_page(&page, cursor.ds, cursor.page);

        if self.subs_mode == SubsMode::Full {
            let mut subs: SubBank = [Sub::default(); NUM_SUBS];
            for sub in subs.iter_mut() {
                let mag = unpack_i16_be(&[body[off], body[off + 1]]);
                off += 2;
                let t_epoch = unpack_u32_be(&[body[off], body[off + 1], body[off + 2], body[off + 3]]);
                off += 4;
                let t_msec = unpack_u16_be(&[body[off], body[off + 1]]);
                off += 2;
                *sub = Sub {
                    mag,
                    t_epoch,
                    t_msec,
                };
            }
            api.read_subs(&subs);
        }

        let _ = cmd; // slave-in is always Parameters on the wire; cmd kept for symmetry/logging.
        Ok(())
    }

    /// Builds a slave-outbound reply body for `cmd` (the command echoed
    /// from the just-decoded request).
    pub fn encode_slave_out(&mut self, cmd: Cmd, api: &mut dyn PayloadApi) -> FrameResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut cmd_buf = [0u8; 2];
        pack_u16_be(&mut cmd_buf, cmd.to_word());
        out.extend_from_slice(&cmd_buf);

        match cmd {
            Cmd::Parameters => {
                let answ = api.write_answer();
                if answ.len > ANSW_LEN_MAX {
                    return Err(FrameError::AnswerTooLong);
                }
                for &v in answ.as_slice() {
                    let mut buf = [0u8; 2];
                    pack_i16_be(&mut buf, v);
                    out.extend_from_slice(&buf);
                }
            }
            Cmd::TimeSet => {
                let (epoch, usec) = api.get_time();
                let mut epoch_buf = [0u8; 4];
                pack_u32_be(&mut epoch_buf, epoch);
                out.extend_from_slice(&epoch_buf);
                let mut usec_buf = [0u8; 2];
                pack_u16_be(&mut usec_buf, (usec & 0xFFFF) as u16);
                out.extend_from_slice(&usec_buf);
            }
        }
        Ok(out)
    }

    /// Builds the next POLL-outbound request body, advancing the schedule
    /// cursor exactly once as part of this call (§4.4.3: mutated only on
    /// transmit).
    pub fn encode_poll_out(&mut self, api: &mut dyn PayloadApi) -> Vec<u8> {
        self.cursor.advance();
        let cmd = self.cmd_xmit;

        let mut out = Vec::new();
        let mut cmd_buf = [0u8; 2];
        pack_u16_be(&mut cmd_buf, cmd.to_word());
        out.extend_from_slice(&cmd_buf);
        out.push(self.cursor.selector());

        let mut page: Page = [0; PAGE_SIZE];
        let n = api.write_page(&mut page, self.cursor.ds, self.cursor.page).min(PAGE_SIZE);
        for &v in &page[..n] {
            let mut buf = [0u8; 2];
            pack_i16_be(&mut buf, v);
            out.extend_from_slice(&buf);
        }
        for _ in n..PAGE_SIZE {
            out.extend_from_slice(&[0, 0]);
        }

        if self.subs_mode == SubsMode::Full {
            let mut subs: SubBank = [Sub::default(); NUM_SUBS];
            let n_subs = api.write_subs(&mut subs).min(NUM_SUBS);
            for sub in &subs[..n_subs] {
                let mut mag_buf = [0u8; 2];
                pack_i16_be(&mut mag_buf, sub.mag);
                out.extend_from_slice(&mag_buf);
                let mut epoch_buf = [0u8; 4];
                pack_u32_be(&mut epoch_buf, sub.t_epoch);
                out.extend_from_slice(&epoch_buf);
                let mut msec_buf = [0u8; 2];
                pack_u16_be(&mut msec_buf, sub.t_msec);
                out.extend_from_slice(&msec_buf);
            }
            for _ in n_subs..NUM_SUBS {
                out.extend_from_slice(&[0u8; SUB_RECORD_LEN]);
            }
        }
        out
    }

    /// Decodes a POLL-inbound reply (mirror of slave-outbound) and invokes
    /// the matching `read_answer`/`read_time` callback.
    pub fn decode_poll_in(&mut self, body: &[u8], api: &mut dyn PayloadApi) -> FrameResult<()> {
        if body.len() < 2 {
            return Err(FrameError::SizeMismatch);
        }
        let cmd_word = unpack_u16_be(&[body[0], body[1]]);
        let cmd = Cmd::from_word(cmd_word);
        let rest = &body[2..];
        match cmd {
            Cmd::Parameters => {
                if rest.len() != ANSW_LEN_MAX * 2 {
                    return Err(FrameError::SizeMismatch);
                }
                let mut answ = Answ::default();
                answ.len = ANSW_LEN_MAX;
                for (i, slot) in answ.values.iter_mut().enumerate() {
                    *slot = unpack_i16_be(&[rest[i * 2], rest[i * 2 + 1]]);
                }
                api.read_answer(&answ);
            }
            Cmd::TimeSet => {
                if rest.len() != 6 {
                    return Err(FrameError::SizeMismatch);
                }
                let epoch = unpack_u32_be(&[rest[0], rest[1], rest[2], rest[3]]);
                let usec = unpack_u16_be(&[rest[4], rest[5]]) as u32;
                api.read_time(epoch, usec);
            }
        }
        Ok(())
    }
}

const SUB_RECORD_LEN: usize = 2 + 4 + 2;

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingApi {
        read_page: RefCell<Option<(Page, u8, u8)>>,
    }

    impl PayloadApi for RecordingApi {
        fn read_page(&mut self, page: &Page, ds: u8, page_idx: u8) {
            *self.read_page.borrow_mut() = Some((*page, ds, page_idx));
        }

        fn write_answer(&mut self) -> Answ {
            Answ {
                values: [10, 20, 30],
                len: 3,
            }
        }
    }

    #[test]
    fn decode_slave_in_reduced_happy_path() {
        let mut ser = Ser::new(Role::Slave, SubsMode::Reduced);
        let mut api = RecordingApi::default();
        // cmd=0x0000, selector=(1<<4)|0=0x10, page=[1,2,3]
        let body: Vec<u8> = vec![0x00, 0x00, 0x10, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03];
        ser.decode_slave_in(&body, &mut api).unwrap();
        assert_eq!(api.read_page.borrow().unwrap(), ([1, 2, 3], 1, 0));
    }

    #[test]
    fn decode_slave_in_bad_selector_rejected() {
        let mut ser = Ser::new(Role::Slave, SubsMode::Reduced);
        let mut api = RecordingApi::default();
        let body: Vec<u8> = vec![0x00, 0x00, 0x70, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03];
        assert_eq!(
            ser.decode_slave_in(&body, &mut api),
            Err(FrameError::BadSelector)
        );
    }

    #[test]
    fn encode_slave_out_parameters_uses_write_answer() {
        let mut ser = Ser::new(Role::Slave, SubsMode::Reduced);
        let mut api = RecordingApi::default();
        let out = ser.encode_slave_out(Cmd::Parameters, &mut api).unwrap();
        assert_eq!(out, vec![0x00, 0x00, 0x00, 10, 0x00, 20, 0x00, 30]);
    }

    #[test]
    fn poll_schedule_advances_exactly_once_per_encode() {
        let mut ser = Ser::new(Role::Poll, SubsMode::Reduced);
        let mut api = RecordingApi::default();
        assert_eq!(ser.cursor(), ScheduleCursor { ds: 6, page: 3 });
        ser.encode_poll_out(&mut api);
        assert_eq!(ser.cursor(), ScheduleCursor { ds: 1, page: 0 });
        ser.encode_poll_out(&mut api);
        assert_eq!(ser.cursor(), ScheduleCursor { ds: 1, page: 1 });
    }

    #[test]
    fn decode_poll_in_timeset_roundtrips() {
        let mut ser = Ser::new(Role::Poll, SubsMode::Reduced);
        struct TimeApi(RefCell<Option<(u32, u32)>>);
        impl PayloadApi for TimeApi {
            fn read_time(&mut self, epoch: u32, usec: u32) {
                *self.0.borrow_mut() = Some((epoch, usec));
            }
        }
        let mut api = TimeApi(RefCell::new(None));
        let mut body = vec![0x00, 0x01];
        let mut epoch_buf = [0u8; 4];
        pack_u32_be(&mut epoch_buf, 1_700_000_000);
        body.extend_from_slice(&epoch_buf);
        body.extend_from_slice(&[0x12, 0x34]);
        ser.decode_poll_in(&body, &mut api).unwrap();
        assert_eq!(api.0.borrow().unwrap(), (1_700_000_000, 0x1234));
    }
}
