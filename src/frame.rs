//! Wire framing: `SubHeader`/`Header`/`DataFrame`/`ControlFrame`, matching
//! `slp.h`'s struct layout field-for-field.

use crate::crc;

/// Sequence numbers are a flat, inexhaustible 64-bit space. `0` is the reset
/// sentinel (see module docs on `RESET_SENTINEL`); wraparound is not
/// designed for.
pub type SeqNum = u64;

/// Either side encountering this value unconditionally accepts the message
/// as in-order, tolerating an unsynchronized peer restart.
pub const RESET_SENTINEL: SeqNum = 0;

/// The only defined bit of the control-frame flag word.
pub const FLAG_RECEIVER_RESET: u32 = 1;

/// The CRC-covered prefix common to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubHeader {
    /// Payload length in bytes on data frames; the flag word on control
    /// frames (bit `RECEIVER_RESET`).
    pub app_data_len: u32,
    pub reserved: u32,
    pub seq_num: SeqNum,
}

impl SubHeader {
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&self.app_data_len.to_le_bytes());
        buf[4..8].copy_from_slice(&self.reserved.to_le_bytes());
        buf[8..16].copy_from_slice(&self.seq_num.to_le_bytes());
        buf
    }

    fn flags(&self) -> u32 {
        self.app_data_len
    }

    pub fn receiver_reset(&self) -> bool {
        self.flags() & FLAG_RECEIVER_RESET != 0
    }
}

/// `crc ‖ reserved ‖ SubHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub crc: u32,
    pub reserved: u32,
    pub sub: SubHeader,
}

/// A numbered application payload in flight on the DATA/RETRANS channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl DataFrame {
    pub fn new(seq_num: SeqNum, payload: Vec<u8>) -> Self {
        let sub = SubHeader {
            app_data_len: payload.len() as u32,
            reserved: 0,
            seq_num,
        };
        let crc = crc_over(&sub, &payload);
        DataFrame {
            header: Header {
                crc,
                reserved: 0,
                sub,
            },
            payload,
        }
    }

    pub fn seq_num(&self) -> SeqNum {
        self.header.sub.seq_num
    }

    pub fn verify_crc(&self) -> bool {
        self.header.crc == crc_over(&self.header.sub, &self.payload)
    }
}

/// A zero-payload control message: ACK, NACK, or POLL. `app_data_len`
/// carries the POLL-vs-control-flag distinction described in the frame
/// layout (`0` for POLL, the `RECEIVER_RESET` flag word for ACK/NACK).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    pub header: Header,
}

impl ControlFrame {
    pub fn new_poll(seq_num: SeqNum) -> Self {
        Self::build(seq_num, 0)
    }

    pub fn new_ack(seq_num: SeqNum, receiver_reset: bool) -> Self {
        Self::build(seq_num, flag_word(receiver_reset))
    }

    pub fn new_nack(seq_num: SeqNum, receiver_reset: bool) -> Self {
        Self::build(seq_num, flag_word(receiver_reset))
    }

    fn build(seq_num: SeqNum, flags: u32) -> Self {
        let sub = SubHeader {
            app_data_len: flags,
            reserved: 0,
            seq_num,
        };
        let crc = crc::compute(&sub.to_bytes());
        ControlFrame {
            header: Header {
                crc,
                reserved: 0,
                sub,
            },
        }
    }

    pub fn seq_num(&self) -> SeqNum {
        self.header.sub.seq_num
    }

    pub fn receiver_reset(&self) -> bool {
        self.header.sub.receiver_reset()
    }

    pub fn verify_crc(&self) -> bool {
        self.header.crc == crc::compute(&self.header.sub.to_bytes())
    }
}

fn flag_word(receiver_reset: bool) -> u32 {
    if receiver_reset {
        FLAG_RECEIVER_RESET
    } else {
        0
    }
}

fn crc_over(sub: &SubHeader, payload: &[u8]) -> u32 {
    let mut bytes = Vec::with_capacity(16 + payload.len());
    bytes.extend_from_slice(&sub.to_bytes());
    bytes.extend_from_slice(payload);
    crc::compute(&bytes)
}

/// `true` if `seq` is the reset sentinel, or `local == RESET_SENTINEL`: the
/// bypass that lets either peer restart without coordination (§3 / §4.2.1).
pub fn accepts_as_in_order(local: SeqNum, seq: SeqNum) -> bool {
    local == RESET_SENTINEL || seq == RESET_SENTINEL || local == seq
}
