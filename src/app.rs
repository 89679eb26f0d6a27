//! Message shapes at the application boundary (§6): what the transmitter
//! tells the producer, and what the receiver hands the consumer.

use crate::frame::SeqNum;

/// Sentinel producer id used on info events that do not correlate to a
/// specific producer submission (a poll slot's `RX_RESET`), mirroring the
/// reference implementation's `GEN_ID_INVALID`.
pub const NO_PRODUCER: u64 = u64::MAX;

/// `APP_INFO`: delivery notifications sent from TX back to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppInfo {
    /// The payload was accepted into the window and assigned `seq_num`.
    DataReceived { producer_id: u64, seq_num: SeqNum },
    /// `seq_num` was cumulatively ACKed; the producer's payload is fully
    /// delivered.
    Done { producer_id: u64, seq_num: SeqNum },
    /// Same as `Done`, but the ACK also carried `RECEIVER_RESET`.
    DoneAndRxReset { producer_id: u64, seq_num: SeqNum },
    /// A control frame (ACK or NACK) carried `RECEIVER_RESET` for an entry
    /// that had no payload to complete (a poll slot).
    RxReset { producer_id: u64, seq_num: SeqNum },
}

/// `APP_STATE`: the coarse producer back-pressure signal (§4.1.1 / §4.1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    GoOn,
    Wait,
}

/// `APP_DATA_RECEIVE`: a payload delivered to the consumer, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDataReceive {
    pub seq_num: SeqNum,
    pub payload: Vec<u8>,
}
