//! SLP: a one-directional, reliable, in-order transport built on named
//! logical channels rather than a specific wire/socket layer. A caller wires
//! a `Transmitter`'s outbound channels to a `Receiver`'s inbound ones (and
//! the reverse for ACK/NACK) over whatever carries bytes between the two
//! peers; `demos/loopback.rs` does this in-process.

mod app;
mod config;
mod crc;
mod err;
mod frame;
mod loss;
mod rx;
mod tx;

pub use app::{AppDataReceive, AppInfo, AppState, NO_PRODUCER};
pub use config::Config;
pub use err::Error;
pub use frame::{ControlFrame, DataFrame, SeqNum, RESET_SENTINEL};
pub use loss::{Channel, FixedRangeLoss, LossModel, NeverDrop, RandomLoss, SharedLoss};
pub use rx::{Consumer, Receiver, RxLinks};
pub use tx::{Producer, Transmitter, TxLinks};

use std::sync::mpsc;

/// Establish one SLP link end-to-end: a `Transmitter`/`Producer` pair feeding
/// a `Receiver`/`Consumer` pair over freshly created in-process channels,
/// with ACK/NACK flowing back the other way. Equivalent to building a
/// `TxLinks`/`RxLinks` pair by hand and calling `Transmitter::new` /
/// `Receiver::new` separately, for callers that don't need to interpose
/// anything (loss injection, a real socket) between the two sides.
pub fn link(config: Config) -> (Transmitter, Producer, Receiver, Consumer) {
    let (data_tx, data_rx) = mpsc::channel();
    let (retrans_tx, retrans_rx) = mpsc::channel();
    let (poll_tx, poll_rx) = mpsc::channel();
    let (ack_tx, ack_rx) = mpsc::channel();
    let (nack_tx, nack_rx) = mpsc::channel();

    let (transmitter, producer) = Transmitter::new(
        config,
        TxLinks {
            data_tx,
            retrans_tx,
            poll_tx,
            ack_rx,
            nack_rx,
        },
    );
    let (receiver, consumer) = Receiver::new(
        config,
        RxLinks {
            data_rx,
            retrans_rx,
            poll_rx,
            ack_tx,
            nack_tx,
        },
    );

    (transmitter, producer, receiver, consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn link_delivers_a_single_payload_in_order() {
        let (transmitter, producer, receiver, consumer) = link(Config::test_scenario());

        producer.submit(1, b"hello".to_vec()).unwrap();

        let delivered = consumer
            .delivered_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("payload should be delivered");
        assert_eq!(delivered.seq_num, 1);
        assert_eq!(delivered.payload, b"hello");

        let accepted = producer
            .info_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("producer should see acceptance info");
        assert_eq!(
            accepted,
            AppInfo::DataReceived {
                producer_id: 1,
                seq_num: 1
            }
        );

        let done = producer
            .info_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("producer should see completion info");
        assert_eq!(
            done,
            AppInfo::Done {
                producer_id: 1,
                seq_num: 1
            }
        );

        transmitter.join();
        receiver.join();
    }
}
