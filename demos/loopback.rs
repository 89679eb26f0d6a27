//! Minimal end-to-end demonstration: a producer submits payloads, a
//! consumer drains deliveries in order, with an injectable loss model
//! sitting on the wire in between. Grounded on `app.c`'s producer/consumer
//! split and `main.c`'s thread bootstrap, rendered without the TUN/IP
//! plumbing those used — the "wire" here is a pair of forwarding threads
//! over `std::sync::mpsc`.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use slp::{
    Channel, Config, ControlFrame, DataFrame, FixedRangeLoss, LossModel, Receiver, RxLinks,
    SharedLoss, Transmitter, TxLinks,
};

/// Forwards every item from `from` to `to`, consulting `loss` first. Models
/// the "wire" between a transmitter's outbound channel and a receiver's
/// inbound one.
fn forward<T, M>(
    from: mpsc::Receiver<T>,
    to: mpsc::Sender<T>,
    loss: Arc<SharedLoss<M>>,
    channel: Channel,
    seq_of: fn(&T) -> u64,
) -> thread::JoinHandle<()>
where
    T: Send + 'static,
    M: LossModel + 'static,
{
    thread::spawn(move || {
        while let Ok(item) = from.recv() {
            let seq = seq_of(&item);
            if loss.should_drop(channel, seq) {
                log::info!("loopback: dropping {channel:?} seq {seq}");
                continue;
            }
            if to.send(item).is_err() {
                break;
            }
        }
    })
}

fn main() {
    env_logger::init();

    let config = Config::test_scenario();

    // The third payload is lost on its first trip across DATA and must be
    // recovered through a NACK-driven retransmission.
    let loss = Arc::new(SharedLoss::new(FixedRangeLoss::new(Channel::Data, [3])));

    let (tx_data_tx, tx_data_rx) = mpsc::channel();
    let (rx_data_tx, rx_data_rx) = mpsc::channel();
    let (tx_retrans_tx, tx_retrans_rx) = mpsc::channel();
    let (rx_retrans_tx, rx_retrans_rx) = mpsc::channel();
    let (tx_poll_tx, tx_poll_rx) = mpsc::channel();
    let (rx_poll_tx, rx_poll_rx) = mpsc::channel();
    let (rx_ack_tx, rx_ack_rx) = mpsc::channel();
    let (tx_ack_tx, tx_ack_rx) = mpsc::channel();
    let (rx_nack_tx, rx_nack_rx) = mpsc::channel();
    let (tx_nack_tx, tx_nack_rx) = mpsc::channel();

    let wire_threads = vec![
        forward(tx_data_rx, rx_data_tx, loss.clone(), Channel::Data, DataFrame::seq_num),
        forward(
            tx_retrans_rx,
            rx_retrans_tx,
            loss.clone(),
            Channel::Retrans,
            DataFrame::seq_num,
        ),
        forward(tx_poll_rx, rx_poll_tx, loss.clone(), Channel::Poll, ControlFrame::seq_num),
        forward(rx_ack_rx, tx_ack_tx, loss.clone(), Channel::Ack, ControlFrame::seq_num),
        forward(rx_nack_rx, tx_nack_tx, loss.clone(), Channel::Nack, ControlFrame::seq_num),
    ];

    let (transmitter, producer) = Transmitter::new(
        config,
        TxLinks {
            data_tx: tx_data_tx,
            retrans_tx: tx_retrans_tx,
            poll_tx: tx_poll_tx,
            ack_rx: tx_ack_rx,
            nack_rx: tx_nack_rx,
        },
    );
    let (receiver, consumer) = Receiver::new(
        config,
        RxLinks {
            data_rx: rx_data_rx,
            retrans_rx: rx_retrans_rx,
            poll_rx: rx_poll_rx,
            ack_tx: rx_ack_tx,
            nack_tx: rx_nack_tx,
        },
    );

    let payloads: Vec<Vec<u8>> = (0..6)
        .map(|i| format!("message-{i}").into_bytes())
        .collect();
    let total = payloads.len();

    let consumer_thread = thread::spawn(move || {
        let mut received = 0usize;
        while received < total {
            match consumer.delivered_rx.recv_timeout(Duration::from_secs(2)) {
                Ok(item) => {
                    println!(
                        "delivered seq {} ({} bytes)",
                        item.seq_num,
                        item.payload.len()
                    );
                    received += 1;
                }
                Err(_) => {
                    log::warn!("consumer: timed out waiting for delivery {received}/{total}");
                    break;
                }
            }
        }
        received
    });

    for (producer_id, payload) in payloads.into_iter().enumerate() {
        producer
            .submit(producer_id as u64, payload)
            .expect("submit should succeed under the test-scenario limits");
    }

    // Submission is done; keep only the notification stream alive.
    let info_rx = producer.info_rx;
    let info_thread = thread::spawn(move || {
        let mut done = 0usize;
        while done < total {
            match info_rx.recv_timeout(Duration::from_secs(2)) {
                Ok(slp::AppInfo::Done { seq_num, .. })
                | Ok(slp::AppInfo::DoneAndRxReset { seq_num, .. }) => {
                    log::debug!("producer: seq {seq_num} fully delivered");
                    done += 1;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });

    info_thread.join().unwrap();
    let delivered_count = consumer_thread.join().unwrap();
    println!("delivered {delivered_count}/{total} payloads");

    transmitter.join();
    receiver.join();
    for handle in wire_threads {
        let _ = handle.join();
    }
}
