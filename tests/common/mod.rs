use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use slp::{
    Channel, Config, ControlFrame, DataFrame, LossModel, Receiver, RxLinks, SharedLoss,
    Transmitter, TxLinks,
};

/// A full link with a loss model interposed on every channel, built the same
/// way `demos/loopback.rs` builds its end-to-end run.
pub struct Link {
    pub transmitter: Transmitter,
    pub producer: slp::Producer,
    pub receiver: Receiver,
    pub consumer: slp::Consumer,
    wire_threads: Vec<JoinHandle<()>>,
}

impl Link {
    pub fn shutdown(self) {
        self.transmitter.join();
        self.receiver.join();
        for handle in self.wire_threads {
            let _ = handle.join();
        }
    }
}

fn forward<T, M>(
    from: mpsc::Receiver<T>,
    to: mpsc::Sender<T>,
    loss: Arc<SharedLoss<M>>,
    channel: Channel,
    seq_of: fn(&T) -> u64,
) -> JoinHandle<()>
where
    T: Send + 'static,
    M: LossModel + 'static,
{
    thread::spawn(move || {
        while let Ok(item) = from.recv() {
            if loss.should_drop(channel, seq_of(&item)) {
                continue;
            }
            if to.send(item).is_err() {
                break;
            }
        }
    })
}

pub fn build_link<M: LossModel + 'static>(config: Config, loss: M) -> Link {
    let loss = Arc::new(SharedLoss::new(loss));

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

    Link {
        transmitter,
        producer,
        receiver,
        consumer,
        wire_threads,
    }
}
