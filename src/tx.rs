//! The transmitter: windowed buffer, ACK/NACK handlers, and the liveness
//! poll loop (§4.1). Grounded on `slp_tx.c`'s four worker functions
//! (`slp_tx_receive_app_data`, `slp_tx_receive_ack`, `slp_tx_receive_nack`,
//! `slp_tx_send_poll`), rendered as one lock-guarded `TxCore` shared across
//! dedicated threads, in the teacher's `Arc<Mutex<Manager>>` + background
//! `thread::spawn` idiom (`lib.rs`'s `NetStack::new`/`segment_loop`).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::app::{AppInfo, AppState, NO_PRODUCER};
use crate::config::Config;
use crate::err::Error;
use crate::frame::{ControlFrame, DataFrame, SeqNum};

const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
struct WindowEntry {
    producer_id: u64,
    payload: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct PollState {
    waiting: bool,
    ack_seq: SeqNum,
    timeout_count: u32,
}

struct TxCore {
    window: BTreeMap<SeqNum, WindowEntry>,
    seq_counter: SeqNum,
    primary_wait: bool,
    poll: PollState,
}

impl TxCore {
    fn new() -> Self {
        TxCore {
            window: BTreeMap::new(),
            // seq 0 is the reset sentinel; real allocations start at 1.
            seq_counter: 1,
            primary_wait: false,
            poll: PollState::default(),
        }
    }
}

/// The channel endpoints a `Transmitter` needs: outbound wire frames to its
/// peer's receiver, and inbound control frames crossing back from it. A
/// `demos/loopback.rs`-style harness wires these directly to a `RxLinks`.
pub struct TxLinks {
    pub data_tx: Sender<DataFrame>,
    pub retrans_tx: Sender<DataFrame>,
    pub poll_tx: Sender<ControlFrame>,
    pub ack_rx: Receiver<ControlFrame>,
    pub nack_rx: Receiver<ControlFrame>,
}

struct TxShared {
    config: Config,
    core: Mutex<TxCore>,
    data_tx: Sender<DataFrame>,
    retrans_tx: Sender<DataFrame>,
    poll_tx: Sender<ControlFrame>,
    info_tx: Sender<AppInfo>,
    state_tx: Sender<AppState>,
    shutdown: AtomicBool,
}

impl TxShared {
    fn submit(&self, producer_id: u64, payload: Vec<u8>) -> Result<SeqNum, Error> {
        if payload.is_empty() || payload.len() > self.config.max_payload {
            return Err(Error::InvalidPayload {
                len: payload.len(),
                max: self.config.max_payload,
            });
        }

        let seq = {
            let mut core = self.core.lock().unwrap();
            if core.window.len() >= self.config.n_max {
                return Err(Error::Overflow {
                    what: "tx window",
                    len: core.window.len(),
                    capacity: self.config.n_max,
                });
            }
            let seq = core.seq_counter;
            core.window.insert(
                seq,
                WindowEntry {
                    producer_id,
                    payload: Some(payload.clone()),
                },
            );
            core.seq_counter += 1;
            seq
        };

        let _ = self.info_tx.send(AppInfo::DataReceived {
            producer_id,
            seq_num: seq,
        });
        self.data_tx
            .send(DataFrame::new(seq, payload))
            .map_err(|_| Error::ChannelClosed("DATA"))?;

        let went_to_wait = {
            let mut core = self.core.lock().unwrap();
            if core.window.len() >= self.config.wait_limit() && !core.primary_wait {
                core.primary_wait = true;
                true
            } else {
                false
            }
        };
        if went_to_wait {
            let _ = self.state_tx.send(AppState::Wait);
        }

        Ok(seq)
    }

    fn handle_ack(&self, frame: ControlFrame) {
        if !frame.verify_crc() {
            log::debug!("ack: crc mismatch for seq {}", frame.seq_num());
            return;
        }
        let seq = frame.seq_num();
        let reset = frame.receiver_reset();

        let mut infos = Vec::new();
        let released;

        {
            let mut core = self.core.lock().unwrap();
            if !core.window.contains_key(&seq) {
                log::debug!("ack: unknown seq {seq}, dropping");
                return;
            }

            // Cumulative closure: everything <= seq is done. BTreeMap
            // iterates in ascending key order, so this is already
            // oldest-first.
            let rest = core.window.split_off(&(seq + 1));
            let closed = std::mem::replace(&mut core.window, rest);
            let mut poll_acked = false;

            for (entry_seq, entry) in closed {
                match entry.payload {
                    Some(_) => {
                        let info = if reset {
                            AppInfo::DoneAndRxReset {
                                producer_id: entry.producer_id,
                                seq_num: entry_seq,
                            }
                        } else {
                            AppInfo::Done {
                                producer_id: entry.producer_id,
                                seq_num: entry_seq,
                            }
                        };
                        infos.push(info);
                    }
                    None => {
                        if reset {
                            infos.push(AppInfo::RxReset {
                                producer_id: NO_PRODUCER,
                                seq_num: entry_seq,
                            });
                        }
                        if entry_seq == core.poll.ack_seq {
                            poll_acked = true;
                        }
                    }
                }
            }

            if poll_acked {
                core.poll.waiting = false;
            }

            released = core.primary_wait && core.window.len() <= self.config.restart_limit;
            if released {
                core.primary_wait = false;
            }
        }

        for info in infos {
            let _ = self.info_tx.send(info);
        }
        if released {
            let _ = self.state_tx.send(AppState::GoOn);
        }
    }

    fn handle_nack(&self, frame: ControlFrame) {
        if !frame.verify_crc() {
            log::debug!("nack: crc mismatch for seq {}", frame.seq_num());
            return;
        }
        let seq = frame.seq_num();
        let reset = frame.receiver_reset();

        let payload = {
            let core = self.core.lock().unwrap();
            match core.window.get(&seq) {
                Some(entry) => entry.payload.clone().unwrap_or_default(),
                None => {
                    log::debug!("nack: unknown seq {seq}, dropping");
                    return;
                }
            }
        };

        if self.retrans_tx.send(DataFrame::new(seq, payload)).is_err() {
            log::warn!("RETRANS channel closed, dropping retransmit for seq {seq}");
            return;
        }

        if reset {
            let _ = self.info_tx.send(AppInfo::RxReset {
                producer_id: NO_PRODUCER,
                seq_num: seq,
            });
        }
    }

    fn sample_oldest(&self) -> (usize, Option<SeqNum>) {
        let core = self.core.lock().unwrap();
        (core.window.len(), core.window.keys().next().copied())
    }

    /// One period of the poll loop (§4.1.4).
    fn poll_tick(&self) {
        {
            let mut core = self.core.lock().unwrap();
            if core.poll.waiting {
                if core.poll.timeout_count < self.config.poll_ack_timeout {
                    core.poll.timeout_count += 1;
                    return;
                }
                core.poll.waiting = false;
            }
        }

        let (nr0, oldest0) = self.sample_oldest();
        if nr0 == 0 {
            return;
        }

        thread::sleep(self.config.poll_check_time);
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }

        let (nr1, oldest1) = self.sample_oldest();
        if !(nr1 > 0 && oldest1 == oldest0) {
            return;
        }

        let seq = {
            let mut core = self.core.lock().unwrap();
            let seq = core.seq_counter;
            core.window.insert(
                seq,
                WindowEntry {
                    producer_id: NO_PRODUCER,
                    payload: None,
                },
            );
            core.seq_counter += 1;
            core.poll.ack_seq = seq;
            core.poll.waiting = true;
            core.poll.timeout_count = 0;
            seq
        };

        let _ = self.poll_tx.send(ControlFrame::new_poll(seq));
    }
}

fn ack_loop(shared: Arc<TxShared>, ack_rx: Receiver<ControlFrame>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match ack_rx.recv_timeout(IDLE_POLL) {
            Ok(frame) => shared.handle_ack(frame),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn nack_loop(shared: Arc<TxShared>, nack_rx: Receiver<ControlFrame>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match nack_rx.recv_timeout(IDLE_POLL) {
            Ok(frame) => shared.handle_nack(frame),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn poll_loop(shared: Arc<TxShared>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        thread::sleep(shared.config.poll_period);
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        shared.poll_tick();
    }
}

/// Handle held by the producer: submit payloads, observe delivery
/// notifications and flow-control state.
pub struct Producer {
    shared: Arc<TxShared>,
    pub info_rx: Receiver<AppInfo>,
    pub state_rx: Receiver<AppState>,
}

impl Producer {
    pub fn submit(&self, producer_id: u64, payload: Vec<u8>) -> Result<SeqNum, Error> {
        self.shared.submit(producer_id, payload)
    }
}

/// Owns the background threads implementing §4.1. Dropping the returned
/// `Producer` does not stop them; call `join` (mirroring the teacher's
/// `NetStack::join`) to shut the link down.
pub struct Transmitter {
    shared: Arc<TxShared>,
    ack_thread: Option<JoinHandle<()>>,
    nack_thread: Option<JoinHandle<()>>,
    poll_thread: Option<JoinHandle<()>>,
}

impl Transmitter {
    pub fn new(config: Config, links: TxLinks) -> (Transmitter, Producer) {
        let (info_tx, info_rx) = mpsc::channel();
        let (state_tx, state_rx) = mpsc::channel();

        let shared = Arc::new(TxShared {
            config,
            core: Mutex::new(TxCore::new()),
            data_tx: links.data_tx,
            retrans_tx: links.retrans_tx,
            poll_tx: links.poll_tx,
            info_tx,
            state_tx,
            shutdown: AtomicBool::new(false),
        });

        let ack_thread = {
            let shared = shared.clone();
            let ack_rx = links.ack_rx;
            Some(thread::spawn(move || ack_loop(shared, ack_rx)))
        };
        let nack_thread = {
            let shared = shared.clone();
            let nack_rx = links.nack_rx;
            Some(thread::spawn(move || nack_loop(shared, nack_rx)))
        };
        let poll_thread = {
            let shared = shared.clone();
            Some(thread::spawn(move || poll_loop(shared)))
        };

        let producer = Producer {
            shared: shared.clone(),
            info_rx,
            state_rx,
        };
        let transmitter = Transmitter {
            shared,
            ack_thread,
            nack_thread,
            poll_thread,
        };
        (transmitter, producer)
    }

    /// Signal the background tasks to stop and wait for them to exit.
    pub fn join(mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        for handle in [
            self.ack_thread.take(),
            self.nack_thread.take(),
            self.poll_thread.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.join();
        }
    }
}
