//! The receiver: reorder buffer, drain-to-consumer, and the debounced NACK
//! generator (§4.2). Grounded on `slp_rx.c`'s `slp_rx_receive_data` /
//! `slp_rx_receive_retrans_data` / `slp_rx_receive_poll` / NACK-check worker,
//! rendered the same way `tx.rs` renders its side: one lock-guarded core
//! shared across dedicated threads.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver as MpscReceiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::app::AppDataReceive;
use crate::config::Config;
use crate::err::Error;
use crate::frame::{accepts_as_in_order, ControlFrame, DataFrame, SeqNum, RESET_SENTINEL};

const IDLE_POLL: std::time::Duration = std::time::Duration::from_millis(50);

#[derive(Debug, Default)]
struct NackState {
    last_seen: Option<SeqNum>,
    stable_count: u32,
    armed: bool,
    ticks_since_sent: u32,
}

struct RxCore {
    /// Next sequence number expected in order. `0` means "reset": the next
    /// accepted frame of any sequence becomes the new starting point.
    wait_seq: SeqNum,
    /// Buffered slots awaiting their turn to drain. `None` is a phantom
    /// entry for a POLL, which consumes a sequence number but carries no
    /// payload to deliver.
    reorder: BTreeMap<SeqNum, Option<Vec<u8>>>,
    nack: NackState,
    /// Set when a reset was just absorbed; cleared (and folded into the
    /// flag word) by the next ACK/NACK this receiver emits.
    pending_reset: bool,
}

impl RxCore {
    fn new() -> Self {
        RxCore {
            wait_seq: 1,
            reorder: BTreeMap::new(),
            nack: NackState::default(),
            pending_reset: false,
        }
    }

    fn drain(&mut self, out: &mut Vec<AppDataReceive>) {
        while let Some(slot) = self.reorder.remove(&self.wait_seq) {
            if let Some(payload) = slot {
                out.push(AppDataReceive {
                    seq_num: self.wait_seq,
                    payload,
                });
            }
            self.wait_seq += 1;
        }
    }
}

enum Outgoing {
    Ack(ControlFrame),
    Nack(ControlFrame),
}

/// The channel endpoints a `Receiver` needs: inbound wire frames from its
/// peer's transmitter, and outbound control frames crossing back to it.
pub struct RxLinks {
    pub data_rx: MpscReceiver<DataFrame>,
    pub retrans_rx: MpscReceiver<DataFrame>,
    pub poll_rx: MpscReceiver<ControlFrame>,
    pub ack_tx: Sender<ControlFrame>,
    pub nack_tx: Sender<ControlFrame>,
}

struct RxShared {
    config: Config,
    core: Mutex<RxCore>,
    deliver_tx: Sender<AppDataReceive>,
    ack_wire_tx: Sender<ControlFrame>,
    nack_wire_tx: Sender<ControlFrame>,
    outgoing_tx: SyncSender<Outgoing>,
    error_tx: Sender<Error>,
    shutdown: AtomicBool,
}

impl RxShared {
    /// Surface a capacity violation to the consumer instead of silently
    /// dropping or growing past a named bound (§4.2.7 / §7).
    fn overflow(&self, what: &'static str, len: usize, capacity: usize) {
        log::warn!("{what} capacity exceeded: {len} entries at capacity {capacity}");
        let _ = self.error_tx.send(Error::Overflow { what, len, capacity });
    }

    fn enqueue_ack(&self, seq: SeqNum) {
        let reset = {
            let mut core = self.core.lock().unwrap();
            std::mem::take(&mut core.pending_reset)
        };
        if self
            .outgoing_tx
            .try_send(Outgoing::Ack(ControlFrame::new_ack(seq, reset)))
            .is_err()
        {
            self.overflow("rx outgoing queue", self.config.n_max, self.config.n_max);
        }
    }

    fn enqueue_nack(&self, seq: SeqNum) {
        let reset = {
            let mut core = self.core.lock().unwrap();
            std::mem::take(&mut core.pending_reset)
        };
        if self
            .outgoing_tx
            .try_send(Outgoing::Nack(ControlFrame::new_nack(seq, reset)))
            .is_err()
        {
            self.overflow("rx outgoing queue", self.config.n_max, self.config.n_max);
        }
    }

    fn handle_data(&self, frame: DataFrame, via_retrans: bool) {
        if !frame.verify_crc() {
            log::debug!("data: crc mismatch for seq {}", frame.seq_num());
            return;
        }
        let seq = frame.seq_num();

        if seq == RESET_SENTINEL {
            self.handle_reset();
            return;
        }

        let mut delivered = Vec::new();
        let mut ack_through = None;
        let mut rejected = false;
        let mut overflowed = None;

        {
            let mut core = self.core.lock().unwrap();

            if core.wait_seq == RESET_SENTINEL {
                core.wait_seq = seq;
            }

            // A retransmit is accepted only when it fills the exact
            // head-of-line gap: `seq == wait_seq` and something is already
            // buffered out of order behind it (`slp_rx_receive_retrans`'s
            // `nrOfWrongOrderReceivedDataBlocks` gate).
            if seq < core.wait_seq || core.reorder.contains_key(&seq) {
                // duplicate: already delivered, or already buffered
            } else if via_retrans
                && !(accepts_as_in_order(core.wait_seq, seq) && !core.reorder.is_empty())
            {
                rejected = true;
            } else if core.reorder.len() >= self.config.n_max {
                overflowed = Some(core.reorder.len());
            } else {
                core.reorder.insert(seq, Some(frame.payload));
                let before = core.wait_seq;
                core.drain(&mut delivered);
                if core.wait_seq != before {
                    ack_through = Some(core.wait_seq - 1);
                }
            }
        }

        if rejected {
            log::debug!("data: retransmit for seq {seq} does not fill a pending gap, dropping");
            return;
        }
        if let Some(len) = overflowed {
            self.overflow("rx reorder buffer", len, self.config.n_max);
            return;
        }
        for item in delivered {
            let _ = self.deliver_tx.send(item);
        }
        if let Some(seq) = ack_through {
            self.enqueue_ack(seq);
        }
    }

    fn handle_poll(&self, frame: ControlFrame) {
        if !frame.verify_crc() {
            log::debug!("poll: crc mismatch for seq {}", frame.seq_num());
            return;
        }
        let seq = frame.seq_num();

        let mut delivered = Vec::new();
        let mut overflowed = None;
        let current;
        {
            let mut core = self.core.lock().unwrap();
            if seq != RESET_SENTINEL {
                if core.wait_seq == RESET_SENTINEL {
                    core.wait_seq = seq;
                }
                if seq >= core.wait_seq && !core.reorder.contains_key(&seq) {
                    if core.reorder.len() >= self.config.n_max {
                        overflowed = Some(core.reorder.len());
                    } else {
                        core.reorder.insert(seq, None);
                    }
                }
                core.drain(&mut delivered);
            }
            current = core.wait_seq.saturating_sub(1);
        }
        if let Some(len) = overflowed {
            self.overflow("rx reorder buffer", len, self.config.n_max);
            return;
        }
        for item in delivered {
            let _ = self.deliver_tx.send(item);
        }
        // Echo our current cumulative position even if it doesn't close
        // this particular poll slot yet; harmless if TX has already
        // closed it, and keeps the link from looking dead while a gap is
        // still being filled.
        if current > RESET_SENTINEL {
            self.enqueue_ack(current);
        }
    }

    fn handle_reset(&self) {
        let mut core = self.core.lock().unwrap();
        core.wait_seq = RESET_SENTINEL;
        core.reorder.clear();
        core.nack = NackState::default();
        core.pending_reset = true;
    }

    /// One period of the debounced NACK generator (§4.2.6).
    fn nack_tick(&self) {
        let (missing, seq) = {
            let core = self.core.lock().unwrap();
            (!core.reorder.is_empty(), core.wait_seq)
        };

        if !missing {
            let mut core = self.core.lock().unwrap();
            core.nack = NackState::default();
            return;
        }

        let should_send = {
            let mut core = self.core.lock().unwrap();
            if core.nack.last_seen != Some(seq) {
                core.nack.last_seen = Some(seq);
                core.nack.stable_count = 1;
                core.nack.armed = false;
                core.nack.ticks_since_sent = 0;
                false
            } else {
                core.nack.stable_count += 1;
                if !core.nack.armed {
                    if core.nack.stable_count >= self.config.nack_check_limit {
                        core.nack.armed = true;
                        core.nack.ticks_since_sent = 0;
                        true
                    } else {
                        false
                    }
                } else {
                    core.nack.ticks_since_sent += 1;
                    if core.nack.ticks_since_sent >= self.config.nack_retrans_limit {
                        core.nack.ticks_since_sent = 0;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if should_send {
            self.enqueue_nack(seq);
        }
    }
}

fn data_loop(shared: Arc<RxShared>, data_rx: MpscReceiver<DataFrame>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match data_rx.recv_timeout(IDLE_POLL) {
            Ok(frame) => shared.handle_data(frame, false),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn retrans_loop(shared: Arc<RxShared>, retrans_rx: MpscReceiver<DataFrame>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match retrans_rx.recv_timeout(IDLE_POLL) {
            Ok(frame) => shared.handle_data(frame, true),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn poll_loop(shared: Arc<RxShared>, poll_rx: MpscReceiver<ControlFrame>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match poll_rx.recv_timeout(IDLE_POLL) {
            Ok(frame) => shared.handle_poll(frame),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn nack_loop(shared: Arc<RxShared>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        thread::sleep(shared.config.nack_check_delay);
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        shared.nack_tick();
    }
}

fn emitter_loop(shared: Arc<RxShared>, outgoing_rx: MpscReceiver<Outgoing>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match outgoing_rx.recv_timeout(IDLE_POLL) {
            Ok(Outgoing::Ack(frame)) => {
                let _ = shared.ack_wire_tx.send(frame);
            }
            Ok(Outgoing::Nack(frame)) => {
                let _ = shared.nack_wire_tx.send(frame);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Handle held by the consumer: the in-order delivery stream, plus any
/// capacity-overflow errors the receiver could not otherwise surface.
pub struct Consumer {
    pub delivered_rx: MpscReceiver<AppDataReceive>,
    pub error_rx: MpscReceiver<Error>,
}

/// Owns the background threads implementing §4.2. Call `join` (mirroring
/// `Transmitter::join`) to shut the link down.
pub struct Receiver {
    shared: Arc<RxShared>,
    data_thread: Option<JoinHandle<()>>,
    retrans_thread: Option<JoinHandle<()>>,
    poll_thread: Option<JoinHandle<()>>,
    nack_thread: Option<JoinHandle<()>>,
    emitter_thread: Option<JoinHandle<()>>,
}

impl Receiver {
    pub fn new(config: Config, links: RxLinks) -> (Receiver, Consumer) {
        let (deliver_tx, deliver_rx) = mpsc::channel();
        let (outgoing_tx, outgoing_rx) = mpsc::sync_channel(config.n_max);
        let (error_tx, error_rx) = mpsc::channel();

        let shared = Arc::new(RxShared {
            core: Mutex::new(RxCore::new()),
            deliver_tx,
            ack_wire_tx: links.ack_tx,
            nack_wire_tx: links.nack_tx,
            outgoing_tx,
            error_tx,
            shutdown: AtomicBool::new(false),
            config,
        });

        let data_thread = {
            let shared = shared.clone();
            Some(thread::spawn(move || data_loop(shared, links.data_rx)))
        };
        let retrans_thread = {
            let shared = shared.clone();
            Some(thread::spawn(move || {
                retrans_loop(shared, links.retrans_rx)
            }))
        };
        let poll_thread = {
            let shared = shared.clone();
            Some(thread::spawn(move || poll_loop(shared, links.poll_rx)))
        };
        let nack_thread = {
            let shared = shared.clone();
            Some(thread::spawn(move || nack_loop(shared)))
        };
        let emitter_thread = {
            let shared = shared.clone();
            Some(thread::spawn(move || emitter_loop(shared, outgoing_rx)))
        };

        let receiver = Receiver {
            shared,
            data_thread,
            retrans_thread,
            poll_thread,
            nack_thread,
            emitter_thread,
        };
        (
            receiver,
            Consumer {
                delivered_rx: deliver_rx,
                error_rx,
            },
        )
    }

    pub fn join(mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        for handle in [
            self.data_thread.take(),
            self.retrans_thread.take(),
            self.poll_thread.take(),
            self.nack_thread.take(),
            self.emitter_thread.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.join();
        }
    }
}
