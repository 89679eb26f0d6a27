//! Injectable loss for exercising the retransmission paths, isolating what
//! the reference implementation compiled in as test-only branches behind a
//! trait any caller can implement (§9 Design Notes).

use std::sync::Mutex;

use rand::Rng;

/// Which wire channel a frame is travelling on, for loss models that only
/// want to target one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Data,
    Retrans,
    Poll,
    Ack,
    Nack,
}

/// Decide whether a frame in flight on `channel` carrying `seq` should be
/// dropped. Implementations may hold interior state (hence `&mut self`
/// behind a lock at the call site) to model bursts or a fixed count.
pub trait LossModel: Send {
    fn should_drop(&mut self, channel: Channel, seq: u64) -> bool;
}

/// Drops nothing; the default for a clean run.
#[derive(Debug, Default)]
pub struct NeverDrop;

impl LossModel for NeverDrop {
    fn should_drop(&mut self, _channel: Channel, _seq: u64) -> bool {
        false
    }
}

/// Drops each frame independently with probability `rate` (0.0..=1.0).
pub struct RandomLoss {
    rate: f64,
    rng: rand::rngs::StdRng,
}

impl RandomLoss {
    pub fn new(rate: f64, seed: u64) -> Self {
        use rand::SeedableRng;
        RandomLoss {
            rate: rate.clamp(0.0, 1.0),
            rng: rand::rngs::StdRng::seed_from_u64(seed),
        }
    }
}

impl LossModel for RandomLoss {
    fn should_drop(&mut self, _channel: Channel, _seq: u64) -> bool {
        self.rng.gen_bool(self.rate)
    }
}

/// Drops every occurrence of a fixed set of sequence numbers on one channel,
/// exactly once each — useful for a deterministic "single frame lost" or
/// "single ACK lost" scenario.
pub struct FixedRangeLoss {
    channel: Channel,
    remaining: Vec<u64>,
}

impl FixedRangeLoss {
    pub fn new(channel: Channel, seqs: impl IntoIterator<Item = u64>) -> Self {
        FixedRangeLoss {
            channel,
            remaining: seqs.into_iter().collect(),
        }
    }
}

impl LossModel for FixedRangeLoss {
    fn should_drop(&mut self, channel: Channel, seq: u64) -> bool {
        if channel != self.channel {
            return false;
        }
        if let Some(pos) = self.remaining.iter().position(|&s| s == seq) {
            self.remaining.remove(pos);
            true
        } else {
            false
        }
    }
}

/// A `LossModel` wrapped for sharing across the threads a loopback harness
/// forwards frames on.
pub struct SharedLoss<M>(Mutex<M>);

impl<M: LossModel> SharedLoss<M> {
    pub fn new(model: M) -> Self {
        SharedLoss(Mutex::new(model))
    }

    pub fn should_drop(&self, channel: Channel, seq: u64) -> bool {
        self.0.lock().unwrap().should_drop(channel, seq)
    }
}
