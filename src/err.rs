#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("payload length {len} is outside the allowed range 1..={max}")]
    InvalidPayload { len: usize, max: usize },

    #[error("{what} capacity exceeded: {len} entries at capacity {capacity}")]
    Overflow {
        what: &'static str,
        len: usize,
        capacity: usize,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}
