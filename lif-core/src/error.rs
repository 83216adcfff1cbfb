use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerError {
    /// Construction parameter outside its valid domain (e.g. non-positive tau).
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// A parameter tensor cannot be broadcast to the neuron state shape.
    #[error("parameter `{name}` with shape {from:?} cannot broadcast to state shape {to:?}")]
    Broadcast {
        name: &'static str,
        from: Vec<usize>,
        to: Vec<usize>,
    },
    /// Input must be laid out as (batch, time, *features).
    #[error("input must have at least {expected} dimensions, got {got}")]
    InputRank { expected: usize, got: usize },
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    /// `backward` called without a forward pass recorded on the tape.
    #[error("no recorded forward pass; enable graph recording before forward")]
    NoRecordedGraph,
    /// Failure reported by the tensor engine, passed through unchanged.
    #[error("tensor engine: {0}")]
    Tensor(String),
}

pub type LayerResult<T, E = LayerError> = core::result::Result<T, E>;
