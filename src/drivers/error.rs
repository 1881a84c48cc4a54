use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which side of the table an index refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Rows: one per channel.
    Channel,
    /// Columns: one per retained time sample.
    Time,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Channel => write!(f, "channel"),
            Axis::Time => write!(f, "time"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to load channel source {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },
    #[error("ragged epoch: channel {channel} has {actual} samples, expected {expected}")]
    RaggedEpoch {
        channel: usize,
        expected: usize,
        actual: usize,
    },
    #[error("{axis} index {index} out of range (len {len})")]
    Index { axis: Axis, index: usize, len: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("producer disconnected")]
    Disconnected,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SignalError {
    pub(crate) fn row(index: usize, len: usize) -> Self {
        SignalError::Index {
            axis: Axis::Channel,
            index,
            len,
        }
    }

    pub(crate) fn column(index: usize, len: usize) -> Self {
        SignalError::Index {
            axis: Axis::Time,
            index,
            len,
        }
    }
}
