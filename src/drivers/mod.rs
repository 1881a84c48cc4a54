// src/drivers/mod.rs
pub mod buffer;
pub mod channel;
pub mod downsample;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod table;

pub use buffer::SampleMatrixBuffer;
pub use channel::{ChannelSet, ChannelSource, SampleLoader, TextSampleLoader};
pub use downsample::DownsampleController;
pub use error::{Axis, SignalError};
pub use pipeline::{
    drain, drain_blocking, spawn_producer, DrainOutcome, ProducerHandle, PumpStats,
    SignalPipeline, StreamMessage,
};
pub use source::{EpochSource, ManualSource, ReplaySource, SampleEpoch, SyntheticSource};
pub use table::{TableEvent, TableModel, TableShape};
