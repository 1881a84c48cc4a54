//! Per-channel sample histories, display decimation and a row/column table view over
//! streamed multichannel epochs.
pub mod config;
pub mod drivers;

pub use config::{ChannelSpec, RowPolicy, StreamConfig, TimeAxis};
pub use drivers::{
    Axis, ChannelSet, ChannelSource, DownsampleController, EpochSource, SampleEpoch,
    SampleLoader, SampleMatrixBuffer, SignalError, TableEvent, TableModel,
};
