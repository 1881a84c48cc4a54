use std::sync::mpsc::{channel, Receiver, Sender};

use crate::config::{RowPolicy, TimeAxis};
use crate::drivers::{Axis, ChannelSet, SampleMatrixBuffer, SignalError};

/// Shape change broadcast to bound displays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableEvent {
    /// Row membership changed (a channel was added or toggled).
    RowsChanged,
    /// New columns were appended; `columns` is the new total.
    ColumnsChanged { columns: usize },
    /// The history was dropped and column numbering restarts at zero.
    Reset,
}

#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<Sender<TableEvent>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&mut self) -> Receiver<TableEvent> {
        let (tx, rx) = channel();
        self.senders.push(tx);
        rx
    }

    pub(crate) fn attach(&mut self, sender: Sender<TableEvent>) {
        self.senders.push(sender);
    }

    pub(crate) fn notify(&mut self, event: TableEvent) {
        self.senders.retain(|tx| tx.send(event).is_ok());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableShape {
    pub rows: usize,
    pub columns: usize,
}

/// Read-only table view over a buffer and the channel list that describes its rows.
///
/// The row mapping is taken when the view is built, so a row number keeps pointing at
/// the same channel for as long as the view lives. Build a fresh view after a
/// [`TableEvent::RowsChanged`].
pub struct TableModel<'a> {
    buffer: &'a SampleMatrixBuffer,
    channels: &'a ChannelSet,
    rows: Vec<usize>,
    time_axis: TimeAxis,
    sample_rate_hz: Option<f64>,
}

impl<'a> TableModel<'a> {
    pub fn new(
        buffer: &'a SampleMatrixBuffer,
        channels: &'a ChannelSet,
        policy: RowPolicy,
    ) -> Result<Self, SignalError> {
        if channels.len() != buffer.row_count() {
            return Err(SignalError::Shape {
                expected: buffer.row_count(),
                actual: channels.len(),
            });
        }
        Ok(Self {
            buffer,
            channels,
            rows: channels.rows(policy),
            time_axis: TimeAxis::SampleIndex,
            sample_rate_hz: None,
        })
    }

    /// Time headers in seconds need the true acquisition rate.
    pub fn with_time_axis(mut self, time_axis: TimeAxis, sample_rate_hz: Option<f64>) -> Self {
        self.time_axis = time_axis;
        self.sample_rate_hz = sample_rate_hz.filter(|rate| *rate > 0.0);
        self
    }

    /// One receiver fed by both the buffer (columns) and the channel list (rows).
    pub fn watch(buffer: &mut SampleMatrixBuffer, channels: &mut ChannelSet) -> Receiver<TableEvent> {
        let (tx, rx) = channel();
        buffer.attach(tx.clone());
        channels.attach(tx);
        rx
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.buffer.column_count()
    }

    pub fn shape(&self) -> TableShape {
        TableShape {
            rows: self.row_count(),
            columns: self.column_count(),
        }
    }

    /// Absolute channel index shown at display row `row`.
    pub fn channel_at(&self, row: usize) -> Result<usize, SignalError> {
        self.rows
            .get(row)
            .copied()
            .ok_or_else(|| SignalError::row(row, self.rows.len()))
    }

    /// Rate of the retained columns: the true rate divided by the decimation factor.
    pub fn displayed_rate_hz(&self) -> Option<f64> {
        self.sample_rate_hz
            .map(|rate| rate / self.buffer.downsample().factor() as f64)
    }

    pub fn cell_value(&self, row: usize, column: usize) -> Result<f64, SignalError> {
        let channel = self.channel_at(row)?;
        self.buffer.value_at(channel, column)
    }

    pub fn header_label(&self, axis: Axis, index: usize) -> Result<String, SignalError> {
        match axis {
            Axis::Channel => {
                let channel = self.channel_at(index)?;
                Ok(self.channels.label_for(channel))
            }
            Axis::Time => {
                let columns = self.column_count();
                if index >= columns {
                    return Err(SignalError::column(index, columns));
                }
                match (self.time_axis, self.displayed_rate_hz()) {
                    (TimeAxis::Seconds, Some(rate)) => Ok(format!("{:.3} s", index as f64 / rate)),
                    _ => Ok(index.to_string()),
                }
            }
        }
    }
}
