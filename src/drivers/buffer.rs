use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use log::{debug, warn};

use crate::drivers::table::{Subscribers, TableEvent};
use crate::drivers::{DownsampleController, SampleEpoch, SignalError};

/// Append-only history of the epochs that passed the downsampling gate.
///
/// Rows are absolute channel indices, columns are retained time samples counted across
/// all epochs in arrival order. Column numbers never change once handed out; only
/// [`reset`](Self::reset) starts a new numbering.
#[derive(Debug)]
pub struct SampleMatrixBuffer {
    channel_count: usize,
    history: Vec<SampleEpoch>,
    // ends[i] = total width of history[..=i]
    ends: Vec<usize>,
    downsample: DownsampleController,
    generation: Arc<AtomicU64>,
    subscribers: Subscribers,
}

impl SampleMatrixBuffer {
    pub fn new(channel_count: usize, downsample_factor: usize) -> Result<Self, SignalError> {
        if channel_count == 0 {
            return Err(SignalError::InvalidConfig(
                "channel count must be at least 1".into(),
            ));
        }
        Ok(Self {
            channel_count,
            history: Vec::new(),
            ends: Vec::new(),
            downsample: DownsampleController::new(downsample_factor)?,
            generation: Arc::new(AtomicU64::new(0)),
            subscribers: Subscribers::default(),
        })
    }

    /// Feeds one arriving epoch through the decimator.
    ///
    /// Returns `Ok(true)` when the epoch was retained. An epoch with the wrong channel
    /// count is rejected before the decimator sees it, so the phase is unaffected.
    pub fn add_data(&mut self, epoch: SampleEpoch) -> Result<bool, SignalError> {
        if epoch.channel_count() != self.channel_count {
            warn!(
                "dropping epoch with {} channels, buffer holds {}",
                epoch.channel_count(),
                self.channel_count
            );
            return Err(SignalError::Shape {
                expected: self.channel_count,
                actual: epoch.channel_count(),
            });
        }
        if !self.downsample.advance() {
            return Ok(false);
        }
        let width = epoch.width();
        let end = self.column_count() + width;
        self.history.push(epoch);
        self.ends.push(end);
        self.generation.fetch_add(1, Ordering::Release);
        if width > 0 {
            self.subscribers
                .notify(TableEvent::ColumnsChanged { columns: end });
        }
        Ok(true)
    }

    /// Drops the history and restarts the decimation phase. The factor is kept.
    pub fn reset(&mut self) {
        debug!(
            "resetting buffer ({} epochs, {} columns)",
            self.history.len(),
            self.column_count()
        );
        self.history.clear();
        self.ends.clear();
        self.downsample.reset();
        self.generation.fetch_add(1, Ordering::Release);
        self.subscribers.notify(TableEvent::Reset);
    }

    /// Changes the decimation factor. Restarts the phase; retained history is kept.
    pub fn set_downsample_factor(&mut self, factor: usize) -> Result<(), SignalError> {
        self.downsample.set_factor(factor)
    }

    pub fn downsample(&self) -> &DownsampleController {
        &self.downsample
    }

    pub fn row_count(&self) -> usize {
        self.channel_count
    }

    pub fn column_count(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    pub fn epoch_count(&self) -> usize {
        self.history.len()
    }

    pub fn epochs(&self) -> &[SampleEpoch] {
        &self.history
    }

    /// Bumped after every append or reset.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Shared handle on the generation counter for readers living on another thread.
    pub fn generation_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    pub fn subscribe(&mut self) -> Receiver<TableEvent> {
        self.subscribers.subscribe()
    }

    pub(crate) fn attach(&mut self, sender: Sender<TableEvent>) {
        self.subscribers.attach(sender);
    }

    /// Maps a column to `(epoch index, offset within epoch)`.
    pub fn locate(&self, column: usize) -> Result<(usize, usize), SignalError> {
        let columns = self.column_count();
        if column >= columns {
            return Err(SignalError::column(column, columns));
        }
        let epoch = self.ends.partition_point(|&end| end <= column);
        let start = if epoch == 0 { 0 } else { self.ends[epoch - 1] };
        Ok((epoch, column - start))
    }

    pub fn value_at(&self, row: usize, column: usize) -> Result<f64, SignalError> {
        if row >= self.channel_count {
            return Err(SignalError::row(row, self.channel_count));
        }
        let (epoch, offset) = self.locate(column)?;
        self.history[epoch]
            .get(row, offset)
            .ok_or_else(|| SignalError::column(column, self.column_count()))
    }

    /// Every retained value of one channel, in column order.
    pub fn channel_values(&self, row: usize) -> Result<Vec<f64>, SignalError> {
        if row >= self.channel_count {
            return Err(SignalError::row(row, self.channel_count));
        }
        let mut values = Vec::with_capacity(self.column_count());
        for epoch in &self.history {
            values.extend(epoch.row(row).iter().copied());
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn epoch(channels: usize, width: usize, base: f64) -> SampleEpoch {
        SampleEpoch::new(Array2::from_shape_fn((channels, width), |(c, t)| {
            base + c as f64 * 100.0 + t as f64
        }))
    }

    #[test]
    fn factor_two_keeps_first_and_third() {
        let mut buf = SampleMatrixBuffer::new(2, 2).unwrap();
        assert!(buf.add_data(epoch(2, 3, 1000.0)).unwrap());
        assert!(!buf.add_data(epoch(2, 3, 2000.0)).unwrap());
        assert!(buf.add_data(epoch(2, 3, 3000.0)).unwrap());
        assert_eq!(buf.epoch_count(), 2);
        assert_eq!(buf.column_count(), 6);
        assert_eq!(buf.row_count(), 2);
        assert_eq!(buf.value_at(0, 0).unwrap(), 1000.0);
        assert_eq!(buf.value_at(1, 2).unwrap(), 1102.0);
        assert_eq!(buf.value_at(0, 3).unwrap(), 3000.0);
        assert_eq!(buf.value_at(1, 5).unwrap(), 3102.0);
        assert_eq!(buf.downsample().counter(), 1);
    }

    #[test]
    fn retained_count_is_ceil_of_arrivals() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let factor = rng.gen_range(1..=6);
            let total = rng.gen_range(0..40);
            let mut buf = SampleMatrixBuffer::new(1, factor).unwrap();
            for i in 0..total {
                buf.add_data(epoch(1, rng.gen_range(1..4), i as f64)).unwrap();
            }
            assert_eq!(buf.epoch_count(), (total + factor - 1) / factor);
        }
    }

    #[test]
    fn identity_decimation_keeps_everything() {
        let mut buf = SampleMatrixBuffer::new(3, 1).unwrap();
        for i in 0..10 {
            assert!(buf.add_data(epoch(3, 2, i as f64)).unwrap());
        }
        assert_eq!(buf.epoch_count(), 10);
        assert_eq!(buf.column_count(), 20);
    }

    #[test]
    fn values_round_trip_across_uneven_epochs() {
        let mut buf = SampleMatrixBuffer::new(2, 1).unwrap();
        let widths = [4usize, 1, 0, 7, 2];
        let mut expected: Vec<[f64; 2]> = Vec::new();
        for (i, &w) in widths.iter().enumerate() {
            let e = epoch(2, w, i as f64 * 1000.0);
            for t in 0..w {
                expected.push([e.get(0, t).unwrap(), e.get(1, t).unwrap()]);
            }
            buf.add_data(e).unwrap();
        }
        assert_eq!(buf.column_count(), expected.len());
        for (col, pair) in expected.iter().enumerate() {
            assert_eq!(buf.value_at(0, col).unwrap(), pair[0]);
            assert_eq!(buf.value_at(1, col).unwrap(), pair[1]);
        }
        assert_eq!(buf.locate(5).unwrap(), (3, 0));
        assert_eq!(buf.locate(4).unwrap(), (1, 0));
    }

    #[test]
    fn shape_mismatch_leaves_state_untouched() {
        let mut buf = SampleMatrixBuffer::new(2, 2).unwrap();
        buf.add_data(epoch(2, 3, 0.0)).unwrap();
        let before = buf.generation();
        let err = buf.add_data(epoch(3, 3, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            SignalError::Shape {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(buf.downsample().counter(), 1);
        assert_eq!(buf.epoch_count(), 1);
        assert_eq!(buf.generation(), before);
        // still usable
        assert!(!buf.add_data(epoch(2, 3, 0.0)).unwrap());
    }

    #[test]
    fn out_of_range_queries_are_index_errors() {
        let mut buf = SampleMatrixBuffer::new(2, 1).unwrap();
        assert!(matches!(buf.value_at(0, 0), Err(SignalError::Index { .. })));
        buf.add_data(epoch(2, 3, 0.0)).unwrap();
        assert!(matches!(
            buf.value_at(0, 3),
            Err(SignalError::Index { len: 3, .. })
        ));
        assert!(matches!(buf.value_at(2, 0), Err(SignalError::Index { .. })));
        assert!(buf.channel_values(2).is_err());
    }

    #[test]
    fn reset_clears_history_and_phase() {
        let mut buf = SampleMatrixBuffer::new(1, 3).unwrap();
        for i in 0..4 {
            buf.add_data(epoch(1, 2, i as f64)).unwrap();
        }
        assert_eq!(buf.downsample().counter(), 1);
        buf.reset();
        assert_eq!(buf.column_count(), 0);
        assert_eq!(buf.epoch_count(), 0);
        assert_eq!(buf.downsample().counter(), 0);
        assert_eq!(buf.downsample().factor(), 3);
        assert!(buf.add_data(epoch(1, 2, 9.0)).unwrap());
        assert_eq!(buf.value_at(0, 0).unwrap(), 9.0);
    }

    #[test]
    fn append_notifies_and_bumps_generation() {
        let mut buf = SampleMatrixBuffer::new(1, 2).unwrap();
        let rx = buf.subscribe();
        let handle = buf.generation_handle();
        buf.add_data(epoch(1, 4, 0.0)).unwrap();
        buf.add_data(epoch(1, 4, 0.0)).unwrap();
        assert_eq!(handle.load(Ordering::Acquire), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            TableEvent::ColumnsChanged { columns: 4 }
        );
        assert!(rx.try_recv().is_err());
        buf.reset();
        assert_eq!(rx.try_recv().unwrap(), TableEvent::Reset);
    }

    #[test]
    fn channel_values_concatenate_epochs() {
        let mut buf = SampleMatrixBuffer::new(2, 1).unwrap();
        buf.add_data(epoch(2, 2, 0.0)).unwrap();
        buf.add_data(epoch(2, 1, 10.0)).unwrap();
        assert_eq!(buf.channel_values(1).unwrap(), vec![100.0, 101.0, 110.0]);
    }

    #[test]
    fn construction_rejects_bad_parameters() {
        assert!(SampleMatrixBuffer::new(0, 1).is_err());
        assert!(SampleMatrixBuffer::new(2, 0).is_err());
    }
}
