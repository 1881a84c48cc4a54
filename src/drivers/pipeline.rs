use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::drivers::source::{EpochSource, SampleEpoch};
use crate::drivers::{SampleMatrixBuffer, SignalError};

/// Counters gathered while moving epochs into a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub arrived: usize,
    pub retained: usize,
    pub rejected: usize,
}

impl PumpStats {
    fn record(&mut self, outcome: Result<bool, SignalError>) -> Result<(), SignalError> {
        self.arrived += 1;
        match outcome {
            Ok(true) => self.retained += 1,
            Ok(false) => {}
            Err(SignalError::Shape { expected, actual }) => {
                debug!("shape error ignored by pump: expected {expected}, got {actual}");
                self.rejected += 1;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

/// Pulls epochs from a source and feeds them into a buffer on the caller's thread.
pub struct SignalPipeline<S: EpochSource> {
    source: S,
    buffer: SampleMatrixBuffer,
}

impl<S: EpochSource> SignalPipeline<S> {
    pub fn new(source: S, buffer: SampleMatrixBuffer) -> Self {
        Self { source, buffer }
    }

    /// Moves one epoch. `Ok(None)` once the source is exhausted, otherwise whether the
    /// epoch was retained.
    pub fn pump_once(&mut self) -> Result<Option<bool>, SignalError> {
        let Some(epoch) = self.source.next_epoch()? else {
            return Ok(None);
        };
        self.buffer.add_data(epoch).map(Some)
    }

    /// Drains the source. Shape errors drop the offending epoch and are counted.
    pub fn pump_all(&mut self) -> Result<PumpStats, SignalError> {
        let mut stats = PumpStats::default();
        while let Some(epoch) = self.source.next_epoch()? {
            stats.record(self.buffer.add_data(epoch))?;
        }
        Ok(stats)
    }

    pub fn buffer(&self) -> &SampleMatrixBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut SampleMatrixBuffer {
        &mut self.buffer
    }

    pub fn into_parts(self) -> (S, SampleMatrixBuffer) {
        (self.source, self.buffer)
    }
}

/// Messages sent from a producer thread to the thread owning the buffer.
#[derive(Debug)]
pub enum StreamMessage {
    Epoch(SampleEpoch),
    Finished,
    Failed(String),
}

pub struct ProducerHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl ProducerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Asks the producer to stop and waits for it.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        self.join();
    }

    /// Waits for the producer to run out on its own.
    pub fn join(self) {
        if self.join.join().is_err() {
            warn!("producer thread panicked");
        }
    }
}

/// Runs `source` on a worker thread, sending each epoch over `tx`.
///
/// The buffer stays on the receiving side, so only one thread ever appends to it.
pub fn spawn_producer<S>(mut source: S, tx: Sender<StreamMessage>, interval: Duration) -> ProducerHandle
where
    S: EpochSource + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let join = thread::spawn(move || {
        info!("producer started");
        let mut sent = 0usize;
        while !flag.load(Ordering::Acquire) {
            match source.next_epoch() {
                Ok(Some(epoch)) => {
                    if tx.send(StreamMessage::Epoch(epoch)).is_err() {
                        debug!("consumer went away after {sent} epochs");
                        return;
                    }
                    sent += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("producer failed: {err}");
                    tx.send(StreamMessage::Failed(err.to_string())).ok();
                    return;
                }
            }
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
        info!("producer finished after {sent} epochs");
        tx.send(StreamMessage::Finished).ok();
    });
    ProducerHandle { stop, join }
}

/// What a drain pass observed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub stats: PumpStats,
    pub finished: bool,
    pub failure: Option<String>,
}

impl DrainOutcome {
    fn apply(
        &mut self,
        buffer: &mut SampleMatrixBuffer,
        message: StreamMessage,
    ) -> Result<(), SignalError> {
        match message {
            StreamMessage::Epoch(epoch) => self.stats.record(buffer.add_data(epoch))?,
            StreamMessage::Finished => self.finished = true,
            StreamMessage::Failed(reason) => {
                self.finished = true;
                self.failure = Some(reason);
            }
        }
        Ok(())
    }
}

/// Applies every message already queued, without blocking.
///
/// Fails with [`SignalError::Disconnected`] when the producer vanished without saying
/// it was done.
pub fn drain(
    buffer: &mut SampleMatrixBuffer,
    rx: &Receiver<StreamMessage>,
) -> Result<DrainOutcome, SignalError> {
    let mut outcome = DrainOutcome::default();
    while !outcome.finished {
        match rx.try_recv() {
            Ok(message) => outcome.apply(buffer, message)?,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => return Err(SignalError::Disconnected),
        }
    }
    Ok(outcome)
}

/// Blocks until the producer reports it is done.
pub fn drain_blocking(
    buffer: &mut SampleMatrixBuffer,
    rx: &Receiver<StreamMessage>,
) -> Result<DrainOutcome, SignalError> {
    let mut outcome = DrainOutcome::default();
    while !outcome.finished {
        let message = rx.recv().map_err(|_| SignalError::Disconnected)?;
        outcome.apply(buffer, message)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::{ManualSource, SyntheticSource};
    use ndarray::Array2;
    use std::sync::mpsc::channel;

    fn epoch(channels: usize, width: usize) -> SampleEpoch {
        SampleEpoch::new(Array2::ones((channels, width)))
    }

    struct Failing;

    impl EpochSource for Failing {
        fn next_epoch(&mut self) -> Result<Option<SampleEpoch>, SignalError> {
            Err(SignalError::InvalidConfig("boom".into()))
        }
    }

    #[test]
    fn pump_once_reports_acceptance_and_end() {
        let source = ManualSource::new(vec![epoch(2, 3), epoch(2, 3)]);
        let mut pipeline = SignalPipeline::new(source, SampleMatrixBuffer::new(2, 2).unwrap());
        assert_eq!(pipeline.pump_once().unwrap(), Some(true));
        assert_eq!(pipeline.pump_once().unwrap(), Some(false));
        assert_eq!(pipeline.pump_once().unwrap(), None);
        assert_eq!(pipeline.buffer().column_count(), 3);
    }

    #[test]
    fn pump_all_skips_misshaped_epochs() {
        let source = ManualSource::new(vec![epoch(2, 2), epoch(3, 2), epoch(2, 2), epoch(2, 2)]);
        let mut pipeline = SignalPipeline::new(source, SampleMatrixBuffer::new(2, 2).unwrap());
        let stats = pipeline.pump_all().unwrap();
        assert_eq!(
            stats,
            PumpStats {
                arrived: 4,
                retained: 2,
                rejected: 1
            }
        );
        let (_, buffer) = pipeline.into_parts();
        assert_eq!(buffer.epoch_count(), 2);
    }

    #[test]
    fn pump_all_propagates_source_errors() {
        let mut pipeline = SignalPipeline::new(Failing, SampleMatrixBuffer::new(1, 1).unwrap());
        assert!(pipeline.pump_all().is_err());
    }

    #[test]
    fn producer_thread_feeds_consumer() {
        let (tx, rx) = channel();
        let source = SyntheticSource::new(4, 8, 250.0, 3).unwrap().with_limit(10);
        let handle = spawn_producer(source, tx, Duration::ZERO);
        let mut buffer = SampleMatrixBuffer::new(4, 3).unwrap();
        let outcome = drain_blocking(&mut buffer, &rx).unwrap();
        handle.join();
        assert!(outcome.finished);
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.stats.arrived, 10);
        assert_eq!(buffer.epoch_count(), 4);
        assert_eq!(buffer.column_count(), 32);
    }

    #[test]
    fn producer_failure_is_reported() {
        let (tx, rx) = channel();
        let handle = spawn_producer(Failing, tx, Duration::ZERO);
        let mut buffer = SampleMatrixBuffer::new(1, 1).unwrap();
        let outcome = drain_blocking(&mut buffer, &rx).unwrap();
        handle.join();
        assert!(outcome.failure.unwrap().contains("boom"));
    }

    #[test]
    fn stop_ends_an_unbounded_producer() {
        let (tx, rx) = channel();
        let source = SyntheticSource::new(1, 4, 100.0, 0).unwrap();
        let handle = spawn_producer(source, tx, Duration::from_millis(1));
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        let mut buffer = SampleMatrixBuffer::new(1, 1).unwrap();
        let outcome = drain_blocking(&mut buffer, &rx).unwrap();
        assert!(outcome.finished);
        assert_eq!(outcome.stats.arrived, buffer.epoch_count());
    }

    #[test]
    fn drain_without_finish_is_disconnected() {
        let (tx, rx) = channel();
        tx.send(StreamMessage::Epoch(epoch(1, 2))).unwrap();
        let mut buffer = SampleMatrixBuffer::new(1, 1).unwrap();
        let outcome = drain(&mut buffer, &rx).unwrap();
        assert!(!outcome.finished);
        assert_eq!(outcome.stats.retained, 1);
        drop(tx);
        assert!(matches!(
            drain(&mut buffer, &rx),
            Err(SignalError::Disconnected)
        ));
    }
}
