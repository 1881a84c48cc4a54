use std::collections::VecDeque;
use std::f64::consts::TAU;

use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::drivers::{ChannelSet, SignalError};

/// One arriving block of samples, shaped channels x time.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleEpoch {
    channels: Vec<usize>,
    samples: Array2<f64>,
}

impl SampleEpoch {
    /// Epoch covering channels `0..rows` in order.
    pub fn new(samples: Array2<f64>) -> Self {
        Self {
            channels: (0..samples.nrows()).collect(),
            samples,
        }
    }

    pub fn with_channels(channels: Vec<usize>, samples: Array2<f64>) -> Result<Self, SignalError> {
        if channels.len() != samples.nrows() {
            return Err(SignalError::Shape {
                expected: samples.nrows(),
                actual: channels.len(),
            });
        }
        Ok(Self { channels, samples })
    }

    /// Builds an epoch from per-channel rows, which must all have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, SignalError> {
        let width = rows.first().map_or(0, Vec::len);
        let channel_count = rows.len();
        let mut flat = Vec::with_capacity(channel_count * width);
        for (channel, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(SignalError::RaggedEpoch {
                    channel,
                    expected: width,
                    actual: row.len(),
                });
            }
            flat.extend(row);
        }
        let samples = Array2::from_shape_vec((channel_count, width), flat)
            .map_err(|err| SignalError::InvalidConfig(err.to_string()))?;
        Ok(Self::new(samples))
    }

    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.samples.nrows()
    }

    /// Number of time samples in this epoch.
    pub fn width(&self) -> usize {
        self.samples.ncols()
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    pub fn row(&self, channel: usize) -> ArrayView1<'_, f64> {
        self.samples.row(channel)
    }

    pub fn get(&self, channel: usize, offset: usize) -> Option<f64> {
        self.samples.get((channel, offset)).copied()
    }
}

/// Something that can yield sample epochs on demand.
pub trait EpochSource {
    fn next_epoch(&mut self) -> Result<Option<SampleEpoch>, SignalError>;
}

/// In-memory source for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<SampleEpoch>,
}

impl ManualSource {
    pub fn new(epochs: impl IntoIterator<Item = SampleEpoch>) -> Self {
        Self {
            queue: epochs.into_iter().collect(),
        }
    }

    pub fn push(&mut self, epoch: SampleEpoch) {
        self.queue.push_back(epoch);
    }
}

impl EpochSource for ManualSource {
    fn next_epoch(&mut self) -> Result<Option<SampleEpoch>, SignalError> {
        Ok(self.queue.pop_front())
    }
}

/// Simulated replay of loaded channel files.
///
/// Every channel walks its own history and wraps around at the end. Channels that are
/// disabled or have nothing loaded contribute zeros so the epoch keeps the full shape.
pub struct ReplaySource {
    tracks: Vec<Option<Vec<f64>>>,
    cursors: Vec<usize>,
    epoch_width: usize,
    remaining: Option<usize>,
}

impl ReplaySource {
    pub fn from_channels(
        channels: &ChannelSet,
        epoch_width: usize,
        max_epochs: Option<usize>,
    ) -> Result<Self, SignalError> {
        if epoch_width == 0 {
            return Err(SignalError::InvalidConfig(
                "epoch width must be at least 1".into(),
            ));
        }
        let tracks: Vec<Option<Vec<f64>>> = channels
            .iter()
            .map(|ch| (ch.is_enabled() && ch.is_loaded()).then(|| ch.samples().to_vec()))
            .collect();
        Ok(Self {
            cursors: vec![0; tracks.len()],
            tracks,
            epoch_width,
            remaining: max_epochs,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.tracks.len()
    }

    /// Rewinds every channel to its first sample.
    pub fn rewind(&mut self) {
        self.cursors.iter_mut().for_each(|c| *c = 0);
    }
}

impl EpochSource for ReplaySource {
    fn next_epoch(&mut self) -> Result<Option<SampleEpoch>, SignalError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        let mut samples = Array2::zeros((self.tracks.len(), self.epoch_width));
        for (idx, track) in self.tracks.iter().enumerate() {
            let Some(track) = track else {
                continue;
            };
            let cursor = &mut self.cursors[idx];
            for slot in samples.row_mut(idx).iter_mut() {
                *slot = track[*cursor];
                *cursor = (*cursor + 1) % track.len();
            }
        }
        Ok(Some(SampleEpoch::new(samples)))
    }
}

/// Stand-in for live acquisition: per-channel sines plus seeded noise.
pub struct SyntheticSource {
    channel_count: usize,
    epoch_width: usize,
    sample_rate_hz: f64,
    amplitude: f64,
    noise: f64,
    rng: StdRng,
    sample_index: u64,
    remaining: Option<usize>,
}

impl SyntheticSource {
    pub fn new(
        channel_count: usize,
        epoch_width: usize,
        sample_rate_hz: f64,
        seed: u64,
    ) -> Result<Self, SignalError> {
        if channel_count == 0 || epoch_width == 0 {
            return Err(SignalError::InvalidConfig(
                "synthetic source needs at least one channel and one sample per epoch".into(),
            ));
        }
        if sample_rate_hz <= 0.0 {
            return Err(SignalError::InvalidConfig(
                "sample rate must be greater than zero".into(),
            ));
        }
        Ok(Self {
            channel_count,
            epoch_width,
            sample_rate_hz,
            amplitude: 2.0,
            noise: 0.1,
            rng: StdRng::seed_from_u64(seed),
            sample_index: 0,
            remaining: None,
        })
    }

    pub fn with_amplitude(mut self, amplitude: f64, noise: f64) -> Self {
        self.amplitude = amplitude;
        self.noise = noise.abs();
        self
    }

    pub fn with_limit(mut self, max_epochs: usize) -> Self {
        self.remaining = Some(max_epochs);
        self
    }
}

impl EpochSource for SyntheticSource {
    fn next_epoch(&mut self) -> Result<Option<SampleEpoch>, SignalError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        let mut samples = Array2::zeros((self.channel_count, self.epoch_width));
        for t in 0..self.epoch_width {
            let secs = (self.sample_index + t as u64) as f64 / self.sample_rate_hz;
            for ch in 0..self.channel_count {
                // channel n oscillates at (1 + n/10) Hz
                let freq = ch as f64 * 0.1 + 1.0;
                let jitter = if self.noise > 0.0 {
                    self.rng.gen_range(-self.noise..=self.noise)
                } else {
                    0.0
                };
                samples[[ch, t]] = (TAU * freq * secs).sin() * self.amplitude + jitter;
            }
        }
        self.sample_index += self.epoch_width as u64;
        Ok(Some(SampleEpoch::new(samples)))
    }
}
