use crate::drivers::SignalError;

/// Modulo counter deciding which arriving epochs are kept for display.
///
/// The first arrival after construction or [`reset`](Self::reset) is always accepted,
/// then one in every `factor` after it. The phase only depends on the arrival count,
/// so replaying the same stream keeps the same epochs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownsampleController {
    factor: usize,
    counter: usize,
}

impl DownsampleController {
    pub fn new(factor: usize) -> Result<Self, SignalError> {
        if factor == 0 {
            return Err(SignalError::InvalidConfig(
                "downsample factor must be at least 1".into(),
            ));
        }
        Ok(Self { factor, counter: 0 })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Current phase, always in `0..factor`.
    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Registers one arrival and reports whether it is retained.
    pub fn advance(&mut self) -> bool {
        let accept = self.counter == 0;
        self.counter = (self.counter + 1) % self.factor;
        accept
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    /// Replaces the factor and restarts the phase.
    pub fn set_factor(&mut self, factor: usize) -> Result<(), SignalError> {
        *self = Self::new(factor)?;
        Ok(())
    }
}

impl Default for DownsampleController {
    fn default() -> Self {
        Self {
            factor: 1,
            counter: 0,
        }
    }
}
