use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use log::{debug, info, warn};

use crate::config::{ChannelSpec, RowPolicy};
use crate::drivers::table::{Subscribers, TableEvent};
use crate::drivers::SignalError;

/// Loader collaborator: turns a resource directory plus file name into a flat sample list.
pub trait SampleLoader {
    fn load(&self, resource_path: &Path, channel_file: &str) -> Result<Vec<f64>, SignalError>;
}

/// Reads plain text files holding numbers separated by whitespace, commas or semicolons.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextSampleLoader;

impl SampleLoader for TextSampleLoader {
    fn load(&self, resource_path: &Path, channel_file: &str) -> Result<Vec<f64>, SignalError> {
        let path = resource_path.join(channel_file);
        let text = fs::read_to_string(&path).map_err(|err| SignalError::Load {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<f64>().map_err(|err| SignalError::Load {
                    path: path.clone(),
                    reason: format!("bad sample {token:?}: {err}"),
                })
            })
            .collect()
    }
}

/// One channel's full sample history together with its source and display flags.
#[derive(Clone, Debug)]
pub struct ChannelSource {
    resource_path: PathBuf,
    channel_file: String,
    label: Option<String>,
    enabled: bool,
    visible: bool,
    samples: Vec<f64>,
    range: Option<(f64, f64)>,
}

impl ChannelSource {
    pub fn new(
        resource_path: impl Into<PathBuf>,
        channel_file: impl Into<String>,
        enabled: bool,
        visible: bool,
    ) -> Self {
        Self {
            resource_path: resource_path.into(),
            channel_file: channel_file.into(),
            label: None,
            enabled,
            visible,
            samples: Vec::new(),
            range: None,
        }
    }

    pub fn from_spec(spec: &ChannelSpec) -> Self {
        let mut channel = Self::new(
            spec.resource_path.clone(),
            spec.channel_file.clone(),
            spec.enabled,
            spec.visible,
        );
        channel.label = spec.label.clone();
        channel
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn resource_path(&self) -> &Path {
        &self.resource_path
    }

    /// Points the channel at another resource directory. Takes effect on the next load.
    pub fn set_resource_path(&mut self, path: impl Into<PathBuf>) {
        self.resource_path = path.into();
    }

    pub fn channel_file(&self) -> &str {
        &self.channel_file
    }

    /// Points the channel at another file. Takes effect on the next load.
    pub fn set_channel_file(&mut self, file: impl Into<String>) {
        self.channel_file = file.into();
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Display name: explicit label, then the file stem, then `None`.
    pub fn display_name(&self) -> Option<String> {
        if let Some(label) = &self.label {
            return Some(label.clone());
        }
        Path::new(&self.channel_file)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn minimum(&self) -> Option<f64> {
        self.range.map(|(min, _)| min)
    }

    pub fn maximum(&self) -> Option<f64> {
        self.range.map(|(_, max)| max)
    }

    pub fn is_loaded(&self) -> bool {
        !self.samples.is_empty()
    }

    /// Loads the samples through `loader` and recomputes min/max.
    ///
    /// Any previous history is dropped first, so calling this again after `clear` (or
    /// after re-sourcing) yields a fresh load. On failure the channel stays cleared.
    pub fn init_channel(&mut self, loader: &dyn SampleLoader) -> Result<(), SignalError> {
        self.clear();
        let samples = loader.load(&self.resource_path, &self.channel_file)?;
        if samples.is_empty() {
            return Err(SignalError::Load {
                path: self.resource_path.join(&self.channel_file),
                reason: "source yielded no samples".into(),
            });
        }
        self.range = scan_range(&samples);
        self.samples = samples;
        debug!(
            "loaded {} samples from {:?} (range {:?})",
            self.samples.len(),
            self.resource_path.join(&self.channel_file),
            self.range
        );
        Ok(())
    }

    /// Appends samples to the history, widening min/max as needed.
    pub fn append_samples(&mut self, samples: &[f64]) {
        if let Some((lo, hi)) = scan_range(samples) {
            self.range = Some(match self.range {
                Some((min, max)) => (min.min(lo), max.max(hi)),
                None => (lo, hi),
            });
        }
        self.samples.extend_from_slice(samples);
    }

    pub fn clear(&mut self) {
        self.samples = Vec::new();
        self.range = None;
    }
}

fn scan_range(samples: &[f64]) -> Option<(f64, f64)> {
    let mut iter = samples.iter().copied().filter(|v| !v.is_nan());
    let first = iter.next()?;
    Some(iter.fold((first, first), |(min, max), v| (min.min(v), max.max(v))))
}

/// Owned, ordered channel collection. Index positions are absolute channel ids and never
/// move; toggling flags only changes which of them show up as display rows.
#[derive(Debug, Default)]
pub struct ChannelSet {
    channels: Vec<ChannelSource>,
    subscribers: Subscribers,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[ChannelSpec]) -> Self {
        Self {
            channels: specs.iter().map(ChannelSource::from_spec).collect(),
            subscribers: Subscribers::default(),
        }
    }

    pub fn push(&mut self, channel: ChannelSource) -> usize {
        self.channels.push(channel);
        self.subscribers.notify(TableEvent::RowsChanged);
        self.channels.len() - 1
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChannelSource> {
        self.channels.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelSource> {
        self.channels.iter()
    }

    /// Change notifications for row membership. Senders whose receiver was dropped are pruned.
    pub fn subscribe(&mut self) -> Receiver<TableEvent> {
        self.subscribers.subscribe()
    }

    pub(crate) fn attach(&mut self, sender: std::sync::mpsc::Sender<TableEvent>) {
        self.subscribers.attach(sender);
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), SignalError> {
        let channel = self.slot(index)?;
        if channel.enabled != enabled {
            channel.set_enabled(enabled);
            self.subscribers.notify(TableEvent::RowsChanged);
        }
        Ok(())
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<(), SignalError> {
        let channel = self.slot(index)?;
        if channel.visible != visible {
            channel.set_visible(visible);
            self.subscribers.notify(TableEvent::RowsChanged);
        }
        Ok(())
    }

    /// Re-sources a channel. The old history stays until the next `init_channel`.
    pub fn set_source(
        &mut self,
        index: usize,
        resource_path: impl Into<PathBuf>,
        channel_file: impl Into<String>,
    ) -> Result<(), SignalError> {
        let channel = self.slot(index)?;
        channel.set_resource_path(resource_path);
        channel.set_channel_file(channel_file);
        Ok(())
    }

    pub fn init_channel(
        &mut self,
        index: usize,
        loader: &dyn SampleLoader,
    ) -> Result<(), SignalError> {
        self.slot(index)?.init_channel(loader)
    }

    pub fn clear_channel(&mut self, index: usize) -> Result<(), SignalError> {
        self.slot(index)?.clear();
        Ok(())
    }

    /// Loads every channel, returning the failures by index. A failed channel is left
    /// cleared and does not stop the others.
    pub fn init_all(&mut self, loader: &dyn SampleLoader) -> Vec<(usize, SignalError)> {
        let mut failures = Vec::new();
        for (idx, channel) in self.channels.iter_mut().enumerate() {
            if let Err(err) = channel.init_channel(loader) {
                warn!("channel {idx}: {err}");
                failures.push((idx, err));
            }
        }
        info!(
            "initialized {}/{} channels",
            self.channels.len() - failures.len(),
            self.channels.len()
        );
        failures
    }

    pub fn clear_all(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
    }

    /// Absolute channel indices that form display rows under `policy`, in order.
    pub fn rows(&self, policy: RowPolicy) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| match policy {
                RowPolicy::All => true,
                RowPolicy::EnabledVisible => ch.enabled && ch.visible,
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Header text for an absolute channel index.
    pub fn label_for(&self, index: usize) -> String {
        self.channels
            .get(index)
            .and_then(ChannelSource::display_name)
            .unwrap_or_else(|| format!("Ch {index}"))
    }

    fn slot(&mut self, index: usize) -> Result<&mut ChannelSource, SignalError> {
        let len = self.channels.len();
        self.channels
            .get_mut(index)
            .ok_or_else(|| SignalError::row(index, len))
    }
}
