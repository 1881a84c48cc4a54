// src/main.rs
use std::env;
use std::sync::mpsc::channel;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use signal_table::drivers::{
    drain_blocking, spawn_producer, ReplaySource, SyntheticSource, TextSampleLoader,
};
use signal_table::{Axis, ChannelSet, ChannelSource, SampleMatrixBuffer, StreamConfig, TableModel};

const PREVIEW_COLUMNS: usize = 8;

fn load_config() -> Result<StreamConfig> {
    match env::args().nth(1) {
        Some(path) => {
            StreamConfig::load(&path).with_context(|| format!("failed to read config {path}"))
        }
        None => {
            info!("no config given, running synthetic acquisition with defaults");
            Ok(StreamConfig::default())
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let config = load_config()?;

    let mut channels = if config.channels.is_empty() {
        let mut set = ChannelSet::new();
        for idx in 0..config.channel_count {
            set.push(ChannelSource::new(".", "", true, true).with_label(format!("Ch {idx}")));
        }
        set
    } else {
        let mut set = ChannelSet::from_specs(&config.channels);
        for (idx, err) in set.init_all(&TextSampleLoader) {
            warn!("channel {idx} stays empty: {err}");
        }
        set
    };

    let mut buffer = SampleMatrixBuffer::new(config.channel_count, config.downsample_factor)
        .context("failed to create sample buffer")?;
    let events = TableModel::watch(&mut buffer, &mut channels);

    let (tx, rx) = channel();
    let interval = Duration::from_millis(config.replay_interval_ms);
    let producer = if config.channels.is_empty() {
        let mut source = SyntheticSource::new(
            config.channel_count,
            config.epoch_width,
            config.sample_rate_hz,
            0x5EED,
        )?;
        if let Some(limit) = config.max_epochs {
            source = source.with_limit(limit);
        }
        spawn_producer(source, tx, interval)
    } else {
        let source = ReplaySource::from_channels(&channels, config.epoch_width, config.max_epochs)?;
        spawn_producer(source, tx, interval)
    };

    let outcome = drain_blocking(&mut buffer, &rx).context("acquisition stopped unexpectedly")?;
    producer.join();
    if let Some(reason) = &outcome.failure {
        warn!("producer reported a failure: {reason}");
    }
    info!(
        "{} epochs arrived, {} retained, {} rejected, {} change events",
        outcome.stats.arrived,
        outcome.stats.retained,
        outcome.stats.rejected,
        events.try_iter().count()
    );

    let model = TableModel::new(&buffer, &channels, config.row_policy)?
        .with_time_axis(config.time_axis, Some(config.sample_rate_hz));
    let shape = model.shape();
    println!("{} rows x {} columns", shape.rows, shape.columns);

    let shown = shape.columns.min(PREVIEW_COLUMNS);
    let mut header = String::from("channel");
    for col in 0..shown {
        header.push('\t');
        header.push_str(&model.header_label(Axis::Time, col)?);
    }
    println!("{header}");
    for row in 0..shape.rows {
        let mut line = model.header_label(Axis::Channel, row)?;
        for col in 0..shown {
            line.push_str(&format!("\t{:.3}", model.cell_value(row, col)?));
        }
        println!("{line}");
    }
    Ok(())
}
