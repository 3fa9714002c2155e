// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Per-Timestep JSONL Time Series
// Outputs one JSON line per timestep for independent analysis

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestepSnapshot {
    pub time_step: u64,
    /// Smoothed quality after this step.
    pub quality: f64,
    pub quality_diff: f64,
    /// Raw mean quality over human feed slots, before smoothing.
    pub measured_quality: f64,
    /// Mean pre-merge slot age over the feeds merged this step.
    pub mean_feed_age: f64,
    pub human_slots: usize,
    pub unique_human_messages: usize,
    pub total_slots: usize,
    pub messages_created: u64,
    /// Share of all views so far that went to zero-quality messages.
    pub low_quality_exposure: f64,
}

/// Recorder that accumulates snapshots and writes JSONL
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimeSeries {
    snapshots: Vec<TimestepSnapshot>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, snapshot: TimestepSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn snapshots(&self) -> &[TimestepSnapshot] {
        &self.snapshots
    }

    /// Smoothed quality at the end of each recorded step.
    pub fn quality_trace(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.quality).collect()
    }

    /// One JSON object per line, in step order.
    pub fn write_jsonl<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for snapshot in &self.snapshots {
            serde_json::to_writer(&mut out, snapshot)?;
            out.write_all(b"\n")?;
        }
        out.flush()
    }

    /// `write_jsonl` into a file, creating its directory if needed.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.write_jsonl(BufWriter::new(File::create(path)?))
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
