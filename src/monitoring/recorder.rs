use crate::shared_data::GridSnapshot;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// One CSV row: a single intersection at one published instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub timestamp_ms: u64,
    pub node: String,
    pub cycle: u64,
    pub phase: usize,
    pub elapsed: u32,
    pub in_clearance: bool,
    pub total_pressure: u64,
    pub total_discharged: u64,
    pub congestion: f64,
    pub average_queue: f64,
    pub average_wait: f64,
    pub switch_threshold: u32,
}

impl SnapshotRecord {
    pub fn rows(grid: &GridSnapshot) -> impl Iterator<Item = SnapshotRecord> + '_ {
        grid.nodes.values().map(|s| SnapshotRecord {
            timestamp_ms: s.timestamp_ms,
            node: s.node.to_string(),
            cycle: s.cycle,
            phase: s.phase.0,
            elapsed: s.elapsed,
            in_clearance: s.in_clearance,
            total_pressure: s.total_pressure(),
            total_discharged: s.total_discharged,
            congestion: s.congestion,
            average_queue: s.average_queue,
            average_wait: s.average_wait,
            switch_threshold: s.switch_threshold,
        })
    }
}

/// Appends grid snapshots to a CSV sink, one row per intersection.
pub struct SnapshotRecorder<W: Write> {
    writer: csv::Writer<W>,
}

impl SnapshotRecorder<File> {
    /// Opens `path` for appending. The header row is only written when the
    /// file is new.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let path = path.as_ref();
        let file_exists = path.exists();
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);
        Ok(Self { writer })
    }
}

impl<W: Write> SnapshotRecorder<W> {
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    /// Writes every node of `grid` and flushes. Returns the row count.
    pub fn record(&mut self, grid: &GridSnapshot) -> Result<usize, csv::Error> {
        let mut rows = 0;
        for record in SnapshotRecord::rows(grid) {
            self.writer.serialize(&record)?;
            rows += 1;
        }
        self.writer.flush()?;
        Ok(rows)
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

/// Reads back every row from a recorded CSV source.
pub fn read_records<R: Read>(source: R) -> Result<Vec<SnapshotRecord>, csv::Error> {
    csv::Reader::from_reader(source).deserialize().collect()
}
