//! Diagnostic sinks for matrix tiles and vector slices.
//!
//! The engine reports intermediate data through a `DiagnosticSink`
//! handed to it at construction. `NullSink` drops everything,
//! `TracingSink` emits `tracing` events at debug level, and `DumpSink`
//! prints the values to a writer the way the benchmark's dump mode does.

use std::io::Write;
use std::sync::Mutex;

use crate::mesh::block::DenseBlock;

pub trait DiagnosticSink: Send + Sync {
    /// A process's matrix tile, reported once after initialization.
    fn matrix(&self, rank: usize, label: &str, block: &DenseBlock);

    /// A vector or vector slice at iteration `iteration` (`None` before
    /// the first iteration).
    fn vector(&self, rank: usize, label: &str, iteration: Option<usize>, values: &[i64]);
}

/// Discards all diagnostics.
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn matrix(&self, _rank: usize, _label: &str, _block: &DenseBlock) {}

    fn vector(&self, _rank: usize, _label: &str, _iteration: Option<usize>, _values: &[i64]) {}
}

/// Emits diagnostics as `tracing` debug events.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn matrix(&self, rank: usize, label: &str, block: &DenseBlock) {
        tracing::debug!(rank, label, rows = block.nrows, cols = block.ncols, "matrix tile");
        for i in 0..block.nrows {
            tracing::debug!(rank, label, row = i, values = ?block.row(i));
        }
    }

    fn vector(&self, rank: usize, label: &str, iteration: Option<usize>, values: &[i64]) {
        tracing::debug!(rank, label, ?iteration, ?values, "vector");
    }
}

/// Prints diagnostics as space-separated rows to a shared writer.
///
/// Output from different ranks is serialized per call, so one tile or
/// vector is never interleaved with another.
pub struct DumpSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> DumpSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, header: String, rows: impl Iterator<Item = String>) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Diagnostics are best-effort; a closed pipe must not fail the run.
        let _ = writeln!(writer, "{header}");
        for row in rows {
            let _ = writeln!(writer, "{row}");
        }
    }
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl<W: Write + Send> DiagnosticSink for DumpSink<W> {
    fn matrix(&self, rank: usize, label: &str, block: &DenseBlock) {
        self.emit(
            format!("Node[{rank}] {label}"),
            (0..block.nrows).map(|i| join(block.row(i))),
        );
    }

    fn vector(&self, rank: usize, label: &str, iteration: Option<usize>, values: &[i64]) {
        let header = match iteration {
            Some(k) => format!("Node[{rank}] {label} at iteration = {k}"),
            None => format!("Node[{rank}] {label}"),
        };
        self.emit(header, std::iter::once(join(values)));
    }
}
