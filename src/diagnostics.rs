//! The deduplicating diagnostic store.
//!
//! Diagnostics from every compiler instance flow into one store, keyed by
//! logical identity `(file, line, message)`. When two instances report the
//! same finding the record is merged: the second instance's name is appended
//! to the attribution list instead of creating a duplicate block in the
//! report. Column is deliberately not part of the key — instances differing
//! only in target-specific column computation (macro-expansion drift) must
//! not be reported as distinct findings. The column of the first sighting is
//! kept on the record for display.
//!
//! The store is owned by one run and dropped with it; records are never
//! deleted while the run is in flight. `record` takes `&self` and is atomic,
//! so instances scheduled in parallel can share the store directly. Under
//! parallel scheduling the insertion order of records (and therefore the
//! block order of `render`) follows whichever instance's event arrives
//! first, which is not deterministic across runs; sequential scheduling is
//! the default and produces stable output.

use ahash::AHashMap;
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard};

/// One logical diagnostic, deduplicated across instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub file: String,
    pub line: u32,
    /// Column of the first sighting; display only, never part of the key.
    pub column: u32,
    pub message: String,
    /// Instance names that reported this finding, in arrival order,
    /// duplicate-free.
    pub producing_instances: Vec<String>,
}

#[derive(Debug, Default)]
struct StoreInner {
    records: Vec<DiagnosticRecord>,
    /// (file, line, message) -> index into `records`.
    index: AHashMap<(String, u32, String), usize>,
}

#[derive(Debug, Default)]
pub struct DiagnosticStore {
    inner: Mutex<StoreInner>,
}

impl DiagnosticStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("diagnostic store lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Record one diagnostic event from `instance`. Creates a record on the
    /// first sighting of a key; on subsequent sightings appends the instance
    /// name unless it is already attributed (repeated reports from the same
    /// instance for the same key are idempotent).
    pub fn record(&self, instance: &str, file: &str, line: u32, column: u32, message: &str) {
        let mut inner = self.inner();
        let key = (file.to_string(), line, message.to_string());
        match inner.index.get(&key).copied() {
            Some(idx) => {
                let record = &mut inner.records[idx];
                if !record.producing_instances.iter().any(|name| name == instance) {
                    record.producing_instances.push(instance.to_string());
                }
            }
            None => {
                let idx = inner.records.len();
                inner.records.push(DiagnosticRecord {
                    file: file.to_string(),
                    line,
                    column,
                    message: message.to_string(),
                    producing_instances: vec![instance.to_string()],
                });
                inner.index.insert(key, idx);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner().records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner().records.len()
    }

    /// Snapshot of the records in insertion order.
    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.inner().records.clone()
    }

    /// Render the aggregated report: one block per record, in first-sighted
    /// order. An empty store renders a single "no errors" line, never an
    /// empty block list.
    pub fn render(&self) -> String {
        let inner = self.inner();
        if inner.records.is_empty() {
            return "No compiler instance reported any errors!\n".to_string();
        }
        let mut out = String::new();
        for record in &inner.records {
            let _ = writeln!(out, "{}:", record.producing_instances.join(", "));
            let _ = writeln!(out, "{}:{}: error: {}", record.file, record.line, record.message);
        }
        out
    }
}
