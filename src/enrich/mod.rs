//! Event enrichment: server timestamps and exception fingerprints.

mod fingerprint;
mod frames;

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::domain::{EnrichedLogEntry, LogEntry, ProjectId};

pub use fingerprint::fingerprint;
pub use frames::{FrameMatcher, RegexFrameMatcher, StackFrame, default_matchers, parse_frames};

/// Turns validated [`LogEntry`] values into [`EnrichedLogEntry`] values.
///
/// Fingerprinting is a pure function of the entry. The only state is the
/// ingest clock, which keeps `ingested_at` strictly increasing within the
/// process even if the wall clock steps backwards.
pub struct Enricher {
    matchers: Vec<Box<dyn FrameMatcher>>,
    last_ingested_micros: AtomicI64,
}

impl Enricher {
    #[must_use]
    pub fn new() -> Self {
        Self::with_matchers(default_matchers())
    }

    /// Uses `matchers` in order instead of the built-in conventions.
    #[must_use]
    pub fn with_matchers(matchers: Vec<Box<dyn FrameMatcher>>) -> Self {
        Self {
            matchers,
            last_ingested_micros: AtomicI64::new(i64::MIN),
        }
    }

    #[must_use]
    pub fn enrich(&self, entry: LogEntry, project_id: ProjectId) -> EnrichedLogEntry {
        let error_fingerprint = fingerprint(&entry, &self.matchers);
        let ingested_at = self.next_ingested_at(Utc::now());
        EnrichedLogEntry::new(project_id, entry, ingested_at, error_fingerprint)
    }

    fn next_ingested_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = now.timestamp_micros();
        let mut last = self.last_ingested_micros.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last.saturating_add(1));
            match self.last_ingested_micros.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or(now),
                Err(observed) => last = observed,
            }
        }
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new()
    }
}
