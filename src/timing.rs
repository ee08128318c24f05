//! The timing corpus: per-test duration statistics with a bounded rolling
//! window, persisted as a [`VersionedEnvelope`] of [`ShardTimingEntry`].
//!
//! Read/write/update follows the load-or-default / malformed-warn-and-default
//! / atomic-write discipline `cache.rs`'s `ImageCache` applies to its own
//! JSON sidecar, generalized from a single cache file to this corpus.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::domain::{
    decode_tolerant, encode_envelope, envelope::EnvelopeError, ShardTimingEntry, TestResult, TestStatus, ValidationError,
};

#[derive(Debug, Error)]
pub enum TimingError {
    #[error("failed to read timing corpus {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("malformed timing corpus {path}: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
    #[error("invalid timing corpus entry in {path}: {source}")]
    Schema { path: String, #[source] source: ValidationError },
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Reads the timing corpus. A nonexistent file is a cold start, not an
/// error; a malformed one is an error (callers that want a tolerant
/// cold-start-on-malformed-too policy should catch and fall back themselves,
/// the way a shard-skip in the ingestor does).
pub fn read(path: &Path) -> Result<Vec<ShardTimingEntry>, TimingError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "timing corpus cold start");
            return Ok(Vec::new());
        }
        Err(e) => return Err(TimingError::Io { path: path.display().to_string(), source: e }),
    };
    let entries: Vec<ShardTimingEntry> =
        decode_tolerant(&content).map_err(|e| TimingError::Parse { path: path.display().to_string(), source: e })?;
    for entry in &entries {
        entry.validate().map_err(|e| TimingError::Schema { path: path.display().to_string(), source: e })?;
    }
    Ok(entries)
}

pub fn write(path: &Path, entries: &[ShardTimingEntry]) -> Result<(), TimingError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TimingError::Io { path: parent.display().to_string(), source: e })?;
    }
    let content = encode_envelope(entries)?;
    std::fs::write(path, content).map_err(|e| TimingError::Io { path: path.display().to_string(), source: e })?;
    Ok(())
}

fn population_stddev(values: &[u64]) -> u64 {
    if values.len() < 2 {
        return 0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    let variance = values.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt().round() as u64
}

/// Folds new test results into the corpus. Skipped and interrupted results
/// are ignored; this makes `update` the identity on the corpus when every
/// observed result is skipped/interrupted (invariant 2 in spec.md §8).
pub fn update(existing: Vec<ShardTimingEntry>, results: &[TestResult]) -> Vec<ShardTimingEntry> {
    let mut by_id: HashMap<String, ShardTimingEntry> =
        existing.into_iter().map(|e| (e.test_id.as_str().to_string(), e)).collect();

    for result in results {
        if matches!(result.status, TestStatus::Skipped | TestStatus::Interrupted) {
            continue;
        }
        let key = result.identity.as_str().to_string();
        match by_id.get_mut(&key) {
            None => {
                by_id.insert(key, ShardTimingEntry::new(result.identity, &result.file, &result.project, result.duration));
            }
            Some(entry) => {
                let samples = entry.samples.min(crate::cli::TIMING_SAMPLE_CAP - 1) + 1;
                let new_avg = ((entry.avg_duration as f64 * entry.samples as f64 + result.duration as f64)
                    / (entry.samples as f64 + 1.0))
                    .round() as u64;
                let new_p95 = if result.duration > entry.p95_duration {
                    result.duration
                } else {
                    (entry.p95_duration as f64 * 0.95 + result.duration as f64 * 0.05).round() as u64
                };
                entry.avg_duration = new_avg;
                entry.p95_duration = entry.p95_duration.max(new_p95);
                entry.samples = samples;
                entry.last_durations.push(result.duration);
                while entry.last_durations.len() > crate::cli::TIMING_WINDOW {
                    entry.last_durations.remove(0);
                }
                entry.stddev = population_stddev(&entry.last_durations);
            }
        }
    }

    by_id.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestIdentity;
    use tempfile::TempDir;

    fn make_result(file: &str, title: &str, status: TestStatus, duration: u64) -> TestResult {
        TestResult::new(file, title, "web", status, duration, 0, 0).unwrap()
    }

    #[test]
    fn cold_start_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timing-data.json");
        let entries = read(&path).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timing-data.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(read(&path).is_err());
    }

    #[test]
    fn schema_invalid_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timing-data.json");
        // Valid JSON, invalid invariant: samples=1 must imply stddev=0.
        let mut entry = ShardTimingEntry::new(TestIdentity::compute("a", "b", "c"), "a", "c", 100);
        entry.stddev = 5;
        write(&path, &[entry]).unwrap();
        assert!(matches!(read(&path), Err(TimingError::Schema { .. })));
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("timing-data.json");
        let entries = vec![ShardTimingEntry::new(TestIdentity::compute("a", "b", "c"), "a", "c", 100)];
        write(&path, &entries).unwrap();
        let read_back = read(&path).unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].avg_duration, 100);
    }

    #[test]
    fn update_is_identity_on_skipped_and_interrupted_only() {
        let results = vec![
            make_result("a.ts", "t1", TestStatus::Skipped, 0),
            make_result("a.ts", "t2", TestStatus::Interrupted, 0),
        ];
        let updated = update(Vec::new(), &results);
        assert!(updated.is_empty());
    }

    #[test]
    fn new_test_id_initializes_with_zero_stddev() {
        let results = vec![make_result("a.ts", "t1", TestStatus::Passed, 500)];
        let updated = update(Vec::new(), &results);
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].samples, 1);
        assert_eq!(updated[0].avg_duration, 500);
        assert_eq!(updated[0].stddev, 0);
    }

    #[test]
    fn window_and_sample_caps_hold() {
        let mut entries = Vec::new();
        for i in 0..60u64 {
            let results = vec![make_result("a.ts", "t1", TestStatus::Passed, 100 + i)];
            entries = update(entries, &results);
        }
        assert_eq!(entries.len(), 1);
        assert!(entries[0].samples <= 50);
        assert!(entries[0].last_durations.len() <= 20);
    }
}
