//! The history corpus: per-test lifetime counters, rates, and top error
//! fingerprints, persisted as a [`VersionedEnvelope`] of [`TestHistoryEntry`].
//!
//! Same load-or-default / malformed-is-an-error / atomic-write contract as
//! [`crate::timing`], grounded on the same `cache.rs` pattern.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::domain::{
    decode_tolerant, encode_envelope, envelope::EnvelopeError, TestHistoryEntry, TestResult, TestStatus, TopError,
    ValidationError,
};
use crate::normalize::normalize;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read history corpus {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("malformed history corpus {path}: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
    #[error("invalid history corpus entry in {path}: {source}")]
    Schema { path: String, #[source] source: ValidationError },
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

pub fn read(path: &Path) -> Result<Vec<TestHistoryEntry>, HistoryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "history corpus cold start");
            return Ok(Vec::new());
        }
        Err(e) => return Err(HistoryError::Io { path: path.display().to_string(), source: e }),
    };
    let entries: Vec<TestHistoryEntry> =
        decode_tolerant(&content).map_err(|e| HistoryError::Parse { path: path.display().to_string(), source: e })?;
    for entry in &entries {
        entry.validate().map_err(|e| HistoryError::Schema { path: path.display().to_string(), source: e })?;
    }
    Ok(entries)
}

pub fn write(path: &Path, entries: &[TestHistoryEntry]) -> Result<(), HistoryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HistoryError::Io { path: parent.display().to_string(), source: e })?;
    }
    let content = encode_envelope(entries)?;
    std::fs::write(path, content).map_err(|e| HistoryError::Io { path: path.display().to_string(), source: e })?;
    Ok(())
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Folds new results into per-test counters, rates, and the top-errors list.
/// Entries untouched by this batch of results are preserved unchanged.
pub fn update(existing: Vec<TestHistoryEntry>, results: &[TestResult]) -> Vec<TestHistoryEntry> {
    let mut by_id: HashMap<String, TestHistoryEntry> =
        existing.into_iter().map(|e| (e.identity.as_str().to_string(), e)).collect();

    for result in results {
        let key = result.identity.as_str().to_string();
        let entry = by_id.entry(key).or_insert_with(|| TestHistoryEntry::new(result.identity));

        entry.total_runs += 1;
        if result.status == TestStatus::Passed && !result.is_flaky {
            entry.pass_count += 1;
        }
        if matches!(result.status, TestStatus::Failed | TestStatus::TimedOut) {
            entry.fail_count += 1;
        }
        if result.is_flaky {
            entry.flaky_count += 1;
        }
        if result.status == TestStatus::Skipped {
            entry.skip_count += 1;
        }

        if result.status != TestStatus::Skipped {
            let samples = entry.last_durations.len() as f64;
            entry.avg_duration = if samples == 0.0 {
                result.duration
            } else {
                ((entry.avg_duration as f64 * samples + result.duration as f64) / (samples + 1.0)).round() as u64
            };
            let new_p95 = if result.duration > entry.p95_duration {
                result.duration
            } else {
                (entry.p95_duration as f64 * 0.95 + result.duration as f64 * 0.05).round() as u64
            };
            entry.p95_duration = entry.p95_duration.max(new_p95);
            entry.last_durations.push(result.duration);
            while entry.last_durations.len() > crate::cli::HISTORY_WINDOW {
                entry.last_durations.remove(0);
            }
        }

        entry.flakiness_rate = round4(entry.flaky_count as f64 / entry.total_runs as f64);
        entry.failure_rate = round4(entry.fail_count as f64 / entry.total_runs as f64);
        entry.last_seen = result.started_at;

        if matches!(result.status, TestStatus::Failed | TestStatus::TimedOut) {
            fold_top_errors(entry, result);
        }
    }

    by_id.into_values().collect()
}

fn fold_top_errors(entry: &mut TestHistoryEntry, result: &TestResult) {
    for error in &result.errors {
        let normalized = normalize(&error.message);
        if let Some(existing) = entry.top_errors.iter_mut().find(|e| e.normalized_message == normalized) {
            existing.count += 1;
            existing.last_seen = result.started_at;
            if error.stack.is_some() {
                existing.example_stack = error.stack.clone();
            }
        } else {
            entry.top_errors.push(TopError {
                normalized_message: normalized,
                count: 1,
                last_seen: result.started_at,
                example_stack: error.stack.clone(),
            });
        }
    }
    // Keep the 5 entries with highest count, ties broken by most-recently-seen.
    entry.top_errors.sort_by(|a, b| b.count.cmp(&a.count).then(b.last_seen.cmp(&a.last_seen)));
    entry.top_errors.truncate(crate::cli::HISTORY_TOP_ERRORS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TestError, TestIdentity};
    use tempfile::TempDir;

    #[test]
    fn schema_invalid_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut entry = TestHistoryEntry::new(TestIdentity::compute("a", "b", "c"));
        entry.flakiness_rate = 1.5; // out of [0, 1]
        write(&path, &[entry]).unwrap();
        assert!(matches!(read(&path), Err(HistoryError::Schema { .. })));
    }

    fn make_result(title: &str, status: TestStatus, retries: u32) -> TestResult {
        TestResult::new("a.ts", title, "web", status, 100, retries, 0).unwrap()
    }

    #[test]
    fn counters_and_rates_accumulate() {
        let r1 = make_result("t1", TestStatus::Passed, 0);
        let r2 = make_result("t1", TestStatus::Failed, 0);
        let entries = update(Vec::new(), std::slice::from_ref(&r1));
        let entries = update(entries, std::slice::from_ref(&r2));
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.total_runs, 2);
        assert_eq!(e.pass_count, 1);
        assert_eq!(e.fail_count, 1);
        assert_eq!(e.failure_rate, 0.5);
    }

    #[test]
    fn rates_stay_in_bounds() {
        let results: Vec<_> = (0..7).map(|i| make_result("t1", if i % 2 == 0 { TestStatus::Failed } else { TestStatus::Passed }, 0)).collect();
        let entries = update(Vec::new(), &results);
        for e in &entries {
            assert!((0.0..=1.0).contains(&e.flakiness_rate));
            assert!((0.0..=1.0).contains(&e.failure_rate));
        }
    }

    #[test]
    fn top_errors_capped_at_five_and_counted() {
        let mut entry = TestHistoryEntry::new(TestIdentity::compute("a.ts", "t1", "web"));
        for i in 0..8 {
            let result = TestResult::new("a.ts", "t1", "web", TestStatus::Failed, 100, 0, 0)
                .unwrap()
                .with_error(TestError::new(format!("error kind {}", i % 6)));
            fold_top_errors(&mut entry, &result);
        }
        assert!(entry.top_errors.len() <= 5);
        assert!(entry.top_errors.iter().any(|e| e.normalized_message == "error kind 0" && e.count >= 1));
    }

    #[test]
    fn unseen_tests_preserved_unchanged() {
        let existing = vec![TestHistoryEntry::new(TestIdentity::compute("z.ts", "untouched", "web"))];
        let new_result = make_result("t1", TestStatus::Passed, 0);
        let updated = update(existing, std::slice::from_ref(&new_result));
        assert_eq!(updated.len(), 2);
    }
}
