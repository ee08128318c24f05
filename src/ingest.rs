//! Report ingestor: discovers per-shard `*run-result*.json` files, validates
//! and skips malformed ones without aborting the merge, deduplicates retried
//! test observations, and merges the survivors into the one authoritative
//! `RunResult`.
//!
//! Generalizes `cache.rs`'s cold-start/malformed-is-fine-for-one-file
//! discipline to "one shard among many may be malformed without failing the
//! whole merge" (spec.md §7's *SchemaValidation* exception).

use std::path::Path;

use thiserror::Error;

use crate::domain::{RunResult, TestResult};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to walk input directory {path}: {source}")]
    Walk { path: String, #[source] source: std::io::Error },
    #[error("no valid shard result files found under {path}")]
    NoValidShards { path: String },
}

/// Recursively collects paths whose file name matches `*run-result*.json`.
pub fn discover(input_dir: &Path) -> Result<Vec<std::path::PathBuf>, IngestError> {
    let mut found = Vec::new();
    walk(input_dir, &mut found).map_err(|e| IngestError::Walk { path: input_dir.display().to_string(), source: e })?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<std::path::PathBuf>) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.contains("run-result") && name.ends_with(".json") {
                found.push(path);
            }
        }
    }
    Ok(())
}

/// Parses and schema-checks one shard file. Failures are the caller's to log
/// and skip — this function never panics and never aborts a batch merge.
fn load_shard(path: &Path) -> Option<RunResult> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read shard result, skipping");
            return None;
        }
    };
    let run = match serde_json::from_str::<RunResult>(&content) {
        Ok(run) => run,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed shard result, skipping");
            return None;
        }
    };
    if let Err(e) = run.tests.iter().try_for_each(|t| t.validate()) {
        tracing::warn!(path = %path.display(), error = %e, "shard result failed schema validation, skipping");
        return None;
    }
    Some(run)
}

/// Keeps only the observation with the greatest retry count for each test
/// id, per the per-shard reporter contract (spec.md §4.H).
fn dedupe_retries(tests: Vec<TestResult>) -> Vec<TestResult> {
    use std::collections::HashMap;
    let mut best: HashMap<String, TestResult> = HashMap::new();
    for test in tests {
        let key = test.identity.as_str().to_string();
        match best.get(&key) {
            Some(existing) if existing.retries >= test.retries => {}
            _ => {
                best.insert(key, test);
            }
        }
    }
    let mut out: Vec<TestResult> = best.into_values().collect();
    out.sort_by(|a, b| a.identity.as_str().cmp(b.identity.as_str()));
    out
}

/// Reads every discovered shard file, skips malformed ones, and merges the
/// survivors: concatenated (deduplicated) test list, duration = max across
/// shards, status/summary recomputed from the combined list (never summed).
/// Fatal (returns `Err`) if zero shards survived validation.
pub fn merge(input_dir: &Path, run_id: impl Into<String>) -> Result<RunResult, IngestError> {
    let paths = discover(input_dir)?;
    let shards: Vec<RunResult> = paths.iter().filter_map(|p| load_shard(p)).collect();

    if shards.is_empty() {
        return Err(IngestError::NoValidShards { path: input_dir.display().to_string() });
    }

    let first = &shards[0];
    let duration = shards.iter().map(|s| s.duration).max().unwrap_or(0);
    let shard_count = shards.len() as u32;
    let all_tests: Vec<TestResult> = shards.iter().flat_map(|s| s.tests.clone()).collect();
    let tests = dedupe_retries(all_tests);

    let merged = RunResult::new(run_id.into(), shard_count, tests, duration)
        .with_environment(first.environment.clone())
        .with_git(first.git.clone())
        .with_config(first.config.clone());

    Ok(merged)
}
