//! The orchestration driver: the `plan / run / merge / report / notify /
//! history` state machine gluing every other module together.
//!
//! Grounded on `main.rs`'s subcommand-dispatch shape (`run_tests`,
//! `create_reporter`) and `orchestrator.rs`'s top-level coordination style,
//! generalized from offload's provider/framework abstraction to this crate's
//! flags-only surface.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::balancer::{self, ShardStrategy};
use crate::domain::{RunResult, ShardPlan, TestIdentity, TestTimingEntry};
use crate::exec::{self, ExecutionMode};
use crate::history::{self, HistoryError};
use crate::ingest::{self, IngestError};
use crate::timing::{self, TimingError};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Timing(#[from] TimingError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("unknown balancer strategy: {0}")]
    UnknownStrategy(String),
    #[error("merged run result not found at {0}")]
    MergedRecordMissing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("malformed merged run result at {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),
}

pub struct PlanRequest {
    pub shards: Option<u32>,
    pub target_duration_secs: Option<u64>,
    pub max_shards: u32,
    pub timing_path: PathBuf,
    pub test_dir: Option<PathBuf>,
    pub strategy: String,
    pub risk_factor: f64,
    pub default_timeout_ms: u64,
}

/// Builds risk-adjusted [`TestTimingEntry`] inputs from the timing corpus,
/// or — if the corpus is cold and no test-directory listing was supplied —
/// returns `None` to signal cold-start.
fn build_balancer_inputs(req: &PlanRequest) -> Result<Option<Vec<TestTimingEntry>>, DriverError> {
    let corpus = timing::read(&req.timing_path)?;

    if corpus.is_empty() {
        return match &req.test_dir {
            None => Ok(None),
            Some(dir) => Ok(Some(discover_files_as_entries(dir, req.default_timeout_ms))),
        };
    }

    let entries = corpus
        .into_iter()
        .map(|e| {
            let estimated = balancer::risk_adjusted_estimate(e.avg_duration, Some(e.stddev), req.risk_factor, req.default_timeout_ms);
            TestTimingEntry { test_id: e.test_id, file: e.file, estimated_duration: estimated, stddev: Some(e.stddev) }
        })
        .collect();
    Ok(Some(entries))
}

fn discover_files_as_entries(dir: &Path, default_timeout_ms: u64) -> Vec<TestTimingEntry> {
    let mut files = Vec::new();
    collect_files(dir, &mut files);
    files
        .into_iter()
        .map(|f| TestTimingEntry {
            test_id: TestIdentity::compute(&f, &f, "default"),
            file: f,
            estimated_duration: default_timeout_ms,
            stddev: None,
        })
        .collect()
}

fn collect_files(dir: &Path, out: &mut Vec<String>) {
    let Ok(read_dir) = std::fs::read_dir(dir) else { return };
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else if let Some(s) = path.to_str() {
            out.push(s.to_string());
        }
    }
}

/// Produces a [`ShardPlan`]: chooses the strategy, derives/accepts a shard
/// count, and balances — or falls back to [`balancer::cold_start_plan`] when
/// there is nothing to balance yet.
pub fn plan(req: &PlanRequest) -> Result<ShardPlan, DriverError> {
    let strategy = balancer::strategy_by_name(&req.strategy).ok_or_else(|| DriverError::UnknownStrategy(req.strategy.clone()))?;

    let inputs = build_balancer_inputs(req)?;
    let Some(entries) = inputs else {
        // Cold start has no durations to derive an ideal count from; an
        // explicit --shards wins, otherwise fall back to the full
        // --max-shards width (scenario 2: target-duration + max-shards=8
        // with an empty corpus produces 8 empty assignments).
        let shard_count = req.shards.unwrap_or(req.max_shards).max(1);
        return Ok(balancer::cold_start_plan(shard_count, &req.strategy));
    };

    let shard_count = match req.shards {
        Some(n) => n,
        None => {
            let target_ms = req.target_duration_secs.unwrap_or(0) * 1000;
            balancer::calculate_optimal_shard_count(&entries, target_ms, req.max_shards)
        }
    };

    Ok(strategy.balance(&entries, shard_count))
}

/// Matrix descriptor for the CI system: `{include: [{shardIndex, shardTotal}, ...]}`.
pub fn build_matrix(plan: &ShardPlan) -> serde_json::Value {
    let shard_total = plan.assignments.len();
    let include: Vec<_> = plan
        .assignments
        .iter()
        .map(|a| serde_json::json!({"shardIndex": a.shard_index, "shardTotal": shard_total}))
        .collect();
    serde_json::json!({ "include": include })
}

/// Runs one shard's child process and returns its exit code.
pub async fn run_shard(
    plan: &ShardPlan,
    shard_index: u32,
    program: &str,
    run_id: &str,
    working_dir: Option<&Path>,
    extra_args: &[String],
) -> Result<i32, DriverError> {
    let shard_total = plan.assignments.len().max(1) as u32;
    let mode: ExecutionMode = exec::resolve_mode(plan, shard_index, shard_total);
    let code = exec::run(program, &mode, run_id, working_dir, extra_args).await?;
    Ok(code)
}

/// Reads/validates/merges per-shard files, writes the merged record, and
/// folds its tests into the timing corpus.
pub fn merge(input_dir: &Path, output_dir: &Path, run_id: &str, timing_path: &Path) -> Result<RunResult, DriverError> {
    let merged = ingest::merge(input_dir, run_id)?;

    std::fs::create_dir_all(output_dir).map_err(|e| DriverError::Io { path: output_dir.to_path_buf(), source: e })?;
    let merged_path = output_dir.join("merged-run-result.json");
    let content = serde_json::to_string_pretty(&merged).map_err(|e| DriverError::Parse { path: merged_path.clone(), source: e })?;
    std::fs::write(&merged_path, content + "\n").map_err(|e| DriverError::Io { path: merged_path.clone(), source: e })?;

    let corpus = timing::read(timing_path)?;
    let updated = timing::update(corpus, &merged.tests);
    timing::write(timing_path, &updated)?;

    Ok(merged)
}

/// Reads the merged record a previous `merge` wrote.
pub fn read_merged_record(output_dir: &Path) -> Result<RunResult, DriverError> {
    let path = output_dir.join("merged-run-result.json");
    let content = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DriverError::MergedRecordMissing(path.clone())
        } else {
            DriverError::Io { path: path.clone(), source: e }
        }
    })?;
    serde_json::from_str(&content).map_err(|e| DriverError::Parse { path, source: e })
}

/// Folds the merged record's tests into the history corpus and returns the
/// updated corpus (callers that also want a report render separately).
pub fn update_history(history_path: &Path, merged: &RunResult) -> Result<Vec<crate::domain::TestHistoryEntry>, DriverError> {
    let corpus = history::read(history_path)?;
    let updated = history::update(corpus, &merged.tests);
    history::write(history_path, &updated)?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scenario_2_cold_start_plan_uses_max_shards_width() {
        let dir = TempDir::new().unwrap();
        let req = PlanRequest {
            shards: None,
            target_duration_secs: Some(30),
            max_shards: 8,
            timing_path: dir.path().join("timing-data.json"),
            test_dir: None,
            strategy: "lpt".to_string(),
            risk_factor: 0.0,
            default_timeout_ms: 30_000,
        };
        let plan = plan(&req).unwrap();
        assert_eq!(plan.assignments.len(), 8);
        assert!(plan.assignments.iter().all(|a| a.files.is_empty()));
    }

    #[test]
    fn cold_start_plan_honors_explicit_shards_over_max_shards() {
        let dir = TempDir::new().unwrap();
        let req = PlanRequest {
            shards: Some(2),
            target_duration_secs: None,
            max_shards: 8,
            timing_path: dir.path().join("timing-data.json"),
            test_dir: None,
            strategy: "lpt".to_string(),
            risk_factor: 0.0,
            default_timeout_ms: 30_000,
        };
        let plan = plan(&req).unwrap();
        assert_eq!(plan.assignments.len(), 2);
    }

    #[test]
    fn explicit_shard_count_overrides_target_duration() {
        let dir = TempDir::new().unwrap();
        let entries = vec![crate::domain::ShardTimingEntry::new(TestIdentity::compute("a", "t", "p"), "a.ts", "p", 10_000)];
        timing::write(&dir.path().join("timing-data.json"), &entries).unwrap();
        let req = PlanRequest {
            shards: Some(3),
            target_duration_secs: None,
            max_shards: 8,
            timing_path: dir.path().join("timing-data.json"),
            test_dir: None,
            strategy: "round-robin".to_string(),
            risk_factor: 0.0,
            default_timeout_ms: 30_000,
        };
        let plan = plan(&req).unwrap();
        assert_eq!(plan.assignments.len(), 1); // only 1 file to spread across 3 shards
    }

    #[test]
    fn matrix_reflects_shard_total() {
        let plan = balancer::cold_start_plan(3, "lpt");
        let matrix = build_matrix(&plan);
        assert_eq!(matrix["include"].as_array().unwrap().len(), 3);
        assert_eq!(matrix["include"][0]["shardTotal"], 3);
    }
}
