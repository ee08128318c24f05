//! The shard balancer: three named strategies sharing one contract
//! (`balance(entries, shard_count) -> ShardPlan`), optimal-shard-count
//! derivation from a target duration, and risk-adjusted duration estimates.
//!
//! Mirrors `offload`'s `orchestrator/scheduler.rs` shape: a handful of
//! strategies exposed as methods/impls on a small registry, each documented
//! and each covered by its own `#[cfg(test)]` module, rather than a single
//! do-everything function.

mod file_group;
mod lpt;
mod round_robin;

use std::collections::HashMap;

use chrono::Utc;

use crate::domain::{ShardAssignment, ShardPlan, TestTimingEntry};

pub use file_group::FileGroupStrategy;
pub use lpt::LptStrategy;
pub use round_robin::RoundRobinStrategy;

/// One file's aggregated workload: Playwright-style runners can only shard
/// at file granularity, so every strategy first collapses individual tests
/// into per-file totals.
#[derive(Debug, Clone)]
pub struct FileAggregate {
    pub file: String,
    pub duration: u64,
}

/// Sums estimated duration per file path, in first-occurrence order.
///
/// # Example
///
/// ```
/// use sorry_currents::balancer::aggregate_by_file;
/// use sorry_currents::domain::{TestIdentity, TestTimingEntry};
///
/// let entries = vec![
///     TestTimingEntry { test_id: TestIdentity::compute("a.ts", "t1", "web"), file: "a.ts".into(), estimated_duration: 100, stddev: None },
///     TestTimingEntry { test_id: TestIdentity::compute("a.ts", "t2", "web"), file: "a.ts".into(), estimated_duration: 50, stddev: None },
/// ];
/// let files = aggregate_by_file(&entries);
/// assert_eq!(files.len(), 1);
/// assert_eq!(files[0].duration, 150);
/// ```
pub fn aggregate_by_file(entries: &[TestTimingEntry]) -> Vec<FileAggregate> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, u64> = HashMap::new();
    for entry in entries {
        totals.entry(entry.file.clone()).and_modify(|d| *d += entry.estimated_duration).or_insert_with(|| {
            order.push(entry.file.clone());
            entry.estimated_duration
        });
    }
    order.into_iter().map(|file| {
        let duration = totals[&file];
        FileAggregate { file, duration }
    }).collect()
}

/// The single-method contract every strategy satisfies. Strategies are
/// stateless; the registry instantiates each once.
pub trait ShardStrategy {
    fn name(&self) -> &'static str;
    fn balance(&self, entries: &[TestTimingEntry], shard_count: u32) -> ShardPlan;
}

/// Looks up a strategy by its CLI-facing name (`lpt`, `round-robin`,
/// `file-group`).
///
/// # Example
///
/// ```
/// use sorry_currents::balancer::strategy_by_name;
///
/// let strategy = strategy_by_name("lpt").unwrap();
/// assert_eq!(strategy.name(), "lpt");
/// assert!(strategy_by_name("unknown-strategy").is_none());
/// ```
pub fn strategy_by_name(name: &str) -> Option<Box<dyn ShardStrategy>> {
    match name {
        "lpt" => Some(Box::new(LptStrategy)),
        "round-robin" => Some(Box::new(RoundRobinStrategy)),
        "file-group" => Some(Box::new(FileGroupStrategy)),
        _ => None,
    }
}

/// `ceil(total / target)` clamped to `[1, min(max_shards, file_count)]`.
/// Empty entries or a non-positive target both degenerate to 1 shard.
///
/// # Example
///
/// ```
/// use sorry_currents::balancer::calculate_optimal_shard_count;
/// use sorry_currents::domain::{TestIdentity, TestTimingEntry};
///
/// let entries: Vec<_> = ["a.ts", "b.ts", "c.ts"]
///     .iter()
///     .map(|f| TestTimingEntry { test_id: TestIdentity::compute(f, "t", "web"), file: (*f).into(), estimated_duration: 10_000, stddev: None })
///     .collect();
///
/// // 30s of total work, 10s budget, plenty of headroom -> 3 shards.
/// assert_eq!(calculate_optimal_shard_count(&entries, 10_000, 8), 3);
/// ```
pub fn calculate_optimal_shard_count(entries: &[TestTimingEntry], target_duration_ms: u64, max_shards: u32) -> u32 {
    if entries.is_empty() || target_duration_ms == 0 {
        return 1;
    }
    let files = aggregate_by_file(entries);
    let total: u64 = files.iter().map(|f| f.duration).sum();
    let ideal = total.div_ceil(target_duration_ms).max(1) as u32;
    let file_count = files.len() as u32;
    ideal.clamp(1, max_shards.min(file_count).max(1))
}

/// `round(avg + k*stddev)` when `stddev > 0 && k > 0`, else plain `avg`. A
/// zero historical average (never-before-seen test) falls back to the
/// configured default duration.
///
/// # Example
///
/// ```
/// use sorry_currents::balancer::risk_adjusted_estimate;
///
/// assert_eq!(risk_adjusted_estimate(5000, Some(1000), 1.0, 30_000), 6000);
/// // never-seen test (avg == 0) falls back to the configured default.
/// assert_eq!(risk_adjusted_estimate(0, None, 1.0, 30_000), 30_000);
/// ```
pub fn risk_adjusted_estimate(avg: u64, stddev: Option<u64>, risk_factor: f64, default_duration_ms: u64) -> u64 {
    if avg == 0 {
        return default_duration_ms;
    }
    match stddev {
        Some(s) if s > 0 && risk_factor > 0.0 => (avg as f64 + risk_factor * s as f64).round() as u64,
        _ => avg,
    }
}

/// Cold-start plan: no timing data and no test-directory listing. Emits
/// `shard_count` empty assignments so the driver can fall back to the child
/// runner's native shard-of-N mode.
///
/// # Example
///
/// ```
/// use sorry_currents::balancer::cold_start_plan;
///
/// let plan = cold_start_plan(8, "lpt");
/// assert_eq!(plan.assignments.len(), 8);
/// assert!(plan.assignments.iter().all(|a| a.files.is_empty()));
/// ```
pub fn cold_start_plan(shard_count: u32, strategy: &str) -> ShardPlan {
    let assignments = (1..=shard_count)
        .map(|i| ShardAssignment { shard_index: i, files: Vec::new(), estimated_duration: 0 })
        .collect();
    ShardPlan {
        assignments,
        strategy: strategy.to_string(),
        total_tests: 0,
        max_shard_duration: 0,
        min_shard_duration: 0,
        improvement_percent: None,
        generated_at: Utc::now(),
    }
}
