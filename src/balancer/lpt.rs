//! Longest-processing-time-first bin packing.
//!
//! Sort files by total duration descending; repeatedly drop the next file
//! into whichever bucket currently has the smallest running total. This is
//! the classic LPT heuristic: `makespan <= OPT + p_max` where `p_max` is the
//! largest file's aggregate duration.

use chrono::Utc;

use super::{aggregate_by_file, FileAggregate, ShardStrategy};
use crate::domain::{ShardAssignment, ShardPlan, TestTimingEntry};

/// # Example
///
/// ```
/// use sorry_currents::balancer::{LptStrategy, ShardStrategy};
/// use sorry_currents::domain::{TestIdentity, TestTimingEntry};
///
/// let entries = vec![
///     TestTimingEntry { test_id: TestIdentity::compute("a.ts", "t", "web"), file: "a.ts".into(), estimated_duration: 10_000, stddev: None },
///     TestTimingEntry { test_id: TestIdentity::compute("b.ts", "t", "web"), file: "b.ts".into(), estimated_duration: 2_000, stddev: None },
/// ];
/// let plan = LptStrategy.balance(&entries, 2);
/// assert_eq!(plan.assignments.len(), 2);
/// ```
pub struct LptStrategy;

impl ShardStrategy for LptStrategy {
    fn name(&self) -> &'static str {
        "lpt"
    }

    fn balance(&self, entries: &[TestTimingEntry], shard_count: u32) -> ShardPlan {
        balance_lpt(entries, shard_count, "lpt")
    }
}

pub(super) fn balance_lpt(entries: &[TestTimingEntry], shard_count: u32, strategy_name: &str) -> ShardPlan {
    let mut files = aggregate_by_file(entries);
    let effective_shards = (shard_count as usize).min(files.len()).max(1);

    files.sort_by(|a, b| b.duration.cmp(&a.duration).then(a.file.cmp(&b.file)));

    let mut buckets: Vec<Vec<FileAggregate>> = vec![Vec::new(); effective_shards];
    let mut totals: Vec<u64> = vec![0; effective_shards];

    for file in files {
        let (idx, _) = totals
            .iter()
            .enumerate()
            .min_by(|(ai, a), (bi, b)| a.cmp(b).then(ai.cmp(bi)))
            .expect("effective_shards >= 1");
        totals[idx] += file.duration;
        buckets[idx].push(file);
    }

    let assignments: Vec<ShardAssignment> = buckets
        .into_iter()
        .enumerate()
        .map(|(i, files)| ShardAssignment {
            shard_index: (i as u32) + 1,
            estimated_duration: files.iter().map(|f| f.duration).sum(),
            files: files.into_iter().map(|f| f.file).collect(),
        })
        .collect();

    let total_tests = entries.len();
    let max_shard_duration = assignments.iter().map(|a| a.estimated_duration).max().unwrap_or(0);
    let min_shard_duration = assignments.iter().map(|a| a.estimated_duration).min().unwrap_or(0);
    let total_duration: u64 = assignments.iter().map(|a| a.estimated_duration).sum();
    let naive_max = if effective_shards > 0 { total_duration as f64 / effective_shards as f64 } else { 0.0 };
    let improvement_percent = if naive_max > 0.0 {
        Some(((naive_max - max_shard_duration as f64) / naive_max) * 100.0)
    } else {
        None
    };

    ShardPlan {
        assignments,
        strategy: strategy_name.to_string(),
        total_tests,
        max_shard_duration,
        min_shard_duration,
        improvement_percent,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestIdentity;

    fn entry(file: &str, duration: u64) -> TestTimingEntry {
        TestTimingEntry { test_id: TestIdentity::compute(file, "t", "p"), file: file.into(), estimated_duration: duration, stddev: None }
    }

    #[test]
    fn scenario_1_lpt_four_files_two_shards() {
        let entries = vec![entry("a", 10_000), entry("b", 10_000), entry("c", 2_000), entry("d", 3_000)];
        let plan = LptStrategy.balance(&entries, 2);
        assert_eq!(plan.max_shard_duration, 13_000);
        let durations: Vec<u64> = plan.assignments.iter().map(|a| a.estimated_duration).collect();
        let mut sorted = durations.clone();
        sorted.sort();
        assert_eq!(sorted, vec![12_000, 13_000]);
        let shard_with_a = plan.assignments.iter().find(|a| a.files.contains(&"a".to_string())).unwrap();
        assert!(shard_with_a.files.contains(&"d".to_string()));
    }

    #[test]
    fn plan_conservation_count_and_duration() {
        let entries = vec![entry("a", 100), entry("b", 200), entry("c", 300), entry("a", 50)];
        let plan = LptStrategy.balance(&entries, 2);
        let plan_files: std::collections::HashSet<_> =
            plan.assignments.iter().flat_map(|a| a.files.iter().cloned()).collect();
        assert_eq!(plan_files, ["a", "b", "c"].into_iter().map(String::from).collect());
        let plan_total: u64 = plan.assignments.iter().map(|a| a.estimated_duration).sum();
        assert_eq!(plan_total, 150 + 200 + 300);
    }

    #[test]
    fn lpt_guarantee_holds() {
        let entries = vec![entry("a", 50), entry("b", 40), entry("c", 30), entry("d", 20), entry("e", 10)];
        let shard_count = 2;
        let plan = LptStrategy.balance(&entries, shard_count);
        let total: u64 = entries.iter().map(|e| e.estimated_duration).sum();
        let effective = (shard_count as usize).min(entries.len()) as u64;
        let p_max = entries.iter().map(|e| e.estimated_duration).max().unwrap();
        assert!(plan.max_shard_duration <= total / effective + p_max);
    }

    #[test]
    fn shard_count_exceeds_file_count() {
        let entries = vec![entry("a", 100), entry("b", 200)];
        let plan = LptStrategy.balance(&entries, 10);
        assert_eq!(plan.assignments.len(), 2);
    }

    #[test]
    fn empty_entries_yields_single_empty_assignment() {
        let plan = LptStrategy.balance(&[], 4);
        assert_eq!(plan.assignments.len(), 1);
        assert!(plan.assignments[0].files.is_empty());
    }
}
