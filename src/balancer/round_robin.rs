//! Round-robin file assignment: after file aggregation, file *i* goes to
//! shard `i mod effective_shard_count`. Ignores durations entirely; only
//! guarantees file-count fairness (`max(|shard|) - min(|shard|) <= 1`).

use chrono::Utc;

use super::{aggregate_by_file, ShardStrategy};
use crate::domain::{ShardAssignment, ShardPlan, TestTimingEntry};

/// # Example
///
/// ```
/// use sorry_currents::balancer::{RoundRobinStrategy, ShardStrategy};
/// use sorry_currents::domain::{TestIdentity, TestTimingEntry};
///
/// let entries = vec![
///     TestTimingEntry { test_id: TestIdentity::compute("a.ts", "t", "web"), file: "a.ts".into(), estimated_duration: 1, stddev: None },
///     TestTimingEntry { test_id: TestIdentity::compute("b.ts", "t", "web"), file: "b.ts".into(), estimated_duration: 1, stddev: None },
/// ];
/// let plan = RoundRobinStrategy.balance(&entries, 2);
/// assert_eq!(plan.assignments[0].files, vec!["a.ts"]);
/// assert_eq!(plan.assignments[1].files, vec!["b.ts"]);
/// ```
pub struct RoundRobinStrategy;

impl ShardStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn balance(&self, entries: &[TestTimingEntry], shard_count: u32) -> ShardPlan {
        let files = aggregate_by_file(entries);
        let effective_shards = (shard_count as usize).min(files.len()).max(1);

        let mut buckets: Vec<Vec<String>> = vec![Vec::new(); effective_shards];
        let mut totals: Vec<u64> = vec![0; effective_shards];
        for (i, file) in files.into_iter().enumerate() {
            let idx = i % effective_shards;
            totals[idx] += file.duration;
            buckets[idx].push(file.file);
        }

        let assignments: Vec<ShardAssignment> = buckets
            .into_iter()
            .zip(totals)
            .enumerate()
            .map(|(i, (files, estimated_duration))| ShardAssignment { shard_index: (i as u32) + 1, files, estimated_duration })
            .collect();

        let total_tests = entries.len();
        let max_shard_duration = assignments.iter().map(|a| a.estimated_duration).max().unwrap_or(0);
        let min_shard_duration = assignments.iter().map(|a| a.estimated_duration).min().unwrap_or(0);

        ShardPlan {
            assignments,
            strategy: "round-robin".to_string(),
            total_tests,
            max_shard_duration,
            min_shard_duration,
            improvement_percent: None,
            generated_at: Utc::now(),
        }
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
    fn file_count_fairness_within_one() {
        let entries = (0..7).map(|i| entry(&format!("f{i}.ts"), 10)).collect::<Vec<_>>();
        let plan = RoundRobinStrategy.balance(&entries, 3);
        let counts: Vec<usize> = plan.assignments.iter().map(|a| a.files.len()).collect();
        let max = *counts.iter().max().unwrap();
        let min = *counts.iter().min().unwrap();
        assert!(max - min <= 1, "counts: {counts:?}");
    }

    #[test]
    fn assigns_by_index_modulo_shard_count() {
        let entries = vec![entry("a", 1), entry("b", 1), entry("c", 1), entry("d", 1)];
        let plan = RoundRobinStrategy.balance(&entries, 2);
        assert_eq!(plan.assignments[0].files, vec!["a", "c"]);
        assert_eq!(plan.assignments[1].files, vec!["b", "d"]);
    }
}
