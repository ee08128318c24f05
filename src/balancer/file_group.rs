//! File-group strategy: identical packing to LPT, exposed under its own
//! name for users who think in terms of "tests in a file share expensive
//! setup" rather than "longest processing time first." Its assignments hold
//! file paths, exactly as LPT's do — trivially cohesive per test.

use super::lpt::balance_lpt;
use super::ShardStrategy;
use crate::domain::{ShardPlan, TestTimingEntry};

/// # Example
///
/// ```
/// use sorry_currents::balancer::{FileGroupStrategy, ShardStrategy};
/// use sorry_currents::domain::{TestIdentity, TestTimingEntry};
///
/// let entries = vec![
///     TestTimingEntry { test_id: TestIdentity::compute("a.ts", "t1", "web"), file: "a.ts".into(), estimated_duration: 100, stddev: None },
///     TestTimingEntry { test_id: TestIdentity::compute("a.ts", "t2", "web"), file: "a.ts".into(), estimated_duration: 50, stddev: None },
/// ];
/// let plan = FileGroupStrategy.balance(&entries, 2);
/// assert_eq!(plan.strategy, "file-group");
/// ```
pub struct FileGroupStrategy;

impl ShardStrategy for FileGroupStrategy {
    fn name(&self) -> &'static str {
        "file-group"
    }

    fn balance(&self, entries: &[TestTimingEntry], shard_count: u32) -> ShardPlan {
        balance_lpt(entries, shard_count, "file-group")
    }
}
