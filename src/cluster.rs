//! Groups failing tests by normalized error fingerprint so a report can
//! summarize "these N tests are all hitting the same underlying failure"
//! instead of listing every test individually.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{TestResult, TestStatus};
use crate::normalize::normalize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCluster {
    #[serde(rename = "normalizedMessage")]
    pub normalized_message: String,
    #[serde(rename = "testIds")]
    pub test_ids: Vec<String>,
    pub files: Vec<String>,
    #[serde(rename = "exampleStack", skip_serializing_if = "Option::is_none")]
    pub example_stack: Option<String>,
    pub count: usize,
}

/// Clusters every error on every failed/timed-out test. Output is sorted by
/// count descending; ties broken by first-encountered message (stable sort
/// preserves encounter order among equal counts).
pub fn cluster(results: &[TestResult]) -> Vec<FailureCluster> {
    let mut order: Vec<String> = Vec::new();
    let mut clusters: HashMap<String, FailureCluster> = HashMap::new();

    for result in results {
        if !matches!(result.status, TestStatus::Failed | TestStatus::TimedOut) {
            continue;
        }
        for error in &result.errors {
            let normalized = normalize(&error.message);
            let entry = clusters.entry(normalized.clone()).or_insert_with(|| {
                order.push(normalized.clone());
                FailureCluster {
                    normalized_message: normalized.clone(),
                    test_ids: Vec::new(),
                    files: Vec::new(),
                    example_stack: None,
                    count: 0,
                }
            });
            entry.count += 1;
            let id = result.identity.as_str().to_string();
            if !entry.test_ids.contains(&id) {
                entry.test_ids.push(id);
            }
            if !entry.files.contains(&result.file) {
                entry.files.push(result.file.clone());
            }
            if error.stack.is_some() {
                entry.example_stack = error.stack.clone();
            }
        }
    }

    let mut out: Vec<FailureCluster> = order.into_iter().map(|m| clusters.remove(&m).unwrap()).collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TestError;

    fn failing(file: &str, title: &str, msg: &str) -> TestResult {
        TestResult::new(file, title, "web", TestStatus::Failed, 100, 0, 0).unwrap().with_error(TestError::new(msg))
    }

    #[test]
    fn groups_by_normalized_message_and_sorts_by_count() {
        let results = vec![
            failing("a.ts", "t1", "Timeout at 2024-01-01T00:00:00Z"),
            failing("b.ts", "t2", "Timeout at 2025-06-15T12:30:00Z"),
            failing("c.ts", "t3", "connection refused"),
        ];
        let clusters = cluster(&results);
        assert_eq!(clusters[0].count, 2);
        assert_eq!(clusters[0].test_ids.len(), 2);
        assert_eq!(clusters[0].files.len(), 2);
        assert_eq!(clusters[1].count, 1);
    }

    #[test]
    fn passed_tests_excluded() {
        let passed = TestResult::new("a.ts", "t1", "web", TestStatus::Passed, 100, 0, 0).unwrap();
        assert!(cluster(&[passed]).is_empty());
    }
}
