//! Entity definitions and value constraints for every persisted shape this
//! crate reads or writes: test identity, per-test results, the merged run
//! record, the two rolling corpora, and the balancer's plan types.
//!
//! Builder methods follow `offload`'s `TestRecord`/`TestResult` pattern
//! (`with_x(self, x) -> Self`) rather than a derive-macro builder, and every
//! constructor that can fail returns `Result<T, ValidationError>` instead of
//! panicking — the "two-arm result discriminator" the error-handling design
//! calls for.

pub mod envelope;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use envelope::{decode_tolerant, encode_envelope, VersionedEnvelope};

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be >= {min}, got {got}")]
    TooSmall { field: &'static str, min: i64, got: i64 },
    #[error("{field} must be in [0, 1], got {got}")]
    RateOutOfBounds { field: &'static str, got: f64 },
    #[error("{field} is not a recognized value: {got}")]
    BadEnum { field: &'static str, got: String },
    #[error("{field} must not exceed {max} entries")]
    TooManyEntries { field: &'static str, max: usize },
}

/// Deterministic 16-hex-character fingerprint of (file, title, project).
///
/// Hashing the concatenation with a per-field separator byte avoids
/// collisions from whitespace coincidences or field-ordering ambiguity
/// (`"ab" + "c"` vs `"a" + "bc"`). Built on `sha2::Sha256`, already a teacher
/// dependency (`cache.rs::compute_file_hash`), because `std`'s
/// `DefaultHasher` is explicitly not guaranteed stable across processes or
/// machines, which would break the "same three inputs, same id everywhere"
/// invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestIdentity(String);

impl TestIdentity {
    const SEPARATOR: u8 = 0x1f; // ASCII unit separator

    pub fn compute(file: &str, title: &str, project: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(file.as_bytes());
        hasher.update([Self::SEPARATOR]);
        hasher.update(title.as_bytes());
        hasher.update([Self::SEPARATOR]);
        hasher.update(project.as_bytes());
        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Self(hex[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TestStatus {
    Passed,
    Failed,
    TimedOut,
    Skipped,
    Interrupted,
}

impl TestStatus {
    /// Merge priority across shards: interrupted > timedOut > failed > passed.
    fn priority(self) -> u8 {
        match self {
            TestStatus::Interrupted => 3,
            TestStatus::TimedOut => 2,
            TestStatus::Failed => 1,
            TestStatus::Passed | TestStatus::Skipped => 0,
        }
    }
}

impl PartialOrd for TestStatus {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TestStatus {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority().cmp(&other.priority())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), stack: None, snippet: None, location: None }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub path: String,
}

/// A single terminal observation of one test in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub identity: TestIdentity,
    pub file: String,
    pub title: String,
    pub project: String,
    pub status: TestStatus,
    pub duration: u64,
    pub retries: u32,
    #[serde(rename = "isFlaky")]
    pub is_flaky: bool,
    #[serde(default)]
    pub errors: Vec<TestError>,
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "workerId")]
    pub worker_id: i64,
    #[serde(rename = "shardIndex", skip_serializing_if = "Option::is_none")]
    pub shard_index: Option<u32>,
}

impl TestResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file: impl Into<String>,
        title: impl Into<String>,
        project: impl Into<String>,
        status: TestStatus,
        duration: u64,
        retries: u32,
        worker_id: i64,
    ) -> Result<Self, ValidationError> {
        let file = file.into();
        let title = title.into();
        let project = project.into();
        if file.is_empty() {
            return Err(ValidationError::Empty { field: "file" });
        }
        if title.is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }
        if worker_id < -1 {
            return Err(ValidationError::TooSmall { field: "workerId", min: -1, got: worker_id });
        }
        // isFlaky <=> status = passed && retries > 0; timedOut-with-retries is
        // deliberately *not* flaky (spec.md design note, preserved verbatim).
        let is_flaky = status == TestStatus::Passed && retries > 0;
        let identity = TestIdentity::compute(&file, &title, &project);
        Ok(Self {
            identity,
            file,
            title,
            project,
            status,
            duration,
            retries,
            is_flaky,
            errors: Vec::new(),
            annotations: Vec::new(),
            tags: Vec::new(),
            attachments: Vec::new(),
            started_at: Utc::now(),
            worker_id,
            shard_index: None,
        })
    }

    pub fn with_error(mut self, error: TestError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn with_shard_index(mut self, shard_index: u32) -> Self {
        self.shard_index = Some(shard_index);
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Schema-check applied to a deserialized (not constructor-built) value,
    /// e.g. a shard result read off disk by the report ingestor (spec.md
    /// §4.G "validate each").
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.file.is_empty() {
            return Err(ValidationError::Empty { field: "file" });
        }
        if self.title.is_empty() {
            return Err(ValidationError::Empty { field: "title" });
        }
        if self.worker_id < -1 {
            return Err(ValidationError::TooSmall { field: "workerId", min: -1, got: self.worker_id });
        }
        if let Some(idx) = self.shard_index {
            if idx == 0 {
                return Err(ValidationError::TooSmall { field: "shardIndex", min: 1, got: 0 });
            }
        }
        let expected_flaky = self.status == TestStatus::Passed && self.retries > 0;
        if self.is_flaky != expected_flaky {
            return Err(ValidationError::BadEnum {
                field: "isFlaky",
                got: format!("isFlaky={} for status={:?} retries={}", self.is_flaky, self.status, self.retries),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Passed,
    Failed,
    TimedOut,
    Interrupted,
}

impl From<TestStatus> for RunStatus {
    fn from(s: TestStatus) -> Self {
        match s {
            TestStatus::Passed | TestStatus::Skipped => RunStatus::Passed,
            TestStatus::Failed => RunStatus::Failed,
            TestStatus::TimedOut => RunStatus::TimedOut,
            TestStatus::Interrupted => RunStatus::Interrupted,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitInfo {
    pub branch: String,
    pub commit: String,
    #[serde(rename = "commitMessage")]
    pub commit_message: String,
    pub author: String,
    #[serde(rename = "pullRequest", skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    #[serde(rename = "runtimeVersion")]
    pub runtime_version: String,
    #[serde(rename = "runnerVersion")]
    pub runner_version: String,
    #[serde(rename = "ciProvider")]
    pub ci_provider: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "workerCount")]
    pub worker_count: u32,
    pub projects: Vec<String>,
    pub retries: u32,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub flaky: usize,
}

impl SummaryCounts {
    /// Recomputes counts from a combined test list — the merge rule the
    /// report ingestor uses: never sum per-shard counts, always recompute
    /// from the combined source of truth.
    pub fn from_tests(tests: &[TestResult]) -> Self {
        let total = tests.len();
        let passed = tests.iter().filter(|t| t.status == TestStatus::Passed && !t.is_flaky).count();
        let failed = tests
            .iter()
            .filter(|t| matches!(t.status, TestStatus::Failed | TestStatus::TimedOut))
            .count();
        let skipped = tests.iter().filter(|t| t.status == TestStatus::Skipped).count();
        let flaky = tests.iter().filter(|t| t.is_flaky).count();
        Self { total, passed, failed, skipped, flaky }
    }
}

/// Aggregate outcome of one end-to-end invocation: either a per-shard record
/// (`shard_index` set) or the merged record (`shard_index` absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(rename = "runId")]
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration: u64,
    pub status: RunStatus,
    pub summary: SummaryCounts,
    #[serde(rename = "shardCount")]
    pub shard_count: u32,
    #[serde(rename = "shardIndex", skip_serializing_if = "Option::is_none")]
    pub shard_index: Option<u32>,
    pub tests: Vec<TestResult>,
    pub environment: EnvironmentInfo,
    pub git: GitInfo,
    pub config: RunConfig,
}

impl RunResult {
    pub fn new(run_id: impl Into<String>, shard_count: u32, tests: Vec<TestResult>, duration: u64) -> Self {
        let summary = SummaryCounts::from_tests(&tests);
        let status = tests
            .iter()
            .map(|t| RunStatus::from(t.status))
            .max_by_key(|s| match s {
                RunStatus::Passed => 0,
                RunStatus::Failed => 1,
                RunStatus::TimedOut => 2,
                RunStatus::Interrupted => 3,
            })
            .unwrap_or(RunStatus::Passed);
        Self {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            duration,
            status,
            summary,
            shard_count,
            shard_index: None,
            tests,
            environment: EnvironmentInfo::default(),
            git: GitInfo::default(),
            config: RunConfig::default(),
        }
    }

    pub fn with_shard_index(mut self, shard_index: u32) -> Self {
        self.shard_index = Some(shard_index);
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentInfo) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_git(mut self, git: GitInfo) -> Self {
        self.git = git;
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn success(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// One test's rolling duration statistics in the timing corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardTimingEntry {
    #[serde(rename = "testId")]
    pub test_id: TestIdentity,
    pub file: String,
    pub project: String,
    #[serde(rename = "avgDuration")]
    pub avg_duration: u64,
    #[serde(rename = "p95Duration")]
    pub p95_duration: u64,
    pub samples: u32,
    pub stddev: u64,
    #[serde(rename = "lastDurations")]
    pub last_durations: Vec<u64>,
}

impl ShardTimingEntry {
    pub fn new(test_id: TestIdentity, file: impl Into<String>, project: impl Into<String>, duration: u64) -> Self {
        Self {
            test_id,
            file: file.into(),
            project: project.into(),
            avg_duration: duration,
            p95_duration: duration,
            samples: 1,
            stddev: 0,
            last_durations: vec![duration],
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.samples == 0 {
            return Err(ValidationError::TooSmall { field: "samples", min: 1, got: 0 });
        }
        if self.last_durations.len() > 20 {
            return Err(ValidationError::TooManyEntries { field: "lastDurations", max: 20 });
        }
        if self.samples == 1 && self.stddev != 0 {
            return Err(ValidationError::TooSmall { field: "stddev", min: 0, got: self.stddev as i64 });
        }
        Ok(())
    }
}

/// One test's lifetime run record in the history corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopError {
    #[serde(rename = "normalizedMessage")]
    pub normalized_message: String,
    pub count: u32,
    #[serde(rename = "lastSeen")]
    pub last_seen: DateTime<Utc>,
    #[serde(rename = "exampleStack", skip_serializing_if = "Option::is_none")]
    pub example_stack: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestHistoryEntry {
    pub identity: TestIdentity,
    #[serde(rename = "totalRuns")]
    pub total_runs: u32,
    #[serde(rename = "passCount")]
    pub pass_count: u32,
    #[serde(rename = "failCount")]
    pub fail_count: u32,
    #[serde(rename = "flakyCount")]
    pub flaky_count: u32,
    #[serde(rename = "skipCount")]
    pub skip_count: u32,
    #[serde(rename = "avgDuration")]
    pub avg_duration: u64,
    #[serde(rename = "p95Duration")]
    pub p95_duration: u64,
    #[serde(rename = "lastDurations")]
    pub last_durations: Vec<u64>,
    #[serde(rename = "flakinessRate")]
    pub flakiness_rate: f64,
    #[serde(rename = "failureRate")]
    pub failure_rate: f64,
    #[serde(rename = "lastSeen")]
    pub last_seen: DateTime<Utc>,
    #[serde(rename = "topErrors")]
    pub top_errors: Vec<TopError>,
}

impl TestHistoryEntry {
    pub fn new(identity: TestIdentity) -> Self {
        Self {
            identity,
            total_runs: 0,
            pass_count: 0,
            fail_count: 0,
            flaky_count: 0,
            skip_count: 0,
            avg_duration: 0,
            p95_duration: 0,
            last_durations: Vec::new(),
            flakiness_rate: 0.0,
            failure_rate: 0.0,
            last_seen: Utc::now(),
            top_errors: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.flakiness_rate) {
            return Err(ValidationError::RateOutOfBounds { field: "flakinessRate", got: self.flakiness_rate });
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ValidationError::RateOutOfBounds { field: "failureRate", got: self.failure_rate });
        }
        if self.top_errors.len() > 5 {
            return Err(ValidationError::TooManyEntries { field: "topErrors", max: 5 });
        }
        Ok(())
    }
}

/// Balancer input: one test's estimated cost, already risk-adjusted if the
/// caller wants that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestTimingEntry {
    #[serde(rename = "testId")]
    pub test_id: TestIdentity,
    pub file: String,
    #[serde(rename = "estimatedDuration")]
    pub estimated_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stddev: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardAssignment {
    #[serde(rename = "shardIndex")]
    pub shard_index: u32,
    pub files: Vec<String>,
    #[serde(rename = "estimatedDuration")]
    pub estimated_duration: u64,
}

impl ShardAssignment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.shard_index == 0 {
            return Err(ValidationError::TooSmall { field: "shardIndex", min: 1, got: 0 });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardPlan {
    pub assignments: Vec<ShardAssignment>,
    pub strategy: String,
    #[serde(rename = "totalTests")]
    pub total_tests: usize,
    #[serde(rename = "maxShardDuration")]
    pub max_shard_duration: u64,
    #[serde(rename = "minShardDuration")]
    pub min_shard_duration: u64,
    #[serde(rename = "improvementPercent", skip_serializing_if = "Option::is_none")]
    pub improvement_percent: Option<f64>,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
}

impl ShardPlan {
    /// Checks the "same file appears in at most one assignment" and
    /// "shard indices are 1..N contiguous" invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (i, a) in self.assignments.iter().enumerate() {
            a.validate()?;
            if a.shard_index != (i as u32) + 1 {
                return Err(ValidationError::TooSmall {
                    field: "shardIndex contiguity",
                    min: (i as i64) + 1,
                    got: a.shard_index as i64,
                });
            }
        }
        let mut seen = std::collections::HashSet::new();
        for a in &self.assignments {
            for f in &a.files {
                if !seen.insert(f.clone()) {
                    return Err(ValidationError::BadEnum { field: "duplicate file across assignments", got: f.clone() });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic_16_char_hex() {
        let a = TestIdentity::compute("spec/login.ts", "logs in", "web");
        let b = TestIdentity::compute("spec/login.ts", "logs in", "web");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn identity_separator_prevents_field_concatenation_collisions() {
        let a = TestIdentity::compute("ab", "c", "project");
        let b = TestIdentity::compute("a", "bc", "project");
        assert_ne!(a, b);
    }

    #[test]
    fn is_flaky_requires_passed_and_retries() {
        let passed_retried = TestResult::new("f.ts", "t", "p", TestStatus::Passed, 100, 1, 0).unwrap();
        assert!(passed_retried.is_flaky);

        let timed_out_retried = TestResult::new("f.ts", "t", "p", TestStatus::TimedOut, 100, 3, 0).unwrap();
        assert!(!timed_out_retried.is_flaky, "timedOut with retries is not flaky, by design");

        let passed_first_try = TestResult::new("f.ts", "t", "p", TestStatus::Passed, 100, 0, 0).unwrap();
        assert!(!passed_first_try.is_flaky);
    }

    #[test]
    fn worker_id_minus_one_is_legal() {
        let r = TestResult::new("f.ts", "t", "p", TestStatus::Skipped, 0, 0, -1);
        assert!(r.is_ok());
    }

    #[test]
    fn worker_id_below_minus_one_rejected() {
        let r = TestResult::new("f.ts", "t", "p", TestStatus::Skipped, 0, 0, -2);
        assert!(matches!(r, Err(ValidationError::TooSmall { field: "workerId", .. })));
    }

    #[test]
    fn validate_catches_deserialized_is_flaky_mismatch() {
        let mut t = TestResult::new("f.ts", "t", "p", TestStatus::Passed, 10, 1, 0).unwrap();
        assert!(t.validate().is_ok());
        t.is_flaky = false; // simulate a tampered/malformed on-disk record
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_catches_empty_file_and_title() {
        let mut t = TestResult::new("f.ts", "t", "p", TestStatus::Passed, 10, 0, 0).unwrap();
        t.file = String::new();
        assert!(matches!(t.validate(), Err(ValidationError::Empty { field: "file" })));
    }

    #[test]
    fn status_priority_ordering() {
        assert!(TestStatus::Interrupted > TestStatus::TimedOut);
        assert!(TestStatus::TimedOut > TestStatus::Failed);
        assert!(TestStatus::Failed > TestStatus::Passed);
    }

    #[test]
    fn summary_counts_recomputed_not_summed() {
        let tests = vec![
            TestResult::new("a.ts", "t1", "p", TestStatus::Passed, 10, 0, 0).unwrap(),
            TestResult::new("a.ts", "t2", "p", TestStatus::Passed, 10, 1, 0).unwrap(), // flaky
            TestResult::new("b.ts", "t3", "p", TestStatus::Failed, 10, 0, 0).unwrap(),
            TestResult::new("b.ts", "t4", "p", TestStatus::Skipped, 0, 0, -1).unwrap(),
        ];
        let s = SummaryCounts::from_tests(&tests);
        assert_eq!(s.total, 4);
        assert_eq!(s.passed, 1);
        assert_eq!(s.flaky, 1);
        assert_eq!(s.failed, 1);
        assert_eq!(s.skipped, 1);
    }

    #[test]
    fn shard_plan_rejects_duplicate_files() {
        let plan = ShardPlan {
            assignments: vec![
                ShardAssignment { shard_index: 1, files: vec!["a.ts".into()], estimated_duration: 10 },
                ShardAssignment { shard_index: 2, files: vec!["a.ts".into()], estimated_duration: 10 },
            ],
            strategy: "lpt".into(),
            total_tests: 2,
            max_shard_duration: 10,
            min_shard_duration: 10,
            improvement_percent: None,
            generated_at: Utc::now(),
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn timing_entry_single_sample_must_have_zero_stddev() {
        let mut e = ShardTimingEntry::new(TestIdentity::compute("a", "b", "c"), "a", "c", 100);
        assert!(e.validate().is_ok());
        e.stddev = 5;
        assert!(e.validate().is_err());
    }
}
