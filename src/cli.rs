//! Shared defaults and environment-variable resolution.
//!
//! Centralizes the constants this crate's CLI flags fall back to, and the
//! handful of "read one of these env vars in priority order" lookups the
//! driver needs for run identity, git context, and CI detection. Kept in one
//! place the way `offload`'s `config/schema.rs` centralizes its
//! `default_max_parallel`/`default_test_timeout` free functions next to the
//! structs they default.

use std::path::PathBuf;

/// Default output directory, relative to the current working directory.
pub const DEFAULT_OUTPUT_DIR: &str = ".sorry-currents";

/// Fallback duration (ms) for a test never seen before in the timing corpus.
pub const DEFAULT_DURATION_MS: u64 = 30_000;

/// Risk-neutral risk factor: tight packing, vulnerable to variance.
pub const DEFAULT_RISK_FACTOR: f64 = 0.0;

/// Cap on `ShardTimingEntry::last_durations`.
pub const TIMING_WINDOW: usize = 20;

/// Cap on `ShardTimingEntry::samples`.
pub const TIMING_SAMPLE_CAP: u32 = 50;

/// Cap on `TestHistoryEntry::last_durations`.
pub const HISTORY_WINDOW: usize = 30;

/// Cap on `TestHistoryEntry::top_errors`.
pub const HISTORY_TOP_ERRORS: usize = 5;

pub fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

/// Resolves the run identity for the current invocation.
///
/// Priority: `SORRY_CURRENTS_RUN_ID` (wins) > `GITHUB_RUN_ID` > `CI_PIPELINE_ID`
/// > `BUILD_ID`; falls back to `local-<unix-ms>` when none are set.
pub fn resolve_run_id() -> String {
    for key in ["SORRY_CURRENTS_RUN_ID", "GITHUB_RUN_ID", "CI_PIPELINE_ID", "BUILD_ID"] {
        if let Ok(val) = std::env::var(key) {
            if !val.is_empty() {
                return val;
            }
        }
    }
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("local-{millis}")
}

/// Git context pulled from whichever CI's env vars are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitContext {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub commit_message: Option<String>,
    pub author: Option<String>,
}

pub fn resolve_git_context() -> GitContext {
    let branch = env_first(&["GITHUB_REF_NAME", "CI_COMMIT_BRANCH"]);
    let commit = env_first(&["GITHUB_SHA", "CI_COMMIT_SHA"]);
    let commit_message = env_first(&["GITHUB_EVENT_HEAD_COMMIT_MESSAGE"]);
    let author = env_first(&["GITHUB_ACTOR", "GITLAB_USER_LOGIN"]);
    GitContext { branch, commit, commit_message, author }
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| std::env::var(k).ok().filter(|v| !v.is_empty()))
}

/// True when any recognized CI environment variable is present.
pub fn is_ci() -> bool {
    const MARKERS: [&str; 8] = [
        "CI",
        "GITHUB_ACTIONS",
        "GITLAB_CI",
        "JENKINS_URL",
        "CIRCLECI",
        "BUILDKITE",
        "TRAVIS",
        "AZURE_PIPELINES",
    ];
    MARKERS.iter().any(|k| std::env::var(k).is_ok()) || std::env::var("TF_BUILD").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_falls_back_to_local_when_nothing_set() {
        for key in ["SORRY_CURRENTS_RUN_ID", "GITHUB_RUN_ID", "CI_PIPELINE_ID", "BUILD_ID"] {
            unsafe { std::env::remove_var(key) };
        }
        let id = resolve_run_id();
        assert!(id.starts_with("local-"), "expected local- fallback, got {id}");
    }

    #[test]
    fn run_id_prefers_sorry_currents_over_others() {
        unsafe {
            std::env::set_var("SORRY_CURRENTS_RUN_ID", "explicit-id");
            std::env::set_var("GITHUB_RUN_ID", "gh-id");
        }
        assert_eq!(resolve_run_id(), "explicit-id");
        unsafe {
            std::env::remove_var("SORRY_CURRENTS_RUN_ID");
            std::env::remove_var("GITHUB_RUN_ID");
        }
    }
}
