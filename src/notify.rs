//! Pure functions turning a merged [`RunResult`] into the payload shape each
//! downstream integration expects. Building the payload is in scope; sending
//! it over HTTP is not (spec.md §1) — these functions never touch the
//! network.
//!
//! Truncation/formatting conventions (status emoji, "... and N more") are
//! grounded on `report/mod.rs`'s `ConsoleReporter`, translated from terminal
//! styling to payload text.

use serde_json::{json, Value};

use crate::domain::{RunResult, RunStatus, TestStatus};

pub const GITHUB_STATUS_CONTEXT: &str = "sorry-currents";
pub const REPORT_MARKER: &str = "<!-- sorry-currents:report -->";

fn status_emoji(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Passed => "✅",
        RunStatus::Failed => "❌",
        RunStatus::TimedOut => "⏱️",
        RunStatus::Interrupted => "🛑",
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{truncated}...")
}

/// Title + summary table + optional failed/flaky blocks + optional report
/// link, with an HTML-comment marker so the sender can find and update an
/// existing comment instead of posting duplicates.
pub fn build_github_comment_body(run: &RunResult, report_url: Option<&str>) -> String {
    let mut body = String::new();
    body.push_str(&format!("{} Test Run {}\n{}\n\n", status_emoji(run.status), run.run_id, REPORT_MARKER));
    body.push_str("| Status | Total | Passed | Failed | Flaky | Skipped | Duration | Shards |\n");
    body.push_str("|---|---|---|---|---|---|---|---|\n");
    body.push_str(&format!(
        "| {:?} | {} | {} | {} | {} | {} | {}ms | {} |\n",
        run.status, run.summary.total, run.summary.passed, run.summary.failed, run.summary.flaky, run.summary.skipped, run.duration, run.shard_count
    ));

    let failed: Vec<_> = run.tests.iter().filter(|t| matches!(t.status, TestStatus::Failed | TestStatus::TimedOut)).collect();
    if !failed.is_empty() {
        body.push_str("\n**Failed tests**\n");
        for t in &failed {
            let message = t.errors.first().map(|e| truncate(&e.message, 140)).unwrap_or_default();
            body.push_str(&format!("- `{}` — {}: {}\n", t.file, t.title, message));
        }
    }

    let flaky: Vec<_> = run.tests.iter().filter(|t| t.is_flaky).collect();
    if !flaky.is_empty() {
        body.push_str("\n**Flaky tests**\n");
        for t in &flaky {
            body.push_str(&format!("- `{}` — {} (retries: {})\n", t.file, t.title, t.retries));
        }
    }

    if let Some(url) = report_url {
        body.push_str(&format!("\n[Full Report]({url})\n"));
    }

    body
}

/// `state`, a ≤140-char description, and the fixed context string this crate
/// always reports under.
pub fn build_github_status_payload(run: &RunResult) -> Value {
    let state = if run.success() { "success" } else { "failure" };
    let mut description = format!("{} passed, {} failed", run.summary.passed, run.summary.failed);
    if run.summary.flaky > 0 {
        description.push_str(&format!(", {} flaky", run.summary.flaky));
    }
    description.push_str(&format!(" ({}ms)", run.duration));
    json!({
        "state": state,
        "description": truncate(&description, 140),
        "context": GITHUB_STATUS_CONTEXT,
    })
}

/// Header + field-pair section + optional flaky section + optional
/// failed-tests section (capped at 5, "... and N more") + optional
/// report-link context + footer context with author/commit message.
pub fn build_slack_payload(
    run: &RunResult,
    branch: &str,
    commit: &str,
    author: &str,
    commit_message: &str,
    report_url: Option<&str>,
) -> Value {
    let short_commit = commit.chars().take(7).collect::<String>();
    let mut blocks = vec![
        json!({"type": "header", "text": {"type": "plain_text", "text": format!("{} Test Run", status_emoji(run.status))}}),
        json!({
            "type": "section",
            "fields": [
                {"type": "mrkdwn", "text": format!("*Branch:*\n{branch}")},
                {"type": "mrkdwn", "text": format!("*Commit:*\n{short_commit}")},
                {"type": "mrkdwn", "text": format!("*Total:*\n{}", run.summary.total)},
                {"type": "mrkdwn", "text": format!("*Duration:*\n{}ms", run.duration)},
                {"type": "mrkdwn", "text": format!("*Passed:*\n{}", run.summary.passed)},
                {"type": "mrkdwn", "text": format!("*Failed:*\n{}", run.summary.failed)},
            ]
        }),
    ];

    if run.summary.flaky > 0 {
        blocks.push(json!({"type": "section", "text": {"type": "mrkdwn", "text": format!("*Flaky:* {}", run.summary.flaky)}}));
    }

    let failed: Vec<_> = run.tests.iter().filter(|t| matches!(t.status, TestStatus::Failed | TestStatus::TimedOut)).collect();
    if !failed.is_empty() {
        let mut lines: Vec<String> = failed.iter().take(5).map(|t| format!("- `{}` {}", t.file, t.title)).collect();
        if failed.len() > 5 {
            lines.push(format!("... and {} more", failed.len() - 5));
        }
        blocks.push(json!({"type": "section", "text": {"type": "mrkdwn", "text": format!("*Failed tests*\n{}", lines.join("\n"))}}));
    }

    if let Some(url) = report_url {
        blocks.push(json!({"type": "context", "elements": [{"type": "mrkdwn", "text": format!("<{url}|Full Report>")}]}));
    }

    blocks.push(json!({"type": "context", "elements": [{"type": "mrkdwn", "text": format!("{author}: {commit_message}")}]}));

    json!({ "blocks": blocks })
}

/// Generic webhook payload: summary + git context + a lightweight test list
/// (message strings only — stack traces are deliberately omitted to keep
/// the payload small).
pub fn build_webhook_payload(
    run: &RunResult,
    timestamp: chrono::DateTime<chrono::Utc>,
    branch: &str,
    commit: &str,
    author: &str,
) -> Value {
    json!({
        "event": "test-run-completed",
        "timestamp": timestamp.to_rfc3339(),
        "result": {
            "total": run.summary.total,
            "passed": run.summary.passed,
            "failed": run.summary.failed,
            "flaky": run.summary.flaky,
            "skipped": run.summary.skipped,
            "duration": run.duration,
            "status": format!("{:?}", run.status),
        },
        "git": {
            "branch": branch,
            "commit": commit,
            "author": author,
        },
        "tests": run.tests.iter().map(|t| json!({
            "id": t.identity.as_str(),
            "file": t.file,
            "title": t.title,
            "status": format!("{:?}", t.status),
            "duration": t.duration,
            "isFlaky": t.is_flaky,
            "errors": t.errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TestError, TestResult};

    fn sample_run() -> RunResult {
        let mut tests = Vec::new();
        tests.push(TestResult::new("a.ts", "passes", "web", TestStatus::Passed, 100, 0, 0).unwrap());
        tests.push(
            TestResult::new("b.ts", "fails hard", "web", TestStatus::Failed, 100, 0, 0)
                .unwrap()
                .with_error(TestError::new("x".repeat(200))),
        );
        RunResult::new("run-1", 2, tests, 500)
    }

    #[test]
    fn comment_body_embeds_marker_and_truncates_errors() {
        let run = sample_run();
        let body = build_github_comment_body(&run, Some("https://example.test/report"));
        assert!(body.contains(REPORT_MARKER));
        assert!(body.contains("Full Report"));
        let error_line = body.lines().find(|l| l.contains("fails hard")).unwrap();
        assert!(error_line.len() < 300);
        assert!(error_line.contains("..."));
    }

    #[test]
    fn status_payload_uses_fixed_context_and_truncates() {
        let run = sample_run();
        let payload = build_github_status_payload(&run);
        assert_eq!(payload["context"], GITHUB_STATUS_CONTEXT);
        assert_eq!(payload["state"], "failure");
    }

    #[test]
    fn slack_payload_caps_failed_list_at_five() {
        let mut tests = Vec::new();
        for i in 0..8 {
            tests.push(TestResult::new(format!("f{i}.ts"), "t", "web", TestStatus::Failed, 10, 0, 0).unwrap());
        }
        let run = RunResult::new("run-1", 1, tests, 100);
        let payload = build_slack_payload(&run, "main", "abcdef1234", "alice", "fix bug", None);
        let text = payload["blocks"].as_array().unwrap().iter().find_map(|b| b["text"]["text"].as_str()).unwrap_or("");
        let joined = payload.to_string();
        assert!(joined.contains("and 3 more"));
        let _ = text;
    }

    #[test]
    fn webhook_payload_omits_stack_traces() {
        let run = sample_run();
        let payload = build_webhook_payload(&run, chrono::Utc::now(), "main", "abc", "alice");
        assert_eq!(payload["event"], "test-run-completed");
        let serialized = payload.to_string();
        assert!(!serialized.contains("stack"));
    }
}
