//! Renders a merged run record to HTML, Markdown, or JSON.
//!
//! Out of core per spec.md §1 ("the HTML/Markdown report renderer... its
//! templating logic is not the hard part") — this module exists only because
//! the `report` subcommand needs *some* renderer to dispatch to. Loosely
//! grounded on `report/junit.rs`'s accumulate-then-render shape; the actual
//! output format bears no resemblance to JUnit XML.

use serde::{Deserialize, Serialize};

use crate::cluster::{self, FailureCluster};
use crate::domain::RunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "html" => Some(Self::Html),
            "markdown" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportJson<'a> {
    pub run: &'a RunResult,
    pub clusters: Vec<FailureCluster>,
}

pub fn render(run: &RunResult, format: ReportFormat) -> String {
    let clusters = cluster::cluster(&run.tests);
    match format {
        ReportFormat::Json => {
            serde_json::to_string_pretty(&ReportJson { run, clusters: clusters.clone() }).unwrap_or_default() + "\n"
        }
        ReportFormat::Markdown => render_markdown(run, &clusters),
        ReportFormat::Html => render_html(run, &clusters),
    }
}

fn render_markdown(run: &RunResult, clusters: &[FailureCluster]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Test Run {}\n\n", run.run_id));
    out.push_str(&format!(
        "- Status: **{:?}**\n- Total: {}\n- Passed: {}\n- Failed: {}\n- Flaky: {}\n- Skipped: {}\n- Duration: {}ms\n- Shards: {}\n\n",
        run.status, run.summary.total, run.summary.passed, run.summary.failed, run.summary.flaky, run.summary.skipped, run.duration, run.shard_count
    ));
    if !clusters.is_empty() {
        out.push_str("## Failure clusters\n\n");
        for c in clusters {
            out.push_str(&format!("- `{}` ({} occurrences across {} files)\n", c.normalized_message, c.count, c.files.len()));
        }
        out.push('\n');
    }
    out
}

fn render_html(run: &RunResult, clusters: &[FailureCluster]) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Test Run</title></head><body>\n");
    out.push_str(&format!("<h1>Test Run {}</h1>\n", html_escape(&run.run_id)));
    out.push_str("<table>\n");
    out.push_str(&format!("<tr><td>Status</td><td>{:?}</td></tr>\n", run.status));
    out.push_str(&format!("<tr><td>Total</td><td>{}</td></tr>\n", run.summary.total));
    out.push_str(&format!("<tr><td>Passed</td><td>{}</td></tr>\n", run.summary.passed));
    out.push_str(&format!("<tr><td>Failed</td><td>{}</td></tr>\n", run.summary.failed));
    out.push_str(&format!("<tr><td>Flaky</td><td>{}</td></tr>\n", run.summary.flaky));
    out.push_str(&format!("<tr><td>Duration</td><td>{}ms</td></tr>\n", run.duration));
    out.push_str("</table>\n");
    if !clusters.is_empty() {
        out.push_str("<h2>Failure clusters</h2>\n<ul>\n");
        for c in clusters {
            out.push_str(&format!("<li>{} ({} occurrences)</li>\n", html_escape(&c.normalized_message), c.count));
        }
        out.push_str("</ul>\n");
    }
    out.push_str("</body></html>\n");
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
