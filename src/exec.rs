//! Spawns the browser-automation child process for one shard.
//!
//! Built on `tokio::process::Command`, the way `provider/local.rs` spawns
//! its shell command — but stdio is inherited rather than piped, since this
//! executor streams test output straight to the CI log instead of capturing
//! it for a `Reporter` to render.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;

use crate::domain::{ShardAssignment, ShardPlan};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn child process {program}: {source}")]
    Spawn { program: String, #[source] source: std::io::Error },
    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}

/// What the executor actually invokes: smart-shard mode carries explicit
/// file paths, native-shard mode carries `--shard=i/N` for the child's own
/// partitioning.
#[derive(Debug, Clone)]
pub enum ExecutionMode {
    SmartShard { files: Vec<String> },
    NativeShard { shard_index: u32, shard_total: u32 },
}

/// Chooses the execution mode for a shard index given the plan.
///
/// - A cold-start plan (`total_tests == 0`, the marker `balancer::cold_start_plan`
///   leaves behind) or a plan with no assignment at all for this index falls
///   through to native-shard mode, letting the child runner partition itself.
/// - A warm plan whose assignment for this index happens to hold zero files
///   (fewer files than shards) returns an empty smart-shard assignment, which
///   `run` short-circuits to exit 0 without a native fallback.
/// - Otherwise the assignment's files run directly.
pub fn resolve_mode(plan: &ShardPlan, shard_index: u32, shard_total: u32) -> ExecutionMode {
    let assignment = plan.assignments.iter().find(|a| a.shard_index == shard_index);
    if plan.total_tests == 0 || assignment.is_none() {
        return ExecutionMode::NativeShard { shard_index, shard_total };
    }
    ExecutionMode::SmartShard { files: assignment.map(|a: &ShardAssignment| a.files.clone()).unwrap_or_default() }
}

/// Splits a configured `--program` string into its binary and leading
/// arguments on whitespace, so `"npx playwright test"` becomes `npx` with
/// `["playwright", "test"]` ahead of the mode/extra args instead of being
/// handed to `Command::new` whole, where the spaces would make it an
/// unresolvable argv[0]. Does not honor quoting; a program name containing
/// literal whitespace is not supported.
fn split_program(program: &str) -> (&str, Vec<&str>) {
    let mut parts = program.split_whitespace();
    let binary = parts.next().unwrap_or(program);
    (binary, parts.collect())
}

/// Spawns the child runner and returns its exit code directly (the
/// executor's own exit code is always the child's). An assignment that
/// exists but names zero files short-circuits to 0 without spawning
/// anything.
pub async fn run(
    program: &str,
    mode: &ExecutionMode,
    run_id: &str,
    working_dir: Option<&Path>,
    extra_args: &[String],
) -> Result<i32, ExecError> {
    if let ExecutionMode::SmartShard { files } = mode {
        if files.is_empty() {
            return Ok(0);
        }
    }

    let (binary, leading_args) = split_program(program);
    let mut command = tokio::process::Command::new(binary);
    command.args(leading_args);
    match mode {
        ExecutionMode::SmartShard { files } => {
            command.args(files);
        }
        ExecutionMode::NativeShard { shard_index, shard_total } => {
            command.arg(format!("--shard={shard_index}/{shard_total}"));
        }
    }
    command.args(extra_args);
    command.env("SORRY_CURRENTS_RUN_ID", run_id);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }
    command.stdin(Stdio::inherit()).stdout(Stdio::inherit()).stderr(Stdio::inherit());

    let mut child = command.spawn().map_err(|e| ExecError::Spawn { program: program.to_string(), source: e })?;
    let status = child.wait().await.map_err(ExecError::Wait)?;
    Ok(status.code().unwrap_or(2))
}
