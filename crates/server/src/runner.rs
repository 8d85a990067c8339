//! Test-runner subprocess supervision and run coordination
//!
//! Handles locating the external browser-test runner, launching it with its
//! output streamed into the shared log buffer, and enforcing the
//! one-run-at-a-time invariant with coalesced re-runs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use testwatch_common::{Error, LogBuffer, Result, RunnerConfig};

use crate::sitecheck::SiteChecker;
use crate::state::AppState;

/// How the external test runner should be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerBinary {
    /// Locally installed launcher executable
    Direct(PathBuf),
    /// CLI entry point script run through `node`
    Node(PathBuf),
}

/// Locate the test-runner executable under `root`.
///
/// Checks, in order: the locally installed launcher, the runner package's
/// CLI script, and the test package's CLI script.
pub fn resolve_runner(root: &Path) -> Option<RunnerBinary> {
    let bin_name = if cfg!(windows) {
        "playwright.cmd"
    } else {
        "playwright"
    };
    let direct = root.join("node_modules").join(".bin").join(bin_name);
    if direct.is_file() {
        return Some(RunnerBinary::Direct(direct));
    }

    let cli = root.join("node_modules").join("playwright").join("cli.js");
    if cli.is_file() {
        return Some(RunnerBinary::Node(cli));
    }

    let alt = root
        .join("node_modules")
        .join("@playwright")
        .join("test")
        .join("cli.js");
    if alt.is_file() {
        return Some(RunnerBinary::Node(alt));
    }

    None
}

/// Fixed runner arguments: one --project flag per configured grouping.
pub fn runner_args(config: &RunnerConfig) -> Vec<String> {
    let mut args = vec!["test".to_string()];
    for project in &config.projects {
        args.push(format!("--project={}", project));
    }
    args
}

/// Quote one argument for a Windows shell command line.
///
/// Arguments containing whitespace or quotes must be wrapped before being
/// joined into a single command string; everything else passes unchanged.
fn quote_windows_arg(arg: &str) -> String {
    if !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    let mut quoted = String::from("\"");
    for ch in arg.chars() {
        if ch == '"' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Build the launch command for the resolved runner.
///
/// On Windows the `.cmd` shim only runs through the shell, so the whole
/// invocation is joined into one quoted `cmd /C` line. Elsewhere arguments
/// pass through as a list with no shell interposed.
fn build_command(binary: &RunnerBinary, args: &[String]) -> Command {
    let (program, mut argv): (String, Vec<String>) = match binary {
        RunnerBinary::Direct(path) => (path.to_string_lossy().into_owned(), Vec::new()),
        RunnerBinary::Node(script) => (
            "node".to_string(),
            vec![script.to_string_lossy().into_owned()],
        ),
    };
    argv.extend(args.iter().cloned());

    if cfg!(windows) {
        let line = std::iter::once(program.as_str())
            .chain(argv.iter().map(|s| s.as_str()))
            .map(quote_windows_arg)
            .collect::<Vec<_>>()
            .join(" ");
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(line);
        cmd
    } else {
        let mut cmd = Command::new(program);
        cmd.args(&argv);
        cmd
    }
}

/// Outcome of one supervised runner invocation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

async fn pump_lines<R>(reader: R, log: Arc<LogBuffer>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.append(&line);
        log.append("\n");
    }
}

/// Launch the runner non-interactively and stream its combined output into
/// the log buffer; resolves with the exit code when the process terminates.
pub async fn launch(
    log: Arc<LogBuffer>,
    config: &RunnerConfig,
    binary: &RunnerBinary,
    args: &[String],
) -> Result<RunOutcome> {
    let start = Instant::now();
    debug!(?binary, ?args, "launching test runner");

    let mut cmd = build_command(binary, args);
    cmd.current_dir(&config.root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Runner(format!("failed to spawn test runner: {}", e)))?;

    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump_lines(stdout, Arc::clone(&log))));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump_lines(stderr, Arc::clone(&log))));
    }

    let status = child.wait().await?;
    for pump in pumps {
        let _ = pump.await;
    }

    Ok(RunOutcome {
        exit_code: status.code(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Enforces at-most-one concurrent run and coalesces extra triggers.
pub struct RunCoordinator {
    state: Arc<AppState>,
    checker: Arc<SiteChecker>,
}

impl RunCoordinator {
    pub fn new(state: Arc<AppState>, checker: Arc<SiteChecker>) -> Arc<Self> {
        Arc::new(Self { state, checker })
    }

    /// Trigger a run.
    ///
    /// Starts one immediately when the slot is free; otherwise flags a
    /// single pending re-run. Returns true when the request was queued
    /// behind an active run.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let started_at = Utc::now();
        if !self.state.begin_run(started_at) {
            debug!("run already active, request coalesced");
            return true;
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run_to_completion().await;
        });
        false
    }

    async fn run_to_completion(self: Arc<Self>) {
        let state = &self.state;
        let started_at = state.run_state().last_run.started_at.unwrap_or_else(Utc::now);
        state.log.append(&format!(
            "\n==== Run started at {} ====\n",
            started_at.to_rfc3339()
        ));
        info!("test run started");

        let args = runner_args(&state.config.runner);
        let outcome = match resolve_runner(&state.config.runner.root) {
            Some(binary) => {
                match launch(Arc::clone(&state.log), &state.config.runner, &binary, &args).await {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        warn!("test runner failed to launch: {}", e);
                        state.log.append(&format!("{}\n", e));
                        None
                    }
                }
            }
            None => {
                warn!(
                    root = %state.config.runner.root.display(),
                    "test runner binary not found"
                );
                state.log.append(
                    "Test runner not found: install the browser test framework under node_modules.\n",
                );
                None
            }
        };

        let ended_at = Utc::now();
        let (exit_code, duration_ms) = match &outcome {
            Some(o) => (o.exit_code, o.duration_ms),
            None => (None, 0),
        };
        state.finish_run(ended_at, exit_code, duration_ms);
        state.log.append(&format!(
            "\n==== Run ended at {} with code {:?} (duration {} ms) ====\n",
            ended_at.to_rfc3339(),
            exit_code,
            duration_ms
        ));
        info!(?exit_code, duration_ms, "test run finished");

        // Post-run sweep; a flaky health check must never block completion.
        let _ = self.checker.check_all_sites().await;

        if state.take_rerun_flag() {
            let delay = Duration::from_millis(state.config.runner.rerun_delay_ms);
            let coordinator = Arc::clone(&self);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                coordinator.trigger();
            });
        }
    }
}
