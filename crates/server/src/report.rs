//! Failure-report reconciliation
//!
//! Rebuilds a unified failure summary from whichever sources survive a run:
//! the runner's structured JSON report, the artifact tree on disk, and
//! finally the raw log text. The strategies are tried in order of fidelity
//! and the first one that yields data wins; a parse failure in any tier
//! silently falls through to the next.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use testwatch_common::{
    Attachment, AttachmentKind, FailureRecord, RunSummary, RunnerConfig, SummaryCounts,
};

use crate::artifacts::is_artifact_dir;

static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(passed|failed|skipped|flaky)").unwrap());

static FAILED_COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+failed").unwrap());

// e.g. `  1) [portal] › tests/portal/login.spec.ts:10:5 › login works`
static LOG_FAILURE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\d+\)\s+\[([^\]]+)\]\s+›\s+(.+?):(\d+):(\d+)\s+›\s+(.+)$").unwrap()
});

static CONTEXT_TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"›\s+(.+)").unwrap());

const TITLE_SEPARATOR: &str = " › ";

/// Reconcile a best-effort failure summary from the report file, the
/// artifact tree, and the run log.
pub fn summarize(config: &RunnerConfig, log_text: &str) -> RunSummary {
    let report = report_summary(config);
    if let Some(summary) = &report {
        if !summary.failures.is_empty() {
            return summary.clone();
        }
    }

    if failure_indicated(log_text) {
        if let Some(summary) = artifact_summary(config, log_text) {
            return summary;
        }
        return log_summary(log_text);
    }

    report.unwrap_or_default()
}

/// True when the raw log text suggests at least one test failed.
pub fn failure_indicated(log_text: &str) -> bool {
    FAILED_COUNT_RE
        .captures_iter(log_text)
        .any(|c| c[1].parse::<u64>().map(|n| n > 0).unwrap_or(false))
        || log_text.contains('✘')
        || log_text.contains('✗')
}

// ============================================================================
// Tier 1: structured report
// ============================================================================

#[derive(Debug, Deserialize)]
struct PwReport {
    #[serde(default)]
    stats: Option<PwStats>,
    #[serde(default)]
    suites: Vec<PwSuite>,
    #[serde(default)]
    errors: Vec<PwTopError>,
}

#[derive(Debug, Deserialize)]
struct PwStats {
    #[serde(default)]
    expected: u64,
    #[serde(default)]
    unexpected: u64,
    #[serde(default)]
    skipped: u64,
    #[serde(default)]
    flaky: u64,
}

#[derive(Debug, Deserialize)]
struct PwSuite {
    #[serde(default)]
    title: String,
    #[serde(default)]
    suites: Vec<PwSuite>,
    #[serde(default)]
    specs: Vec<PwSpec>,
}

#[derive(Debug, Deserialize)]
struct PwSpec {
    #[serde(default)]
    title: String,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    line: Option<u64>,
    #[serde(default)]
    tests: Vec<PwTest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PwTest {
    #[serde(default)]
    project_name: Option<String>,
    #[serde(default)]
    results: Vec<PwAttempt>,
}

#[derive(Debug, Deserialize)]
struct PwAttempt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<PwError>,
    #[serde(default)]
    attachments: Vec<PwAttachment>,
}

#[derive(Debug, Deserialize)]
struct PwError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    location: Option<PwLocation>,
}

#[derive(Debug, Deserialize)]
struct PwLocation {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    line: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PwAttachment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PwTopError {
    #[serde(default)]
    message: Option<String>,
}

fn read_report(config: &RunnerConfig) -> Option<Vec<u8>> {
    for candidate in config.report_json_candidates() {
        if let Ok(bytes) = std::fs::read(&candidate) {
            debug!(path = %candidate.display(), "structured report found");
            return Some(bytes);
        }
    }
    None
}

fn report_summary(config: &RunnerConfig) -> Option<RunSummary> {
    let bytes = read_report(config)?;
    let report: PwReport = serde_json::from_slice(&bytes).ok()?;

    let mut counts = SummaryCounts::default();
    let mut failures = Vec::new();
    let mut titles = Vec::new();
    for suite in &report.suites {
        walk_suite(
            &config.projects,
            suite,
            &mut titles,
            &mut counts,
            &mut failures,
        );
    }
    counts.total = counts.passed + counts.failed + counts.skipped + counts.flaky;

    // A flat stats object is authoritative over the implicit suite count.
    if let Some(stats) = &report.stats {
        counts = SummaryCounts {
            total: stats.expected + stats.unexpected + stats.skipped + stats.flaky,
            passed: stats.expected,
            failed: stats.unexpected,
            skipped: stats.skipped,
            flaky: stats.flaky,
        };
    }

    for error in &report.errors {
        if let Some(message) = &error.message {
            failures.push(FailureRecord {
                title: message.lines().next().unwrap_or("Suite error").to_string(),
                file: None,
                line: None,
                project: None,
                error: Some(message.clone()),
                attachments: Vec::new(),
            });
        }
    }

    Some(RunSummary {
        summary: counts,
        failures,
    })
}

fn walk_suite(
    projects: &[String],
    suite: &PwSuite,
    titles: &mut Vec<String>,
    counts: &mut SummaryCounts,
    failures: &mut Vec<FailureRecord>,
) {
    let pushed = !suite.title.is_empty();
    if pushed {
        titles.push(suite.title.clone());
    }

    for spec in &suite.specs {
        for test in &spec.tests {
            for attempt in &test.results {
                match attempt.status.as_deref() {
                    Some("passed") => counts.passed += 1,
                    Some("skipped") => counts.skipped += 1,
                    Some("flaky") => counts.flaky += 1,
                    Some("failed") | Some("timedOut") | Some("interrupted") => {
                        counts.failed += 1;
                        failures.push(failure_from_attempt(projects, titles, spec, test, attempt));
                    }
                    _ => {}
                }
            }
        }
    }

    for child in &suite.suites {
        walk_suite(projects, child, titles, counts, failures);
    }

    if pushed {
        titles.pop();
    }
}

fn failure_from_attempt(
    projects: &[String],
    titles: &[String],
    spec: &PwSpec,
    test: &PwTest,
    attempt: &PwAttempt,
) -> FailureRecord {
    let mut parts: Vec<&str> = titles.iter().map(|s| s.as_str()).collect();
    if !spec.title.is_empty() {
        parts.push(&spec.title);
    }
    let title = parts.join(TITLE_SEPARATOR);

    let error_location = attempt.error.as_ref().and_then(|e| e.location.as_ref());
    let file = spec
        .file
        .clone()
        .or_else(|| error_location.and_then(|l| l.file.clone()));
    let line = spec.line.or_else(|| error_location.and_then(|l| l.line));

    let project = test
        .project_name
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| file.as_deref().and_then(|f| infer_project(projects, f)));

    FailureRecord {
        title,
        file,
        line,
        project,
        error: attempt.error.as_ref().and_then(|e| e.message.clone()),
        attachments: attempt
            .attachments
            .iter()
            .filter_map(attachment_from)
            .collect(),
    }
}

/// Best-effort project inference from a test file path.
///
/// Matches `tests/<project>/` with any separator and case; paths matching
/// no configured project leave the field unset.
pub fn infer_project(projects: &[String], file: &str) -> Option<String> {
    let normalized = file.replace('\\', "/").to_ascii_lowercase();
    projects
        .iter()
        .find(|p| normalized.contains(&format!("tests/{}/", p.to_ascii_lowercase())))
        .cloned()
}

/// Classify an attachment by content-type and name heuristics.
fn classify_attachment(name: Option<&str>, content_type: Option<&str>, path: &str) -> AttachmentKind {
    let name = name.unwrap_or("").to_ascii_lowercase();
    let content_type = content_type.unwrap_or("").to_ascii_lowercase();
    let path = path.to_ascii_lowercase();

    if name.contains("trace") || path.ends_with(".zip") {
        AttachmentKind::Trace
    } else if content_type.starts_with("image/")
        || path.ends_with(".png")
        || path.ends_with(".jpg")
        || path.ends_with(".jpeg")
    {
        AttachmentKind::Screenshot
    } else if content_type.starts_with("video/") || path.ends_with(".webm") || path.ends_with(".mp4")
    {
        AttachmentKind::Video
    } else {
        AttachmentKind::File
    }
}

/// Rewrite an artifact filesystem path into a servable URL by re-rooting at
/// a known artifact directory marker. Paths without a marker get no URL.
pub fn artifact_href(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let marker = segments.iter().position(|s| is_artifact_dir(s))?;
    Some(format!("/artifacts/{}", segments[marker..].join("/")))
}

fn attachment_from(attachment: &PwAttachment) -> Option<Attachment> {
    let path = attachment.path.as_deref()?;
    let href = artifact_href(path)?;
    let name = attachment
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| file_name_of(path));
    let kind = classify_attachment(
        attachment.name.as_deref(),
        attachment.content_type.as_deref(),
        path,
    );
    Some(Attachment { name, kind, href })
}

fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

// ============================================================================
// Tier 2: artifact directory scan
// ============================================================================

fn artifact_kind_from_path(path: &Path) -> Option<AttachmentKind> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".zip") && name.contains("trace") {
        Some(AttachmentKind::Trace)
    } else if name.ends_with(".png") || name.ends_with(".jpg") || name.ends_with(".jpeg") {
        Some(AttachmentKind::Screenshot)
    } else if name.ends_with(".webm") || name.ends_with(".mp4") {
        Some(AttachmentKind::Video)
    } else {
        None
    }
}

fn context_title(dir: &Path) -> Option<String> {
    let context = dir.join("error-context.md");
    let text = std::fs::read_to_string(context).ok()?;
    CONTEXT_TITLE_RE
        .captures(&text)
        .map(|c| c[1].trim().to_string())
}

fn artifact_summary(config: &RunnerConfig, log_text: &str) -> Option<RunSummary> {
    let results_dir = config.results_dir_abs();
    let entries = std::fs::read_dir(&results_dir).ok()?;

    let mut test_dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    test_dirs.sort();

    let mut failures = Vec::new();
    for dir in test_dirs {
        let mut found: Vec<(AttachmentKind, PathBuf)> = Vec::new();
        for entry in WalkDir::new(&dir).max_depth(3).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(kind) = artifact_kind_from_path(entry.path()) {
                found.push((kind, entry.path().to_path_buf()));
            }
        }
        if found.is_empty() {
            continue;
        }

        let title = context_title(&dir).unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let attachments = found
            .into_iter()
            .filter_map(|(kind, path)| {
                let path = path.to_string_lossy().into_owned();
                let href = artifact_href(&path)?;
                Some(Attachment {
                    name: file_name_of(&path),
                    kind,
                    href,
                })
            })
            .collect();

        failures.push(FailureRecord {
            title,
            file: None,
            line: None,
            project: None,
            error: None,
            attachments,
        });
    }

    if failures.is_empty() {
        return None;
    }
    Some(RunSummary {
        summary: estimate_counts(log_text),
        failures,
    })
}

// ============================================================================
// Tier 3: log-text parsing
// ============================================================================

fn estimate_counts(log_text: &str) -> SummaryCounts {
    let mut counts = SummaryCounts::default();
    for capture in COUNT_RE.captures_iter(log_text) {
        let n: u64 = capture[1].parse().unwrap_or(0);
        match &capture[2] {
            "passed" => counts.passed = n,
            "failed" => counts.failed = n,
            "skipped" => counts.skipped = n,
            "flaky" => counts.flaky = n,
            _ => {}
        }
    }
    counts.total = counts.passed + counts.failed + counts.skipped + counts.flaky;
    counts
}

fn log_summary(log_text: &str) -> RunSummary {
    let failures = LOG_FAILURE_LINE_RE
        .captures_iter(log_text)
        .map(|capture| FailureRecord {
            title: capture[5].trim().to_string(),
            file: Some(capture[2].trim().to_string()),
            line: capture[3].parse().ok(),
            project: Some(capture[1].to_string()),
            error: None,
            attachments: Vec::new(),
        })
        .collect();

    RunSummary {
        summary: estimate_counts(log_text),
        failures,
    }
}
