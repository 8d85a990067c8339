//! Artifact file serving
//!
//! Serves trace/screenshot/video files out of the runner's output
//! directories. The same directory predicate gates both the HTTP route and
//! the reconciler's attachment URL rewriting, so every emitted href is
//! servable.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

static NUMBERED_DIR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^artifacts-\d+$").unwrap());

/// Directory names served under /artifacts and recognized as re-root markers
/// inside attachment paths.
pub fn is_artifact_dir(name: &str) -> bool {
    name == "test-results" || name == "playwright-report" || NUMBERED_DIR_RE.is_match(name)
}

/// Resolve `dir/rel` under `root`, rejecting unknown directories and any
/// path component that could escape them.
pub fn resolve_artifact_path(root: &Path, dir: &str, rel: &str) -> Result<PathBuf, StatusCode> {
    if !is_artifact_dir(dir) {
        return Err(StatusCode::FORBIDDEN);
    }

    let mut resolved = root.join(dir);
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return Err(StatusCode::FORBIDDEN),
        }
    }
    Ok(resolved)
}

/// Serve one artifact file with a guessed content type.
pub async fn serve_artifact(root: &Path, dir: &str, rel: &str) -> Response {
    let path = match resolve_artifact_path(root, dir, rel) {
        Ok(path) => path,
        Err(code) => return (code, "Forbidden").into_response(),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime.as_ref().to_string())],
                bytes,
            )
                .into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "File not found").into_response(),
    }
}
