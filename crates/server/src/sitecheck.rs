//! Per-site HTTP health checks

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use testwatch_common::{
    CheckConfig, CheckItem, Error, Result, SiteCheckResult, SiteConfig,
};

use crate::state::AppState;

/// Per-check request timeout.
const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

/// One site's slot in a full sweep; errors are embedded so a broken site
/// never aborts the batch.
#[derive(Debug, Clone, Serialize)]
pub struct SweepEntry {
    pub site: String,
    pub ok: bool,
    pub result: Option<SiteCheckResult>,
    pub error: Option<String>,
}

pub struct SiteChecker {
    state: Arc<AppState>,
    client: reqwest::Client,
}

impl SiteChecker {
    pub fn new(state: Arc<AppState>) -> Result<Arc<Self>> {
        let client = reqwest::Client::builder().build()?;
        Ok(Arc::new(Self { state, client }))
    }

    /// Run every configured check for one site, record and return the result.
    ///
    /// Checks execute strictly sequentially; network failures become failed
    /// items with a note, never handler errors.
    pub async fn check_site(&self, key: &str) -> Result<SiteCheckResult> {
        let site = self.state.site(key).ok_or_else(|| Error::NotFound {
            kind: "site".to_string(),
            key: key.to_string(),
        })?;

        debug!(site = %site.key, "running site checks");
        let mut items = Vec::with_capacity(site.checks.len());
        for check in &site.checks {
            items.push(self.run_check(&site, check).await);
        }

        let ok = items.iter().all(|i| i.ok);
        let result = SiteCheckResult {
            site: site.key.clone(),
            name: site.name.clone(),
            base: site.base.clone(),
            ok,
            items,
            ts: Utc::now(),
        };
        self.state.record_site_result(result.clone());
        Ok(result)
    }

    /// Check every registered site sequentially, in registration order.
    pub async fn check_all_sites(&self) -> Vec<SweepEntry> {
        let keys: Vec<String> = self.state.config.sites.iter().map(|s| s.key.clone()).collect();
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            match self.check_site(&key).await {
                Ok(result) => entries.push(SweepEntry {
                    site: key,
                    ok: result.ok,
                    result: Some(result),
                    error: None,
                }),
                Err(e) => {
                    warn!(site = %key, "site check failed: {}", e);
                    entries.push(SweepEntry {
                        site: key,
                        ok: false,
                        result: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        entries
    }

    async fn run_check(&self, site: &SiteConfig, check: &CheckConfig) -> CheckItem {
        let url = join_url(&site.base, &check.path);
        let mut item = CheckItem {
            label: check.label.clone(),
            url: url.clone(),
            http: None,
            content_type: None,
            bytes: None,
            ok: false,
            note: None,
        };

        let response = match self.client.get(&url).timeout(CHECK_TIMEOUT).send().await {
            Ok(r) => r,
            Err(e) => {
                item.note = Some(if e.is_timeout() {
                    "Timeout".to_string()
                } else {
                    e.to_string()
                });
                return item;
            }
        };

        let status = response.status().as_u16();
        item.http = Some(status);
        item.content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut ok = true;
        let mut notes = Vec::new();

        if !check.ok.contains(&status) {
            ok = false;
            notes.push(format!("expected status in {:?}, got {}", check.ok, status));
        }

        if let Some(pattern) = &check.content_type {
            let matched = item
                .content_type
                .as_deref()
                .map(|ct| ct.to_ascii_lowercase().contains(&pattern.to_ascii_lowercase()))
                .unwrap_or(false);
            if !matched {
                ok = false;
                notes.push(format!(
                    "content-type {} does not match {}",
                    item.content_type.as_deref().unwrap_or("(none)"),
                    pattern
                ));
            }
        }

        if let Some(min) = check.min_bytes {
            match response.bytes().await {
                Ok(body) => {
                    let len = body.len() as u64;
                    item.bytes = Some(len);
                    if len < min {
                        ok = false;
                        notes.push(format!("body {} bytes, expected at least {}", len, min));
                    }
                }
                Err(e) => {
                    ok = false;
                    notes.push(if e.is_timeout() {
                        "Timeout".to_string()
                    } else {
                        e.to_string()
                    });
                }
            }
        }

        item.ok = ok;
        if !notes.is_empty() {
            item.note = Some(notes.join("; "));
        }
        item
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
