//! Service configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level TestWatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Test-runner settings
    pub runner: RunnerConfig,

    /// Monitored sites, in registration order
    pub sites: Vec<SiteConfig>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            runner: RunnerConfig::default(),
            sites: default_sites(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Test-runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Working directory containing node_modules
    pub root: PathBuf,

    /// Report output directory, relative to `root` unless absolute
    pub report_dir: PathBuf,

    /// Artifact output directory, relative to `root` unless absolute
    pub results_dir: PathBuf,

    /// Named test groupings passed to the runner as --project flags
    pub projects: Vec<String>,

    /// Debounce before a coalesced re-run launches
    pub rerun_delay_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            report_dir: PathBuf::from("playwright-report"),
            results_dir: PathBuf::from("test-results"),
            projects: vec!["portal".to_string(), "support".to_string()],
            rerun_delay_ms: 250,
        }
    }
}

impl RunnerConfig {
    /// Report directory resolved against the runner root
    pub fn report_dir_abs(&self) -> PathBuf {
        self.root.join(&self.report_dir)
    }

    /// Results directory resolved against the runner root
    pub fn results_dir_abs(&self) -> PathBuf {
        self.root.join(&self.results_dir)
    }

    /// Candidate locations of the structured JSON report, by preference
    pub fn report_json_candidates(&self) -> [PathBuf; 2] {
        [
            self.report_dir_abs().join("report.json"),
            self.results_dir_abs().join("report.json"),
        ]
    }
}

/// One monitored web property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Unique site key used in API calls
    pub key: String,

    /// Human-readable name
    pub name: String,

    /// Base URL; check paths are appended to it
    pub base: String,

    /// Ordered health checks
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

/// One HTTP request/expectation pair within a site's check list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub label: String,

    pub path: String,

    /// Allowed HTTP status codes
    #[serde(default = "default_ok_statuses")]
    pub ok: Vec<u16>,

    /// Content-type the response header must contain (case-insensitive)
    #[serde(default)]
    pub content_type: Option<String>,

    /// Minimum body length; forces a full body read when set
    #[serde(default)]
    pub min_bytes: Option<u64>,
}

fn default_ok_statuses() -> Vec<u16> {
    vec![200]
}

fn default_sites() -> Vec<SiteConfig> {
    vec![
        SiteConfig {
            key: "portal".to_string(),
            name: "Customer Portal".to_string(),
            base: "https://portal.example.com".to_string(),
            checks: vec![
                CheckConfig {
                    label: "Home page".to_string(),
                    path: "/".to_string(),
                    ok: vec![200],
                    content_type: Some("text/html".to_string()),
                    min_bytes: Some(1024),
                },
                CheckConfig {
                    label: "Login page".to_string(),
                    path: "/login".to_string(),
                    ok: vec![200],
                    content_type: Some("text/html".to_string()),
                    min_bytes: None,
                },
            ],
        },
        SiteConfig {
            key: "support".to_string(),
            name: "Support Center".to_string(),
            base: "https://support.example.com".to_string(),
            checks: vec![CheckConfig {
                label: "Home page".to_string(),
                path: "/".to_string(),
                ok: vec![200, 301, 302],
                content_type: Some("text/html".to_string()),
                min_bytes: None,
            }],
        },
    ]
}

impl WatchConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_absent() {
        let config = WatchConfig::load(Path::new("/nonexistent/testwatch.toml")).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:3000");
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.runner.rerun_delay_ms, 250);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: WatchConfig = toml::from_str(
            r#"
            [server]
            listen = "0.0.0.0:8080"

            [[sites]]
            key = "docs"
            name = "Docs"
            base = "https://docs.example.com"

            [[sites.checks]]
            label = "Index"
            path = "/index.html"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.sites.len(), 1);
        // unspecified expectation fields get defaults
        assert_eq!(config.sites[0].checks[0].ok, vec![200]);
        assert!(config.sites[0].checks[0].min_bytes.is_none());
        assert_eq!(config.runner.report_dir, PathBuf::from("playwright-report"));
    }

    #[test]
    fn report_candidates_resolve_against_root() {
        let runner = RunnerConfig {
            root: PathBuf::from("/srv/qa"),
            ..Default::default()
        };
        let [first, second] = runner.report_json_candidates();
        assert_eq!(first, PathBuf::from("/srv/qa/playwright-report/report.json"));
        assert_eq!(second, PathBuf::from("/srv/qa/test-results/report.json"));
    }
}
