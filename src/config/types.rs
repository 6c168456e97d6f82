use crate::core::errors::ReconError;
use crate::core::models::{Severity, Stage};
use crate::core::profile::StageParams;
use crate::plugins::portscan_naabu::PortSelection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cross-run settings, persisted as a small JSON file.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanDefaults,
    pub stages: StageDefaults,
    pub retry: RetrySettings,
    pub report: ReportSettings,
    pub tools: ToolPaths,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ReconError> {
        if self.scan.total_timeout_secs == 0 {
            return Err(ReconError::config("scan.total_timeout_secs must be greater than 0"));
        }
        self.scan
            .ports
            .parse::<PortSelection>()
            .map_err(|e| ReconError::config(format!("scan.ports: {}", e)))?;

        if self.retry.max_attempts == 0 {
            return Err(ReconError::config("retry.max_attempts must be at least 1"));
        }
        if self.retry.max_attempts > 5 {
            return Err(ReconError::config("retry.max_attempts must not exceed 5"));
        }
        if self.retry.backoff_ms > self.retry.max_backoff_ms {
            return Err(ReconError::config("retry.backoff_ms must not exceed retry.max_backoff_ms"));
        }
        if self.scan.output_dir.as_os_str().is_empty() {
            return Err(ReconError::config("scan.output_dir cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanDefaults {
    pub total_timeout_secs: u64,
    pub ports: String,
    pub templates: Vec<String>,
    pub tags: Vec<String>,
    pub severities: Vec<Severity>,
    pub output_dir: PathBuf,
}

impl Default for ScanDefaults {
    fn default() -> Self {
        Self {
            total_timeout_secs: 3600,
            ports: "top-1000".to_string(),
            templates: Vec::new(),
            tags: Vec::new(),
            severities: Vec::new(),
            output_dir: PathBuf::from("scans"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StageDefaults {
    pub port_scan: StageParams,
    pub http_probe: StageParams,
    pub vuln_scan: StageParams,
}

impl StageDefaults {
    pub fn params(&self, stage: Stage) -> &StageParams {
        match stage {
            Stage::PortScan => &self.port_scan,
            Stage::HttpProbe => &self.http_probe,
            Stage::VulnScan => &self.vuln_scan,
        }
    }
}

impl Default for StageDefaults {
    fn default() -> Self {
        Self {
            port_scan: StageParams {
                rate_limit: 1000,
                concurrency: 25,
                timeout_secs: 600,
                retries: 2,
                extra_flags: Vec::new(),
            },
            http_probe: StageParams {
                rate_limit: 150,
                concurrency: 50,
                timeout_secs: 600,
                retries: 2,
                extra_flags: Vec::new(),
            },
            vuln_scan: StageParams {
                rate_limit: 150,
                concurrency: 25,
                timeout_secs: 1800,
                retries: 1,
                extra_flags: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per stage, first run included.
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 2000,
            max_backoff_ms: 10000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Markdown,
    Html,
    Json,
    Csv,
    Xml,
    Matrix,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 6] = [
        ReportFormat::Markdown,
        ReportFormat::Html,
        ReportFormat::Json,
        ReportFormat::Csv,
        ReportFormat::Xml,
        ReportFormat::Matrix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Markdown => "markdown",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Xml => "xml",
            ReportFormat::Matrix => "matrix",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportSettings {
    pub formats: Vec<ReportFormat>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            formats: ReportFormat::ALL.to_vec(),
        }
    }
}

/// Explicit executable overrides plus extra directories searched before the
/// built-in install locations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolPaths {
    pub naabu: Option<PathBuf>,
    pub httpx: Option<PathBuf>,
    pub nuclei: Option<PathBuf>,
    pub search_dirs: Vec<PathBuf>,
}

impl ToolPaths {
    pub fn override_for(&self, tool: &str) -> Option<&PathBuf> {
        match tool {
            "naabu" => self.naabu.as_ref(),
            "httpx" => self.httpx.as_ref(),
            "nuclei" => self.nuclei.as_ref(),
            _ => None,
        }
    }
}
