use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// The three sequential scan phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PortScan,
    HttpProbe,
    VulnScan,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::PortScan, Stage::HttpProbe, Stage::VulnScan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PortScan => "ports",
            Stage::HttpProbe => "http",
            Stage::VulnScan => "vulnerabilities",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::PortScan => "Port discovery",
            Stage::HttpProbe => "HTTP probing",
            Stage::VulnScan => "Vulnerability scan",
        }
    }

    /// Raw output file written by the stage's tool inside the run directory.
    pub fn output_file(&self) -> &'static str {
        match self {
            Stage::PortScan => "ports.json",
            Stage::HttpProbe => "services.json",
            Stage::VulnScan => "vulnerabilities.jsonl",
        }
    }

    /// The last stage has no consumer, so an empty output is a legitimate result.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::VulnScan)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Highest first, the order reports list them in.
    pub const DESCENDING: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Unknown or missing values count as `Info`.
    pub fn parse_lenient(raw: &str) -> Severity {
        raw.parse().unwrap_or(Severity::Info)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" | "informational" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    pub fn increment(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }

    pub fn add(&mut self, other: &SeverityCounts) {
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
        self.info += other.info;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

impl PortRecord {
    pub fn host_port(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub url: String,
    pub status_code: Option<u16>,
    pub title: Option<String>,
    #[serde(default)]
    pub tech: Vec<String>,
    pub server: Option<String>,
}

impl ServiceRecord {
    pub fn bare(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: None,
            title: None,
            tech: Vec::new(),
            server: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingRecord {
    pub name: String,
    pub severity: Severity,
    pub template_id: String,
    pub matched_url: String,
    pub description: String,
    pub cve_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Records parsed from one stage's output, in file order.
#[derive(Debug, Clone, PartialEq)]
pub enum StageRecords {
    Ports(Vec<PortRecord>),
    Services(Vec<ServiceRecord>),
    Findings(Vec<FindingRecord>),
}

impl StageRecords {
    pub fn len(&self) -> usize {
        match self {
            StageRecords::Ports(r) => r.len(),
            StageRecords::Services(r) => r.len(),
            StageRecords::Findings(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persisted description of how a stage went. `succeeded` reflects the real
/// tool run only: fallback-filled stages are never marked successful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: Stage,
    pub succeeded: bool,
    pub fallback: bool,
    pub output_path: PathBuf,
    pub record_count: usize,
    #[serde(default)]
    pub skipped_lines: usize,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub duration_ms: u128,
    #[serde(default)]
    pub failure_kind: Option<String>,
    #[serde(default)]
    pub failure: Option<String>,
}

impl StageOutcome {
    pub fn degraded(&self) -> bool {
        !self.succeeded
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub outcome: StageOutcome,
    pub records: StageRecords,
    /// Tallied by the normalizer; all zero outside the vulnerability stage.
    pub counts: SeverityCounts,
}
