use crate::config::types::ReportFormat;
use crate::core::models::{Severity, Stage};
use crate::core::pipeline::StageScope;
use crate::core::profile::ScanMode;
use crate::plugins::portscan_naabu::PortSelection;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ToolScope {
    #[default]
    All,
    Ports,
    Http,
    Vuln,
}

impl From<ToolScope> for StageScope {
    fn from(scope: ToolScope) -> Self {
        match scope {
            ToolScope::All => StageScope::All,
            ToolScope::Ports => StageScope::Only(Stage::PortScan),
            ToolScope::Http => StageScope::Only(Stage::HttpProbe),
            ToolScope::Vuln => StageScope::Only(Stage::VulnScan),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "reconflow", version)]
#[command(about = "Port discovery, HTTP probing and vulnerability scanning in one pipeline", long_about = None)]
pub struct Cli {
    /// IP, CIDR, domain or URL to scan
    #[arg(required_unless_present_any = ["report_only", "init_config"])]
    pub target: Option<String>,

    /// Run one stage only, fed the target directly
    #[arg(long, value_enum, default_value_t = ToolScope::All)]
    pub tool: ToolScope,

    #[arg(long, help = "Ports: top-100, top-1000, full, or a list/range (22,80,8000-8100)")]
    pub ports: Option<PortSelection>,

    #[arg(long, value_delimiter = ',', help = "Vulnerability templates to run (comma list)")]
    pub templates: Vec<String>,

    #[arg(long, value_delimiter = ',', help = "Vulnerability template tags (comma list)")]
    pub tags: Vec<String>,

    #[arg(long, value_delimiter = ',', value_parser = parse_severity, help = "Severities to report (comma list)")]
    pub severity: Vec<Severity>,

    /// Total time budget for the run, in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Lower rates and concurrency, skip fingerprinting and callback probes
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "auto_config")]
    pub stealth: bool,

    /// Derive rates and concurrency from host CPU and memory
    #[arg(long, action = ArgAction::SetTrue)]
    pub auto_config: bool,

    #[arg(long, help = "Base directory for run output (default: ./scans)")]
    pub output_dir: Option<PathBuf>,

    /// Print the JSON report to stdout instead of the console summary
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_output: bool,

    /// Regenerate reports for an existing run directory without scanning
    #[arg(long, value_name = "DIR")]
    pub report_only: Option<PathBuf>,

    #[arg(long, help = "Settings file (default: ./reconflow.json, then the user config dir)")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, value_delimiter = ',', help = "Report formats (comma list); the text summary is always written")]
    pub formats: Vec<ReportFormat>,

    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true, help = "Extra naabu arguments")]
    pub extra_naabu: Option<String>,

    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true, help = "Extra httpx arguments")]
    pub extra_httpx: Option<String>,

    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true, help = "Extra nuclei arguments")]
    pub extra_nuclei: Option<String>,

    /// Write default settings to PATH (or the user config dir) and exit
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub init_config: Option<Option<PathBuf>>,

    /// Verbose human output
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Debug logs (implies verbose)
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,

    /// Disable progress spinners
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_progress: bool,
}

impl Cli {
    pub fn mode(&self) -> ScanMode {
        if self.stealth {
            ScanMode::Stealth
        } else if self.auto_config {
            ScanMode::Auto
        } else {
            ScanMode::Normal
        }
    }

    pub fn extra_flags(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::PortScan => self.extra_naabu.as_deref(),
            Stage::HttpProbe => self.extra_httpx.as_deref(),
            Stage::VulnScan => self.extra_nuclei.as_deref(),
        }
    }
}

fn parse_severity(raw: &str) -> Result<Severity, String> {
    raw.parse()
}
