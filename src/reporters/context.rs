use super::risk::{severity_weight, Analytics, RiskAssessment};
use crate::core::models::{FindingRecord, PortRecord, ServiceRecord, Severity};
use crate::core::state::ScanResults;
use crate::utils::time::format_duration_ms;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SeverityRow {
    pub name: &'static str,
    pub count: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRow {
    pub name: &'static str,
    pub label: &'static str,
    pub status: &'static str,
    pub records: usize,
    pub skipped: usize,
    pub attempts: u32,
    pub duration: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DegradedRow {
    pub label: &'static str,
    pub kind: String,
    pub reason: String,
}

/// Everything a renderer may show, derived once from the stored results.
#[derive(Debug, Serialize)]
pub struct ReportContext<'a> {
    pub target: &'a str,
    pub run_id: &'a str,
    pub status: &'static str,
    pub mode: &'static str,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub generated_at: String,
    pub version: &'static str,
    pub analytics: &'a Analytics,
    pub risk: &'a RiskAssessment,
    pub score_display: String,
    pub severity_rows: Vec<SeverityRow>,
    /// Most severe first; file order within a severity.
    pub findings: Vec<&'a FindingRecord>,
    pub services: &'a [ServiceRecord],
    pub ports: &'a [PortRecord],
    pub stages: Vec<StageRow>,
    pub degraded: Vec<DegradedRow>,
    pub notes: &'a [String],
}

impl<'a> ReportContext<'a> {
    pub fn new(results: &'a ScanResults, analytics: &'a Analytics, risk: &'a RiskAssessment) -> Self {
        let mut findings: Vec<&FindingRecord> = results.findings.iter().collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));

        let severity_rows = Severity::DESCENDING
            .iter()
            .map(|s| SeverityRow {
                name: s.as_str(),
                count: analytics.counts.get(*s),
                weight: severity_weight(*s),
            })
            .collect();

        let stages = results
            .stages
            .iter()
            .map(|s| StageRow {
                name: s.stage.as_str(),
                label: s.stage.label(),
                status: match (s.succeeded, s.fallback) {
                    (true, _) => "ok",
                    (false, true) => "fallback",
                    (false, false) => "failed",
                },
                records: s.record_count,
                skipped: s.skipped_lines,
                attempts: s.attempts,
                duration: format_duration_ms(s.duration_ms),
            })
            .collect();

        let degraded = results
            .stages
            .iter()
            .filter(|s| s.degraded())
            .map(|s| DegradedRow {
                label: s.stage.label(),
                kind: s.failure_kind.clone().unwrap_or_else(|| "unknown".to_string()),
                reason: s.failure.clone().unwrap_or_default(),
            })
            .collect();

        Self {
            target: &results.target,
            run_id: &results.run_id,
            status: results.status.as_str(),
            mode: results.mode.map(|m| m.as_str()).unwrap_or("unknown"),
            started_at: results.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            finished_at: results
                .finished_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            generated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            version: env!("CARGO_PKG_VERSION"),
            analytics,
            risk,
            score_display: format!("{:.1}", risk.score),
            severity_rows,
            findings,
            services: &results.services,
            ports: &results.ports,
            stages,
            degraded,
            notes: &results.notes,
        }
    }
}
