use super::context::ReportContext;
use super::risk::{severity_weight, CVE_WEIGHT, EXPOSURE_WEIGHT};
use super::writer::Renderer;
use crate::config::types::ReportFormat;
use crate::core::models::Severity;
use anyhow::Result;
use std::fmt::Write;

/// How each severity tier and adjustment contributes to the risk score.
pub struct MatrixRenderer;

impl Renderer for MatrixRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Matrix
    }

    fn file_name(&self) -> &'static str {
        "risk_matrix.txt"
    }

    fn render(&self, ctx: &ReportContext<'_>) -> Result<String> {
        let a = ctx.analytics;
        let mut out = String::new();

        writeln!(out, "RISK MATRIX: {} ({})", ctx.target, ctx.run_id)?;
        writeln!(out)?;
        writeln!(
            out,
            "{:<10} | {:>5} | {:>6} | {:>8} | {:>12}",
            "Severity", "Count", "w/ CVE", "Weight", "Contribution"
        )?;
        writeln!(out, "{}", "-".repeat(53))?;

        let mut base = 0.0;
        for severity in Severity::DESCENDING {
            let count = a.counts.get(severity);
            let with_cve = ctx
                .findings
                .iter()
                .filter(|f| f.severity == severity && f.cve_id.is_some())
                .count();
            let weight = severity_weight(severity);
            let contribution = count as f64 * weight;
            base += contribution;
            writeln!(
                out,
                "{:<10} | {:>5} | {:>6} | {:>8.1} | {:>12.1}",
                severity.as_str(),
                count,
                with_cve,
                weight,
                contribution
            )?;
        }
        writeln!(out, "{}", "-".repeat(53))?;

        let exposed = a.total_open_ports + a.total_http_services;
        let exposure = EXPOSURE_WEIGHT * exposed as f64;
        let cve = CVE_WEIGHT * a.cve_count as f64;
        writeln!(out, "{:<38} {:>14.1}", "Severity base", base)?;
        writeln!(
            out,
            "{:<38} {:>14.1}",
            format!("Exposure ({} ports + {} services)", a.total_open_ports, a.total_http_services),
            exposure
        )?;
        writeln!(out, "{:<38} {:>14.1}", format!("CVE references ({})", a.cve_count), cve)?;
        writeln!(out, "{:<38} {:>14.1}", "Unclamped total", base + exposure + cve)?;
        writeln!(out)?;
        writeln!(out, "Final score: {} / 10 ({})", ctx.score_display, ctx.risk.level)?;

        if !ctx.degraded.is_empty() {
            writeln!(out)?;
            let stages: Vec<&str> = ctx.degraded.iter().map(|d| d.label).collect();
            writeln!(out, "Caveat: incomplete data from {}", stages.join(", "))?;
        }
        Ok(out)
    }
}
