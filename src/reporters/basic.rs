use super::context::ReportContext;
use std::fmt::Write;

pub const SUMMARY_FILE: &str = "summary.txt";

/// Plain-text summary with no template or markup dependencies. It is the one
/// artifact every run leaves behind.
pub fn render_summary(ctx: &ReportContext<'_>) -> String {
    let mut out = String::new();
    let rule = "=".repeat(60);

    // Writing to a String cannot fail.
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "RECONNAISSANCE SUMMARY: {}", ctx.target);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Run ID:     {}", ctx.run_id);
    let _ = writeln!(out, "Status:     {}", ctx.status.to_uppercase());
    let _ = writeln!(out, "Mode:       {}", ctx.mode);
    let _ = writeln!(out, "Started:    {}", ctx.started_at);
    if let Some(finished) = &ctx.finished_at {
        let _ = writeln!(out, "Finished:   {}", finished);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Risk score: {} / 10 ({})", ctx.score_display, ctx.risk.level);
    let _ = writeln!(out);

    let a = ctx.analytics;
    let _ = writeln!(out, "Open ports:          {}", a.total_open_ports);
    let _ = writeln!(out, "HTTP services:       {}", a.total_http_services);
    let _ = writeln!(out, "Vulnerabilities:     {}", a.total_vulnerabilities);
    for row in &ctx.severity_rows {
        let _ = writeln!(out, "  {:<10} {}", row.name, row.count);
    }
    let _ = writeln!(out, "CVE references:      {}", a.cve_count);
    let _ = writeln!(out, "Unique templates:    {}", a.unique_templates);
    let _ = writeln!(out, "Affected services:   {}", a.affected_services);
    let _ = writeln!(out);

    let _ = writeln!(out, "Stages:");
    for stage in &ctx.stages {
        let _ = writeln!(
            out,
            "  {:<20} {:<9} {} records, {} attempt(s), {}",
            stage.label, stage.status, stage.records, stage.attempts, stage.duration
        );
    }

    if !ctx.degraded.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "DEGRADED STAGES (results incomplete):");
        for d in &ctx.degraded {
            let _ = writeln!(out, "  - {}: {} ({})", d.label, d.kind, d.reason);
        }
    }

    if !ctx.notes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Notes:");
        for note in ctx.notes {
            let _ = writeln!(out, "  - {}", note);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Recommended actions:");
    for (i, item) in ctx.risk.remediation.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, item);
    }

    out
}
