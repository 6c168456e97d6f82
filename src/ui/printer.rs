use crate::core::models::Severity;
use crate::core::pipeline::RunSummary;
use crate::core::state::ScanResults;
use crate::core::status::RunStatus;
use crate::reporters::risk::{Analytics, RiskLevel};
use crate::utils::time::format_duration_ms;
use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

const RULE: &str = "═══════════════════════════════════════";

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::new(n).add_attribute(Attribute::Bold))
        .collect()
}

/// One row per executed stage.
pub fn stage_table(results: &ScanResults) -> String {
    let mut table = new_table();
    table.set_header(header(&["Stage", "Status", "Records", "Attempts", "Duration"]));

    for outcome in &results.stages {
        let status = if outcome.succeeded {
            Cell::new("✓ ok").fg(Color::Green)
        } else if outcome.fallback {
            Cell::new(format!("⚠ {}", outcome.failure_kind.as_deref().unwrap_or("fallback"))).fg(Color::Yellow)
        } else {
            Cell::new("✗ failed").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(outcome.stage.label()),
            status,
            Cell::new(outcome.record_count.to_string()),
            Cell::new(outcome.attempts.to_string()),
            Cell::new(format_duration_ms(outcome.duration_ms)),
        ]);
    }

    table.to_string()
}

pub fn severity_table(analytics: &Analytics) -> String {
    let mut table = new_table();
    table.set_header(header(&["Severity", "Count"]));

    for severity in Severity::DESCENDING {
        let count = analytics.counts.get(severity);
        let mut label = Cell::new(severity.as_str());
        if count > 0 {
            label = label.fg(severity_color(severity));
        }
        table.add_row(vec![label, Cell::new(count.to_string())]);
    }

    table.to_string()
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Magenta,
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Blue,
        Severity::Info => Color::Grey,
    }
}

fn colored_level(level: RiskLevel) -> colored::ColoredString {
    let text = level.as_str();
    match level {
        RiskLevel::Critical => text.magenta().bold(),
        RiskLevel::High => text.red().bold(),
        RiskLevel::Medium => text.yellow().bold(),
        RiskLevel::Low => text.blue().bold(),
        RiskLevel::None => text.green().bold(),
    }
}

fn banner(status: RunStatus) -> colored::ColoredString {
    match status {
        RunStatus::Success => "reconflow Run Complete".green().bold(),
        RunStatus::Partial => "reconflow Run Complete (partial)".yellow().bold(),
        RunStatus::Interrupted => "reconflow Run Interrupted".yellow().bold(),
        RunStatus::Failed => "reconflow Run Failed".red().bold(),
    }
}

pub fn print_summary(summary: &RunSummary) {
    let results = &summary.results;
    let analytics = &summary.analytics;

    println!("\n{}", RULE.green().bold());
    println!("{}", banner(summary.status));
    println!("{}", RULE.green().bold());

    println!("\n{}: {}", "Target".cyan().bold(), results.target);
    println!("{}: {}", "Run ID".cyan().bold(), results.run_id);
    println!(
        "{}: {} / 10 ({})",
        "Risk".cyan().bold(),
        format!("{:.1}", summary.risk.score).bold(),
        colored_level(summary.risk.level)
    );

    println!("\n{}", "Results:".yellow().bold());
    println!("  Open Ports: {}", analytics.total_open_ports.to_string().green().bold());
    println!("  HTTP Services: {}", analytics.total_http_services.to_string().green().bold());
    println!("  Findings: {}", analytics.total_vulnerabilities.to_string().green().bold());

    if !results.stages.is_empty() {
        println!("\n{}", "Stages:".yellow().bold());
        println!("{}", stage_table(results));
    }

    if analytics.total_vulnerabilities > 0 {
        println!("\n{}", "Findings by severity:".yellow().bold());
        println!("{}", severity_table(analytics));
    }

    let degraded = results.degraded_stages();
    if !degraded.is_empty() {
        let labels: Vec<&str> = degraded.iter().map(|s| s.label()).collect();
        println!(
            "\n{} {}",
            "Caveat:".yellow().bold(),
            format!("incomplete data from {}", labels.join(", ")).yellow()
        );
    }

    if !summary.risk.remediation.is_empty() {
        println!("\n{}", "Recommended actions:".yellow().bold());
        for (i, action) in summary.risk.remediation.iter().enumerate() {
            println!("  {}. {}", i + 1, action);
        }
    }

    for (format, error) in &summary.reports.failed {
        println!("{} {} report not written: {}", "⚠".yellow(), format, error);
    }

    println!(
        "\n{}",
        format!("Reports written to {}", summary.run_dir.display()).green().dimmed()
    );
}
