use crate::core::models::Stage;
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy)]
struct Discoveries {
    ports: usize,
    services: usize,
    findings: usize,
}

/// Terminal progress for a run: one spinner per active stage plus a running
/// discovery tally. Cheap to clone; all clones drive the same bars.
#[derive(Clone)]
pub struct ProgressManager {
    multi: Arc<MultiProgress>,
    enabled: bool,
    stage_bar: Arc<Mutex<Option<ProgressBar>>>,
    discovery_bar: Arc<Mutex<Option<ProgressBar>>>,
    discoveries: Arc<Mutex<Discoveries>>,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self::build(MultiProgress::new(), true)
    }

    /// No bars are drawn; status lines still reach stderr.
    pub fn hidden() -> Self {
        Self::build(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()), false)
    }

    fn build(multi: MultiProgress, enabled: bool) -> Self {
        Self {
            multi: Arc::new(multi),
            enabled,
            stage_bar: Arc::new(Mutex::new(None)),
            discovery_bar: Arc::new(Mutex::new(None)),
            discoveries: Arc::new(Mutex::new(Discoveries::default())),
        }
    }

    fn create_discovery_bar(&self) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::with_template("Discovery: {msg}") {
            pb.set_style(style);
        }
        pb.set_message("0 ports • 0 services • 0 findings");
        pb
    }

    fn refresh_discoveries(&self) {
        let Ok(tally) = self.discoveries.lock().map(|d| *d) else {
            return;
        };
        if let Ok(mut slot) = self.discovery_bar.lock() {
            let bar = slot.get_or_insert_with(|| self.create_discovery_bar());
            bar.set_message(format!(
                "{} ports • {} services • {} findings",
                tally.ports, tally.services, tally.findings
            ));
        }
    }

    /// Record how many real records a finished stage produced.
    pub fn add_discoveries(&self, stage: Stage, count: usize) {
        if let Ok(mut tally) = self.discoveries.lock() {
            match stage {
                Stage::PortScan => tally.ports += count,
                Stage::HttpProbe => tally.services += count,
                Stage::VulnScan => tally.findings += count,
            }
        }
        self.refresh_discoveries();
    }

    pub fn start_stage(&self, stage: Stage, tool: &str) {
        let spinner = self.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} [{elapsed_precise}] {msg}") {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        spinner.set_message(format!("{} ({})", stage.label(), tool));
        spinner.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut slot) = self.stage_bar.lock()
            && let Some(previous) = slot.replace(spinner)
        {
            previous.finish_and_clear();
        }
    }

    pub fn finish_stage(&self) {
        if let Ok(mut slot) = self.stage_bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }

    /// Print above the bars. Falls back to stderr when bars are hidden.
    pub fn println(&self, line: &str) {
        if !self.enabled || self.multi.println(line).is_err() {
            eprintln!("{}", line);
        }
    }

    pub fn print_status(&self, status: &str, message: &str, color: colored::Color) {
        let formatted = format!("{} {}", status.color(color).bold(), message.normal());
        self.println(&formatted);
    }

    pub fn print_success(&self, message: &str) {
        self.print_status("OK", message, colored::Color::Green);
    }

    pub fn print_error(&self, message: &str) {
        self.print_status("ERR", message, colored::Color::Red);
    }

    pub fn print_warning(&self, message: &str) {
        self.print_status("WARN", message, colored::Color::Yellow);
    }

    pub fn print_info(&self, message: &str) {
        self.print_status("INFO", message, colored::Color::Blue);
    }

    pub fn print_section(&self, title: &str) {
        self.println(&format!("\n{}", title.bright_cyan().bold()));
    }

    pub fn finish(&self) {
        self.finish_stage();
        if let Ok(mut slot) = self.discovery_bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_manager_tracks_discoveries() {
        let progress = ProgressManager::hidden();
        progress.add_discoveries(Stage::PortScan, 3);
        progress.add_discoveries(Stage::PortScan, 2);
        progress.add_discoveries(Stage::VulnScan, 1);

        let tally = *progress.discoveries.lock().unwrap();
        assert_eq!(tally.ports, 5);
        assert_eq!(tally.services, 0);
        assert_eq!(tally.findings, 1);
        progress.finish();
    }

    #[test]
    fn test_stage_spinner_replaced_and_cleared() {
        let progress = ProgressManager::hidden();
        progress.start_stage(Stage::PortScan, "naabu");
        progress.start_stage(Stage::HttpProbe, "httpx");
        assert!(progress.stage_bar.lock().unwrap().is_some());
        progress.finish_stage();
        assert!(progress.stage_bar.lock().unwrap().is_none());
    }
}
