use super::budget::{TimeBudget, VulnScope};
use super::errors::ReconError;
use super::models::{Stage, StageRecords, StageResult};
use super::profile::ScanProfile;
use super::retry::RetryPolicy;
use super::stage::{StageJob, StageRunner};
use super::state::ScanResults;
use super::status::RunStatus;
use super::target::Target;
use crate::config::types::{ReportFormat, Settings};
use crate::executors::invoker::ToolInvoker;
use crate::executors::toolchain::ToolLocations;
use crate::organizers::layout::RunLayout;
use crate::plugins::portscan_naabu::PortSelection;
use crate::plugins::registry::{tool_for, PluginRegistry};
use crate::plugins::types::StageInput;
use crate::reporters::validate::validate_reports;
use crate::reporters::writer::EmitOutcome;
use crate::reporters::{Analytics, ReportContext, ReportEmitter, RiskAssessment};
use crate::ui::observer::{LineObserver, NullObserver};
use crate::ui::progress::ProgressManager;
use crate::utils::fs::atomic_write;
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

static NULL_OBSERVER: NullObserver = NullObserver;

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageScope {
    All,
    /// Run one stage, fed the target directly.
    Only(Stage),
}

impl StageScope {
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            StageScope::All => Stage::ALL.to_vec(),
            StageScope::Only(stage) => vec![*stage],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub target: Target,
    pub scope: StageScope,
    pub ports: PortSelection,
    pub vuln_scope: VulnScope,
    pub total_timeout: Duration,
}

/// Final state of a run, after reports were written.
#[derive(Debug)]
pub struct RunSummary {
    pub status: RunStatus,
    pub results: ScanResults,
    pub analytics: Analytics,
    pub risk: RiskAssessment,
    pub reports: EmitOutcome,
    pub run_dir: PathBuf,
}

/// Sequences the stages, shrinks the vulnerability scope as the time budget
/// runs out, and turns whatever was collected into reports.
pub struct PipelineController<'a> {
    locations: ToolLocations,
    invoker: &'a dyn ToolInvoker,
    profile: ScanProfile,
    retry: RetryPolicy,
    formats: Vec<ReportFormat>,
    observer: &'a dyn LineObserver,
    progress: ProgressManager,
    cancel: CancellationToken,
}

impl<'a> PipelineController<'a> {
    pub fn new(
        locations: ToolLocations,
        invoker: &'a dyn ToolInvoker,
        profile: ScanProfile,
        settings: &Settings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            locations,
            invoker,
            profile,
            retry: RetryPolicy::from_settings(&settings.retry),
            formats: settings.report.formats.clone(),
            observer: &NULL_OBSERVER,
            progress: ProgressManager::hidden(),
            cancel,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn LineObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_progress(mut self, progress: ProgressManager) -> Self {
        self.progress = progress;
        self
    }

    #[cfg(test)]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self, request: &PipelineRequest, layout: &RunLayout) -> Result<RunSummary> {
        let budget = TimeBudget::new(request.total_timeout);
        let mut results = ScanResults::new(request.target.as_str(), &layout.run_id(), Some(self.profile.mode));

        let mut requested_scope = request.vuln_scope.clone();
        if requested_scope.rate_limit == 0 {
            requested_scope.rate_limit = self.profile.vuln_scan.rate_limit;
        }
        let mut registry = PluginRegistry::new(&self.profile, request.ports.clone(), requested_scope.clone());
        let runner = StageRunner::new(&self.locations, self.invoker, &self.retry, self.observer, &self.cancel);

        let mut previous: Option<StageRecords> = None;
        let mut interrupted = false;

        for stage in request.scope.stages() {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            if stage == Stage::VulnScan {
                self.apply_budget(&budget, &requested_scope, &mut registry, &mut results);
            }

            let input = self.stage_input(stage, &request.target, previous.as_ref(), layout)?;
            self.progress.start_stage(stage, tool_for(stage));

            let job = StageJob {
                plugin: registry.plugin(stage),
                input,
                output_path: layout.stage_output(stage),
                params: self.profile.params(stage),
                target: &request.target,
            };

            match runner.run(&job).await {
                Ok(result) => {
                    self.progress.finish_stage();
                    self.announce(&result);
                    results.record_stage(&result);
                    previous = Some(result.records);
                }
                Err(e) if is_interrupt(&e) => {
                    self.progress.finish_stage();
                    self.progress.print_warning(&format!("{} interrupted", stage.label()));
                    results.note(format!("Run interrupted during {}", stage.label()));
                    interrupted = true;
                    break;
                }
                Err(e) => {
                    self.progress.finish_stage();
                    self.progress.print_error(&format!("{} aborted: {:#}", stage.label(), e));
                    return Err(e);
                }
            }

            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
        }
        self.progress.finish();

        let status = if interrupted {
            RunStatus::Interrupted
        } else {
            results.completion_status()
        };
        results.finish(status);
        results.save(&layout.results_file())?;

        finalize(results, layout, &self.formats)
    }

    fn apply_budget(
        &self,
        budget: &TimeBudget,
        requested: &VulnScope,
        registry: &mut PluginRegistry,
        results: &mut ScanResults,
    ) {
        let fraction = budget.remaining_fraction();
        let degradation = requested.degrade(fraction);
        let remaining = (fraction * 100.0).round();

        if degradation.narrowed {
            let message = format!(
                "{}% of the time budget left: vulnerability scan narrowed to tags [{}], severities [{}]",
                remaining,
                degradation.scope.tags.join(","),
                degradation
                    .scope
                    .severities
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(",")
            );
            tracing::warn!("{}", message);
            self.progress.print_warning(&message);
            results.note(message);
        }
        if degradation.rate_capped {
            let message = format!(
                "{}% of the time budget left: vulnerability scan rate capped at {} req/s",
                remaining, degradation.scope.rate_limit
            );
            tracing::warn!("{}", message);
            results.note(message);
        }
        if budget.is_exhausted() {
            results.note("Time budget exhausted before the vulnerability scan; ran at minimum scope");
        }

        registry.set_vuln_scope(degradation.scope);
    }

    /// The first stage of a run scans the target itself; later stages read a
    /// list derived from the previous stage's records.
    fn stage_input(
        &self,
        stage: Stage,
        target: &Target,
        previous: Option<&StageRecords>,
        layout: &RunLayout,
    ) -> Result<StageInput> {
        let direct = match stage {
            Stage::PortScan => StageInput::Target(target.scan_host().to_string()),
            Stage::HttpProbe | Stage::VulnScan => StageInput::Target(target.as_str().to_string()),
        };

        let (Some(previous), Some(path)) = (previous, layout.stage_input(stage)) else {
            return Ok(direct);
        };

        let lines = derived_lines(previous);
        if lines.is_empty() {
            return Ok(direct);
        }
        let mut content = lines.join("\n");
        content.push('\n');
        atomic_write(&path, content.as_bytes())?;
        tracing::debug!("{} input: {} entries in {:?}", stage.label(), lines.len(), path);
        Ok(StageInput::List(path))
    }

    fn announce(&self, result: &StageResult) {
        let outcome = &result.outcome;
        let label = outcome.stage.label();
        if outcome.succeeded {
            self.progress.add_discoveries(outcome.stage, outcome.record_count);
            self.progress.print_success(&format!("{}: {} records", label, outcome.record_count));
        } else {
            self.progress.print_warning(&format!(
                "{} degraded ({}), continuing with fallback data",
                label,
                outcome.failure_kind.as_deref().unwrap_or("unknown")
            ));
        }
    }
}

/// `host:port` lines from ports, URLs from services, deduplicated in order.
fn derived_lines(records: &StageRecords) -> Vec<String> {
    let raw: Vec<String> = match records {
        StageRecords::Ports(ports) => ports.iter().map(|p| p.host_port()).collect(),
        StageRecords::Services(services) => services.iter().map(|s| s.url.clone()).collect(),
        StageRecords::Findings(_) => Vec::new(),
    };
    let mut seen = HashSet::new();
    raw.into_iter().filter(|line| seen.insert(line.clone())).collect()
}

fn is_interrupt(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<ReconError>(), Some(ReconError::Interrupted))
}

/// Score the results and write every report. Shared by scans and `--report-only`.
pub fn finalize(results: ScanResults, layout: &RunLayout, formats: &[ReportFormat]) -> Result<RunSummary> {
    let analytics = Analytics::from_results(&results);
    let risk = RiskAssessment::from_analytics(&analytics);

    let reports = {
        let ctx = ReportContext::new(&results, &analytics, &risk);
        ReportEmitter::new(formats).emit(&ctx, layout)?
    };
    validate_reports(layout)?;

    Ok(RunSummary {
        status: results.status,
        results,
        analytics,
        risk,
        reports,
        run_dir: layout.root().to_path_buf(),
    })
}

/// Rebuild reports for an existing run directory without running any tool.
/// Prefers the stored `results.json`; falls back to the raw stage files.
pub fn regenerate_reports(dir: &Path, formats: &[ReportFormat]) -> Result<RunSummary> {
    let layout = RunLayout::open(dir)?;
    let results_path = layout.results_file();

    let stored = if results_path.exists() {
        match ScanResults::load(&results_path) {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!("Ignoring unreadable {:?}: {:#}", results_path, e);
                None
            }
        }
    } else {
        None
    };

    let results = match stored {
        Some(results) => results,
        None => {
            let rebuilt = ScanResults::rebuild_from_dir(layout.root())?;
            rebuilt.save(&results_path)?;
            rebuilt
        }
    };

    finalize(results, &layout, formats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::StageDefaults;
    use crate::core::models::Severity;
    use crate::core::profile::{HostCapabilities, ProfileResolver, ScanMode};
    use crate::core::testing::{Behavior, ScriptedInvoker};
    use pretty_assertions::assert_eq;
    use std::fs;

    const PORTS: &str = "{\"host\":\"example.com\",\"ip\":\"93.184.216.34\",\"port\":80,\"protocol\":\"tcp\"}\n\
                         {\"host\":\"example.com\",\"ip\":\"93.184.216.34\",\"port\":443,\"protocol\":\"tcp\"}\n";
    const SERVICES: &str = "{\"url\":\"https://example.com\",\"status_code\":200,\"title\":\"Example Domain\",\"tech\":[\"nginx\"],\"webserver\":\"nginx\"}\n";
    const FINDINGS: &str = "{\"template-id\":\"CVE-2021-41773\",\"matched-at\":\"https://example.com/cgi-bin/\",\"info\":{\"name\":\"Apache path traversal\",\"severity\":\"high\",\"classification\":{\"cve-id\":[\"cve-2021-41773\"]},\"tags\":[\"cve\",\"apache\"]}}\n\
                            {\"template-id\":\"missing-csp\",\"matched-at\":\"https://example.com\",\"info\":{\"name\":\"Missing CSP\",\"severity\":\"MEDIUM\"}}\n\
                            [WRN] template loading took longer than expected\n";

    fn profile(mode: ScanMode) -> ScanProfile {
        let caps = HostCapabilities {
            cpu_count: 4,
            memory_mb: Some(8192),
            privileged: false,
        };
        ProfileResolver::new(&StageDefaults::default())
            .resolve(mode, Some(&caps))
            .unwrap()
    }

    fn request(target: &str) -> PipelineRequest {
        PipelineRequest {
            target: Target::parse(target).unwrap(),
            scope: StageScope::All,
            ports: PortSelection::Top(100),
            vuln_scope: VulnScope::default(),
            total_timeout: Duration::from_secs(3600),
        }
    }

    fn controller<'a>(
        invoker: &'a ScriptedInvoker,
        locations: ToolLocations,
        mode: ScanMode,
        cancel: CancellationToken,
    ) -> PipelineController<'a> {
        PipelineController::new(locations, invoker, profile(mode), &Settings::default(), cancel)
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)))
    }

    #[tokio::test]
    async fn test_full_run_succeeds() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "example.com_run").unwrap();
        let invoker = ScriptedInvoker::new()
            .on(Stage::PortScan, Behavior::Write(PORTS.to_string()))
            .on(Stage::HttpProbe, Behavior::Write(SERVICES.to_string()))
            .on(Stage::VulnScan, Behavior::Write(FINDINGS.to_string()));

        let summary = controller(&invoker, ScriptedInvoker::all_tools(), ScanMode::Normal, CancellationToken::new())
            .run(&request("example.com"), &layout)
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.status.exit_code(), 0);
        assert_eq!(summary.analytics.total_open_ports, 2);
        assert_eq!(summary.analytics.total_http_services, 1);
        assert_eq!(summary.analytics.counts.get(Severity::High), 1);
        assert_eq!(summary.analytics.cve_count, 1);
        // 3 + 2 + 0.1 * (2 + 1) + 0.5
        assert_eq!(summary.risk.score, 5.8);
        assert!(summary.reports.failed.is_empty());

        let derived = fs::read_to_string(layout.file("ports_input.txt")).unwrap();
        assert_eq!(derived, "example.com:80\nexample.com:443\n");
        let calls = invoker.calls();
        assert_eq!(&calls[1].args[..2], ["-l".to_string(), layout.file("ports_input.txt").display().to_string()]);

        let md = fs::read_to_string(layout.file("report.md")).unwrap();
        assert!(md.contains("Risk score: 5.8 / 10"));
        assert!(!md.contains("## Caveats"));

        let stored = ScanResults::load(&layout.results_file()).unwrap();
        assert_eq!(stored.status, RunStatus::Success);
        assert_eq!(stored.stages.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_vuln_tool_is_partial() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "10.0.0.5_run").unwrap();
        let invoker = ScriptedInvoker::new()
            .on(
                Stage::PortScan,
                Behavior::Write("10.0.0.5:22\n10.0.0.5:80\n10.0.0.5:443\n".to_string()),
            )
            .on(Stage::HttpProbe, Behavior::Write("http://10.0.0.5\nhttps://10.0.0.5\n".to_string()));
        let locations = ToolLocations::with_paths([
            ("naabu", PathBuf::from("/opt/fake/naabu")),
            ("httpx", PathBuf::from("/opt/fake/httpx")),
        ]);

        let summary = controller(&invoker, locations, ScanMode::Normal, CancellationToken::new())
            .run(&request("10.0.0.5"), &layout)
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.status.exit_code(), 2);
        assert_eq!(summary.results.degraded_stages(), vec![Stage::VulnScan]);
        assert_eq!(invoker.call_count(Stage::VulnScan), 0);
        assert_eq!(fs::read_to_string(layout.stage_output(Stage::VulnScan)).unwrap(), "[]\n");
        assert_eq!(summary.analytics.total_vulnerabilities, 0);
        // exposure only: 0.1 * (3 ports + 2 services)
        assert_eq!(summary.risk.score, 0.5);

        let summary_txt = fs::read_to_string(layout.file("summary.txt")).unwrap();
        assert!(summary_txt.contains("DEGRADED STAGES"));
        assert!(summary_txt.contains("Vulnerability scan: not_found"));
    }

    #[tokio::test]
    async fn test_stealth_profile_is_gentler() {
        let normal = profile(ScanMode::Normal);
        let stealth = profile(ScanMode::Stealth);
        for stage in Stage::ALL {
            assert!(stealth.params(stage).rate_limit <= normal.params(stage).rate_limit);
            assert!(stealth.params(stage).concurrency <= normal.params(stage).concurrency);
        }

        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "stealth_run").unwrap();
        let invoker = ScriptedInvoker::new()
            .on(Stage::PortScan, Behavior::Write(PORTS.to_string()))
            .on(Stage::HttpProbe, Behavior::Write(SERVICES.to_string()));

        controller(&invoker, ScriptedInvoker::all_tools(), ScanMode::Stealth, CancellationToken::new())
            .run(&request("example.com"), &layout)
            .await
            .unwrap();

        let calls = invoker.calls();
        assert!(!calls[1].args.contains(&"-tech-detect".to_string()));
        assert!(calls[2].args.contains(&"-no-interactsh".to_string()));
    }

    #[tokio::test]
    async fn test_report_only_from_raw_ports() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("old_run");
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join("ports.json"),
            "[{\"host\":\"10.0.0.5\",\"port\":22,\"protocol\":\"tcp\"},\
              {\"host\":\"10.0.0.5\",\"port\":80,\"protocol\":\"tcp\"},\
              {\"host\":\"10.0.0.5\",\"port\":443,\"protocol\":\"tcp\"}]",
        )
        .unwrap();

        let summary = regenerate_reports(&dir, &ReportFormat::ALL).unwrap();

        assert_eq!(summary.analytics.total_open_ports, 3);
        assert_eq!(summary.analytics.total_vulnerabilities, 0);
        assert_eq!(summary.risk.score, 0.3);
        assert!(dir.join("summary.txt").exists());
        assert!(dir.join("results.json").exists());
        assert!(dir.join("report.html").exists());
        assert!(!dir.join("vulnerabilities.jsonl").exists());
    }

    #[tokio::test]
    async fn test_interrupt_during_http_probe() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "interrupted_run").unwrap();
        let invoker = ScriptedInvoker::new()
            .on(Stage::PortScan, Behavior::Write(PORTS.to_string()))
            .on(Stage::HttpProbe, Behavior::Interrupt);
        let cancel = CancellationToken::new();

        let summary = controller(&invoker, ScriptedInvoker::all_tools(), ScanMode::Normal, cancel.clone())
            .run(&request("example.com"), &layout)
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert_eq!(summary.status, RunStatus::Interrupted);
        assert_eq!(summary.status.exit_code(), 130);
        assert_eq!(invoker.call_count(Stage::HttpProbe), 1);
        assert_eq!(invoker.call_count(Stage::VulnScan), 0);
        assert_eq!(fs::read_to_string(layout.stage_output(Stage::PortScan)).unwrap(), PORTS);
        assert_eq!(summary.results.ports.len(), 2);
        assert!(layout.file("summary.txt").exists());
    }

    #[tokio::test]
    async fn test_exhausted_budget_narrows_vuln_scan() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "budget_run").unwrap();
        let invoker = ScriptedInvoker::new()
            .on(Stage::PortScan, Behavior::Write(PORTS.to_string()))
            .on(Stage::HttpProbe, Behavior::Write(SERVICES.to_string()));
        let mut request = request("example.com");
        request.total_timeout = Duration::from_nanos(1);

        let summary = controller(&invoker, ScriptedInvoker::all_tools(), ScanMode::Normal, CancellationToken::new())
            .run(&request, &layout)
            .await
            .unwrap();

        let nuclei = invoker.calls().pop().unwrap();
        let args = nuclei.args.join(" ");
        assert!(args.contains("-tags cve"));
        assert!(args.contains("-severity critical,high"));
        assert!(args.contains("-rate-limit 50"));
        assert!(summary.results.notes.iter().any(|n| n.contains("narrowed")));
        assert_eq!(summary.status, RunStatus::Success);
    }

    #[tokio::test]
    async fn test_single_stage_uses_target_directly() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "single").unwrap();
        let invoker = ScriptedInvoker::new().on(Stage::VulnScan, Behavior::Write(FINDINGS.to_string()));
        let mut request = request("https://example.com/app");
        request.scope = StageScope::Only(Stage::VulnScan);

        let summary = controller(&invoker, ScriptedInvoker::all_tools(), ScanMode::Normal, CancellationToken::new())
            .run(&request, &layout)
            .await
            .unwrap();

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0].args[..2], ["-u", "https://example.com/app"]);
        assert_eq!(summary.results.findings.len(), 2);
        assert_eq!(summary.results.stages.len(), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_runs_nothing() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "cancelled").unwrap();
        let invoker = ScriptedInvoker::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = controller(&invoker, ScriptedInvoker::all_tools(), ScanMode::Normal, cancel)
            .run(&request("example.com"), &layout)
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Interrupted);
        assert!(invoker.calls().is_empty());
        assert!(layout.file("summary.txt").exists());
    }
}
