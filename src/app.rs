use crate::{
    cli::args::Cli,
    config::{ConfigLoader, Settings},
    core::{
        budget::VulnScope,
        errors::ReconError,
        models::Stage,
        pipeline::{regenerate_reports, PipelineController, PipelineRequest, RunSummary, StageScope},
        profile::ProfileResolver,
        status::RunStatus,
        target::Target,
    },
    executors::{invoker::ProcessInvoker, toolchain::ToolLocations},
    organizers::RunLayout,
    plugins::{portscan_naabu::PortSelection, registry::tool_for, registry::TOOLS},
    reporters::{structured::json_report, ReportContext},
    system::detect_capabilities,
    ui::{observer::ConsoleObserver, printer, progress::ProgressManager},
    utils::{logging, time},
};
use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub async fn run(cli: Cli) -> Result<RunStatus> {
    logging::init(logging::LogSettings::from_cli(&cli))?;

    if let Some(path) = &cli.init_config {
        init_config(path.as_deref())?;
        return Ok(RunStatus::Success);
    }

    let mut settings = ConfigLoader::load_with_custom_path(cli.config.as_deref())?;
    apply_cli_overrides(&cli, &mut settings)?;

    if let Some(dir) = &cli.report_only {
        return report_only(&cli, dir, &settings);
    }

    let raw_target = cli
        .target
        .as_deref()
        .ok_or_else(|| ReconError::config("a target is required unless --report-only is given"))?;
    let target = Target::parse(raw_target)?;
    tracing::info!("Starting reconflow for target: {} ({:?})", target.as_str(), target.kind());

    let capabilities = detect_capabilities();
    let profile = ProfileResolver::new(&settings.stages).resolve(cli.mode(), Some(&capabilities))?;
    tracing::info!("Scan profile: {}", profile.mode.as_str());

    let scope = StageScope::from(cli.tool);
    let locations = ToolLocations::discover(&settings.tools, &TOOLS);
    let needed: Vec<&str> = scope.stages().into_iter().map(tool_for).collect();
    let missing = locations.missing(&needed);

    let run_id = time::new_run_id(target.as_str());
    let base = cli.output_dir.clone().unwrap_or_else(|| settings.scan.output_dir.clone());
    let layout = RunLayout::create(&base, &run_id)
        .with_context(|| format!("Failed to create output directory under {:?}", base))?;
    tracing::info!("Run directory: {:?}", layout.root());

    let progress = if cli.no_progress || cli.json_output || !std::io::stderr().is_terminal() {
        ProgressManager::hidden()
    } else {
        ProgressManager::new()
    };
    progress.print_section(&format!("reconflow: {}", target.as_str()));
    progress.print_info(&format!("Run directory: {}", layout.root().display()));
    for tool in &missing {
        progress.print_warning(&format!("{} not found; its stage will use fallback data", tool));
    }

    let request = PipelineRequest {
        target,
        scope,
        ports: port_selection(&cli, &settings)?,
        vuln_scope: VulnScope {
            templates: pick(&cli.templates, &settings.scan.templates),
            tags: pick(&cli.tags, &settings.scan.tags),
            severities: pick(&cli.severity, &settings.scan.severities),
            rate_limit: 0,
        },
        total_timeout: Duration::from_secs(cli.timeout.unwrap_or(settings.scan.total_timeout_secs)),
    };

    let cancel = CancellationToken::new();
    let listener = install_interrupt_handler(cancel.clone(), progress.clone())?;

    let observer = ConsoleObserver::new(progress.clone(), cli.verbose || cli.debug);
    let invoker = ProcessInvoker;
    let controller = PipelineController::new(locations, &invoker, profile, &settings, cancel)
        .with_observer(&observer)
        .with_progress(progress);

    let outcome = controller.run(&request, &layout).await;
    listener.abort();
    let summary = outcome?;

    present(&cli, &summary)?;
    tracing::info!("Run finished with status {}", summary.status);
    Ok(summary.status)
}

/// The handler is registered before this returns, so an interrupt that lands
/// while the first tool is still starting is not lost.
fn install_interrupt_handler(cancel: CancellationToken, progress: ProgressManager) -> Result<JoinHandle<()>> {
    #[cfg(unix)]
    let mut interrupts = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .context("Failed to install interrupt handler")?;
    #[cfg(windows)]
    let mut interrupts = tokio::signal::windows::ctrl_c().context("Failed to install interrupt handler")?;

    Ok(tokio::spawn(async move {
        if interrupts.recv().await.is_some() {
            progress.print_warning("Interrupt received, stopping the current tool...");
            cancel.cancel();
        }
    }))
}

/// CLI values win over settings; extra flags are appended to the configured ones.
fn apply_cli_overrides(cli: &Cli, settings: &mut Settings) -> Result<()> {
    for stage in Stage::ALL {
        let Some(raw) = cli.extra_flags(stage) else {
            continue;
        };
        let flags = shell_words::split(raw)
            .map_err(|e| ReconError::config(format!("invalid extra {} flags '{}': {}", tool_for(stage), raw, e)))?;
        let params = match stage {
            Stage::PortScan => &mut settings.stages.port_scan,
            Stage::HttpProbe => &mut settings.stages.http_probe,
            Stage::VulnScan => &mut settings.stages.vuln_scan,
        };
        params.extra_flags.extend(flags);
    }

    if !cli.formats.is_empty() {
        settings.report.formats = cli.formats.clone();
    }

    settings.validate()?;
    Ok(())
}

fn port_selection(cli: &Cli, settings: &Settings) -> Result<PortSelection> {
    match &cli.ports {
        Some(ports) => Ok(ports.clone()),
        None => Ok(settings
            .scan
            .ports
            .parse()
            .map_err(|e: String| ReconError::config(format!("scan.ports: {}", e)))?),
    }
}

fn pick<T: Clone>(from_cli: &[T], from_settings: &[T]) -> Vec<T> {
    if from_cli.is_empty() {
        from_settings.to_vec()
    } else {
        from_cli.to_vec()
    }
}

fn report_only(cli: &Cli, dir: &Path, settings: &Settings) -> Result<RunStatus> {
    tracing::info!("Regenerating reports in {:?}", dir);
    let summary = regenerate_reports(dir, &settings.report.formats)
        .with_context(|| format!("Failed to regenerate reports in {:?}", dir))?;
    present(cli, &summary)?;
    Ok(RunStatus::Success)
}

fn present(cli: &Cli, summary: &RunSummary) -> Result<()> {
    if cli.json_output {
        let ctx = ReportContext::new(&summary.results, &summary.analytics, &summary.risk);
        let json = serde_json::to_string_pretty(&json_report(&ctx)).context("Failed to serialize JSON report")?;
        println!("{}", json);
    } else {
        printer::print_summary(summary);
    }
    Ok(())
}

fn init_config(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => ConfigLoader::user_settings_path()
            .ok_or_else(|| ReconError::config("could not determine the user config directory"))?,
    };
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing settings file: {:?}", path);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    ConfigLoader::save_to_file(&Settings::default(), &path)?;
    println!("Default settings written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ReportFormat;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_overrides_settings() {
        let cli = Cli::try_parse_from([
            "reconflow",
            "10.0.0.5",
            "--extra-naabu",
            "-exclude-cdn -verify",
            "--formats",
            "json",
        ])
        .unwrap();
        let mut settings = Settings::default();
        settings.stages.port_scan.extra_flags = vec!["-silent".to_string()];

        apply_cli_overrides(&cli, &mut settings).unwrap();

        assert_eq!(settings.stages.port_scan.extra_flags, vec!["-silent", "-exclude-cdn", "-verify"]);
        assert!(settings.stages.vuln_scan.extra_flags.is_empty());
        assert_eq!(settings.report.formats, vec![ReportFormat::Json]);
    }

    #[test]
    fn test_unbalanced_extra_flags_rejected() {
        let cli = Cli::try_parse_from(["reconflow", "10.0.0.5", "--extra-nuclei", "-H 'X-Test: 1"]).unwrap();
        let mut settings = Settings::default();
        assert!(apply_cli_overrides(&cli, &mut settings).is_err());
    }

    #[test]
    fn test_port_selection_precedence() {
        let settings = Settings::default();
        let cli = Cli::try_parse_from(["reconflow", "10.0.0.5"]).unwrap();
        assert_eq!(port_selection(&cli, &settings).unwrap(), PortSelection::Top(1000));

        let cli = Cli::try_parse_from(["reconflow", "10.0.0.5", "--ports", "full"]).unwrap();
        assert_eq!(port_selection(&cli, &settings).unwrap(), PortSelection::Full);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_before_first_poll_cancels() {
        let cancel = CancellationToken::new();
        let listener = install_interrupt_handler(cancel.clone(), ProgressManager::hidden()).unwrap();

        // The listener task has not run yet on this single-threaded runtime.
        // SAFETY: a SIGINT handler is installed for this process above.
        unsafe { libc::raise(libc::SIGINT) };

        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
        listener.abort();
    }

    #[test]
    fn test_init_config_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        init_config(Some(&path)).unwrap();
        let loaded = ConfigLoader::load_with_custom_path(Some(&path)).unwrap();
        assert_eq!(loaded, Settings::default());

        assert!(init_config(Some(&path)).is_err());
    }
}
