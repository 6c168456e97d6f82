use super::errors::{ReconError, ToolFailure};
use super::models::{Stage, StageOutcome, StageResult};
use super::profile::StageParams;
use super::retry::RetryPolicy;
use super::target::Target;
use crate::executors::invoker::{InvokeRequest, ToolInvoker};
use crate::executors::toolchain::ToolLocations;
use crate::output::parser::{normalize, normalize_file, ParsedStage};
use crate::plugins::types::{StageInput, ToolPlugin};
use crate::ui::observer::LineObserver;
use crate::utils::fs::atomic_write;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Written when the vulnerability stage has nothing real to report.
const EMPTY_FINDINGS: &str = "[]\n";

/// One stage, ready to run.
pub struct StageJob<'a> {
    pub plugin: &'a dyn ToolPlugin,
    pub input: StageInput,
    pub output_path: PathBuf,
    pub params: &'a StageParams,
    pub target: &'a Target,
}

/// Why a stage fell back to synthetic output.
struct Degraded {
    kind: String,
    reason: String,
}

impl From<ToolFailure> for Degraded {
    fn from(failure: ToolFailure) -> Self {
        Self {
            kind: failure.kind().to_string(),
            reason: failure.to_string(),
        }
    }
}

/// Runs a single stage under the shared retry policy. Whatever happens short
/// of an interrupt, the stage's output file exists afterwards and is a valid
/// input for the next stage.
pub struct StageRunner<'a> {
    locations: &'a ToolLocations,
    invoker: &'a dyn ToolInvoker,
    retry: &'a RetryPolicy,
    observer: &'a dyn LineObserver,
    cancel: &'a CancellationToken,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        locations: &'a ToolLocations,
        invoker: &'a dyn ToolInvoker,
        retry: &'a RetryPolicy,
        observer: &'a dyn LineObserver,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            locations,
            invoker,
            retry,
            observer,
            cancel,
        }
    }

    /// Fails only on interrupt (`ReconError::Interrupted`) or when the
    /// fallback file itself cannot be written.
    pub async fn run(&self, job: &StageJob<'_>) -> Result<StageResult> {
        let stage = job.plugin.stage();
        let tool = job.plugin.tool();
        let start = Instant::now();
        let args = job.plugin.build_args(&job.input, &job.output_path, job.params);
        tracing::info!("{}: running {} ({} args)", stage.label(), tool, args.len());

        let args = &args;
        let (result, attempts) = self
            .retry
            .run(
                self.cancel,
                move |attempt| self.attempt(job, tool, args, attempt),
                |failure: &ToolFailure| !failure.is_interrupt(),
            )
            .await;

        let parsed = match result {
            Ok(()) => self.read_output(job),
            Err(failure) if failure.is_interrupt() => return Err(ReconError::Interrupted.into()),
            Err(failure) => {
                log_failure(stage, &failure, attempts);
                Err(failure.into())
            }
        };

        let duration_ms = start.elapsed().as_millis();
        match parsed {
            Ok(parsed) => {
                tracing::info!(
                    "{}: {} records ({} lines skipped) in {}ms",
                    stage.label(),
                    parsed.records.len(),
                    parsed.skipped,
                    duration_ms
                );
                Ok(StageResult {
                    outcome: StageOutcome {
                        stage,
                        succeeded: true,
                        fallback: false,
                        output_path: job.output_path.clone(),
                        record_count: parsed.records.len(),
                        skipped_lines: parsed.skipped,
                        attempts,
                        duration_ms,
                        failure_kind: None,
                        failure: None,
                    },
                    records: parsed.records,
                    counts: parsed.counts,
                })
            }
            Err(degraded) => self.fallback(job, degraded, attempts, duration_ms),
        }
    }

    async fn attempt(
        &self,
        job: &StageJob<'_>,
        tool: &str,
        args: &[String],
        attempt: u32,
    ) -> Result<(), ToolFailure> {
        let stage = job.plugin.stage();
        if self.cancel.is_cancelled() {
            return Err(ToolFailure::Interrupted { tool: tool.to_string() });
        }
        let executable = self
            .locations
            .resolve(tool)
            .ok_or_else(|| ToolFailure::NotFound { tool: tool.to_string() })?
            .to_path_buf();

        if attempt > 1 && job.output_path.exists() {
            // Leftovers from a failed attempt must not be mistaken for results.
            if let Err(e) = std::fs::remove_file(&job.output_path) {
                tracing::debug!("Could not remove stale {:?}: {}", job.output_path, e);
            }
        }

        let request = InvokeRequest {
            stage,
            tool: tool.to_string(),
            executable,
            args: args.to_vec(),
            output_path: job.output_path.clone(),
            timeout: job.params.timeout(),
        };
        let report = self.invoker.invoke(&request, self.observer, self.cancel).await?;
        tracing::debug!("{} attempt {} finished in {}ms", tool, attempt, report.duration_ms);
        if !report.stderr_tail.is_empty() {
            tracing::debug!("{} stderr: {}", tool, report.stderr_tail);
        }

        if !job.output_path.exists() && !stage.is_terminal() {
            return Err(ToolFailure::MissingOutput {
                tool: tool.to_string(),
                path: job.output_path.clone(),
            });
        }
        Ok(())
    }

    /// Parse what the tool wrote. An empty result from a non-terminal stage
    /// would starve the next stage, so it counts as degraded.
    fn read_output(&self, job: &StageJob<'_>) -> Result<ParsedStage, Degraded> {
        let stage = job.plugin.stage();

        if !job.output_path.exists() {
            // Terminal stage only: the tool ran and found nothing.
            atomic_write(&job.output_path, EMPTY_FINDINGS.as_bytes()).map_err(|e| Degraded {
                kind: "unreadable_output".to_string(),
                reason: format!("{:#}", e),
            })?;
            return Ok(normalize(stage, EMPTY_FINDINGS));
        }

        let parsed = normalize_file(stage, &job.output_path).map_err(|e| Degraded {
            kind: "unreadable_output".to_string(),
            reason: format!("could not read {:?}: {}", job.output_path, e),
        })?;

        if parsed.records.is_empty() && !stage.is_terminal() {
            return Err(Degraded {
                kind: "empty_output".to_string(),
                reason: format!("{} produced no usable records", job.plugin.tool()),
            });
        }
        Ok(parsed)
    }

    fn fallback(
        &self,
        job: &StageJob<'_>,
        degraded: Degraded,
        attempts: u32,
        duration_ms: u128,
    ) -> Result<StageResult> {
        let stage = job.plugin.stage();
        let content = fallback_content(stage, job.target);
        atomic_write(&job.output_path, content.as_bytes())?;
        tracing::warn!(
            "{}: using fallback output ({}): {}",
            stage.label(),
            degraded.kind,
            degraded.reason
        );

        let parsed = normalize(stage, &content);
        Ok(StageResult {
            outcome: StageOutcome {
                stage,
                succeeded: false,
                fallback: true,
                output_path: job.output_path.clone(),
                record_count: parsed.records.len(),
                skipped_lines: 0,
                attempts,
                duration_ms,
                failure_kind: Some(degraded.kind),
                failure: Some(degraded.reason),
            },
            records: parsed.records,
            counts: parsed.counts,
        })
    }
}

/// Minimal, well-formed output that keeps the next stage fed.
pub fn fallback_content(stage: Stage, target: &Target) -> String {
    match stage {
        Stage::PortScan => format!("{}\n{}\n", target.seed_host_port(80), target.seed_host_port(443)),
        Stage::HttpProbe => {
            let [http, https] = target.seed_urls();
            format!("{}\n{}\n", http, https)
        }
        Stage::VulnScan => EMPTY_FINDINGS.to_string(),
    }
}

fn log_failure(stage: Stage, failure: &ToolFailure, attempts: u32) {
    match failure {
        ToolFailure::NotFound { tool } => tracing::error!(
            "{}: {} is not installed (set tools.{} in settings to point at it)",
            stage.label(),
            tool,
            tool
        ),
        ToolFailure::TimedOut { .. } => {
            tracing::warn!("{}: {} after {} attempt(s)", stage.label(), failure, attempts)
        }
        _ => tracing::error!("{}: {} after {} attempt(s)", stage.label(), failure, attempts),
    }
}
