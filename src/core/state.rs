use super::models::{
    FindingRecord, PortRecord, ServiceRecord, SeverityCounts, Stage, StageOutcome, StageRecords, StageResult,
};
use super::profile::ScanMode;
use super::status::RunStatus;
use crate::output::parser::normalize_file;
use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The normalized model of one run, persisted as `results.json`. Reports are
/// projections of this and can be regenerated from it at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResults {
    pub target: String,
    pub run_id: String,
    pub mode: Option<ScanMode>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub stages: Vec<StageOutcome>,
    pub ports: Vec<PortRecord>,
    pub services: Vec<ServiceRecord>,
    pub findings: Vec<FindingRecord>,
    #[serde(default)]
    pub severity_counts: SeverityCounts,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ScanResults {
    pub fn new(target: &str, run_id: &str, mode: Option<ScanMode>) -> Self {
        Self {
            target: target.to_string(),
            run_id: run_id.to_string(),
            mode,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Success,
            stages: Vec::new(),
            ports: Vec::new(),
            services: Vec::new(),
            findings: Vec::new(),
            severity_counts: SeverityCounts::default(),
            notes: Vec::new(),
        }
    }

    /// Synthetic fallback records keep the next stage fed but never count as
    /// discoveries.
    pub fn record_stage(&mut self, result: &StageResult) {
        self.stages.push(result.outcome.clone());
        if result.outcome.fallback {
            return;
        }
        self.severity_counts.add(&result.counts);
        match &result.records {
            StageRecords::Ports(records) => self.ports.extend(records.iter().cloned()),
            StageRecords::Services(records) => self.services.extend(records.iter().cloned()),
            StageRecords::Findings(records) => self.findings.extend(records.iter().cloned()),
        }
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    pub fn degraded_stages(&self) -> Vec<Stage> {
        self.stages.iter().filter(|s| s.degraded()).map(|s| s.stage).collect()
    }

    pub fn completion_status(&self) -> RunStatus {
        if self.degraded_stages().is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize results")?;
        atomic_write(path, json.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read results file: {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse results file: {:?}", path))
    }

    /// Rebuild the model from whichever raw stage files a run directory holds.
    /// Missing files contribute nothing.
    pub fn rebuild_from_dir(dir: &Path) -> Result<Self> {
        let run_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());
        let mut results = ScanResults::new("unknown", &run_id, None);

        for stage in Stage::ALL {
            let path = dir.join(stage.output_file());
            if !path.exists() {
                tracing::info!("No {} output in {:?}, treating as empty", stage, dir);
                continue;
            }
            let parsed = normalize_file(stage, &path)
                .with_context(|| format!("Failed to read stage output: {:?}", path))?;
            let outcome = StageOutcome {
                stage,
                succeeded: true,
                fallback: false,
                output_path: path,
                record_count: parsed.records.len(),
                skipped_lines: parsed.skipped,
                attempts: 0,
                duration_ms: 0,
                failure_kind: None,
                failure: None,
            };
            results.record_stage(&StageResult {
                outcome,
                records: parsed.records,
                counts: parsed.counts,
            });
        }

        if let Some(first) = results.ports.first() {
            results.target = first.host.clone();
        } else if let Some(first) = results.services.first() {
            results.target = first.url.clone();
        }
        results.note("Rebuilt from raw stage files; stage failure details were not recorded");
        results.finish(RunStatus::Success);
        Ok(results)
    }
}
