use super::basic::{render_summary, SUMMARY_FILE};
use super::context::ReportContext;
use super::markdown::{HtmlRenderer, MarkdownRenderer};
use super::matrix::MatrixRenderer;
use super::structured::{CsvRenderer, JsonRenderer, XmlRenderer};
use crate::config::types::ReportFormat;
use crate::core::errors::ReconError;
use crate::organizers::layout::RunLayout;
use crate::utils::fs::atomic_write;
use anyhow::Result;
use std::path::PathBuf;

/// One optional report format.
pub trait Renderer {
    fn format(&self) -> ReportFormat;
    fn file_name(&self) -> &'static str;
    fn render(&self, ctx: &ReportContext<'_>) -> Result<String>;
}

#[derive(Debug, Default)]
pub struct EmitOutcome {
    pub written: Vec<PathBuf>,
    /// Format name and error for each renderer that failed.
    pub failed: Vec<(String, String)>,
}

pub struct ReportEmitter {
    renderers: Vec<Box<dyn Renderer>>,
}

impl ReportEmitter {
    pub fn new(formats: &[ReportFormat]) -> Self {
        let renderers = ReportFormat::ALL
            .into_iter()
            .filter(|f| formats.contains(f))
            .map(renderer_for)
            .collect();
        Self { renderers }
    }

    #[cfg(test)]
    fn with_renderers(renderers: Vec<Box<dyn Renderer>>) -> Self {
        Self { renderers }
    }

    /// Write the basic summary, then every selected format independently.
    /// Only a failure to write the summary itself is an error.
    pub fn emit(&self, ctx: &ReportContext<'_>, layout: &RunLayout) -> Result<EmitOutcome> {
        let summary_path = layout.file(SUMMARY_FILE);
        atomic_write(&summary_path, render_summary(ctx).as_bytes()).map_err(|e| {
            ReconError::Report(format!("could not write {:?}: {:#}", summary_path, e))
        })?;

        let mut outcome = EmitOutcome {
            written: vec![summary_path],
            failed: Vec::new(),
        };

        for renderer in &self.renderers {
            let path = layout.file(renderer.file_name());
            let result = renderer
                .render(ctx)
                .and_then(|content| atomic_write(&path, content.as_bytes()));
            match result {
                Ok(()) => {
                    tracing::debug!("Wrote {} report to {:?}", renderer.format().as_str(), path);
                    outcome.written.push(path);
                }
                Err(e) => {
                    tracing::warn!("{} report failed: {:#}", renderer.format().as_str(), e);
                    outcome
                        .failed
                        .push((renderer.format().as_str().to_string(), format!("{:#}", e)));
                }
            }
        }

        Ok(outcome)
    }
}

fn renderer_for(format: ReportFormat) -> Box<dyn Renderer> {
    match format {
        ReportFormat::Markdown => Box::new(MarkdownRenderer),
        ReportFormat::Html => Box::new(HtmlRenderer),
        ReportFormat::Json => Box::new(JsonRenderer),
        ReportFormat::Csv => Box::new(CsvRenderer),
        ReportFormat::Xml => Box::new(XmlRenderer),
        ReportFormat::Matrix => Box::new(MatrixRenderer),
    }
}
