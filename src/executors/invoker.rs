use super::command::{execute, CommandSpec};
use crate::core::errors::ToolFailure;
use crate::core::models::Stage;
use crate::ui::observer::LineObserver;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One fully-built tool invocation. The tool is expected to write its results
/// to `output_path`; stdout is only for display.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub stage: Stage,
    pub tool: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub output_path: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct InvokeReport {
    pub stderr_tail: String,
    pub duration_ms: u128,
}

/// The seam between the pipeline and the outside world. Production runs go
/// through [`ProcessInvoker`]; tests script tool behaviour instead.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: &InvokeRequest,
        observer: &dyn LineObserver,
        cancel: &CancellationToken,
    ) -> Result<InvokeReport, ToolFailure>;
}

pub struct ProcessInvoker;

#[async_trait]
impl ToolInvoker for ProcessInvoker {
    async fn invoke(
        &self,
        request: &InvokeRequest,
        observer: &dyn LineObserver,
        cancel: &CancellationToken,
    ) -> Result<InvokeReport, ToolFailure> {
        let spec = CommandSpec {
            tool: &request.tool,
            program: &request.executable,
            args: &request.args,
            timeout: request.timeout,
            stage: request.stage,
        };
        let result = execute(&spec, observer, cancel).await?;
        tracing::debug!(
            "{} finished in {}ms (pid {:?}, exit {:?}), output at {:?}",
            request.tool,
            result.duration_ms,
            result.pid,
            result.exit_code,
            request.output_path
        );
        Ok(InvokeReport {
            stderr_tail: result.stderr_tail,
            duration_ms: result.duration_ms,
        })
    }
}
