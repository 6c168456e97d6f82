//! Scripted stand-ins for external tools, shared by stage and pipeline tests.

use super::errors::ToolFailure;
use super::models::Stage;
use crate::executors::invoker::{InvokeReport, InvokeRequest, ToolInvoker};
use crate::executors::toolchain::ToolLocations;
use crate::plugins::registry::TOOLS;
use crate::ui::observer::{LineObserver, OutputStream};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Exit 0 after writing this content to the output path.
    Write(String),
    /// Exit 0 without writing anything.
    Silent,
    Fail(ToolFailure),
    /// Simulates Ctrl-C arriving while the tool runs.
    Interrupt,
}

/// Plays back queued behaviours per stage. An exhausted queue behaves as
/// [`Behavior::Silent`].
pub struct ScriptedInvoker {
    scripts: Mutex<HashMap<Stage, VecDeque<Behavior>>>,
    calls: Mutex<Vec<InvokeRequest>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(self, stage: Stage, behavior: Behavior) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(behavior);
        self
    }

    pub fn call_count(&self, stage: Stage) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.stage == stage).count()
    }

    pub fn calls(&self) -> Vec<InvokeRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Locations for every pipeline tool; the paths are never executed.
    pub fn all_tools() -> ToolLocations {
        ToolLocations::with_paths(TOOLS.iter().map(|t| (*t, PathBuf::from(format!("/opt/fake/{}", t)))))
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        request: &InvokeRequest,
        observer: &dyn LineObserver,
        cancel: &CancellationToken,
    ) -> Result<InvokeReport, ToolFailure> {
        self.calls.lock().unwrap().push(request.clone());
        let behavior = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Behavior::Silent);

        match behavior {
            Behavior::Write(content) => {
                for line in content.lines() {
                    observer.on_line(request.stage, OutputStream::Stdout, line);
                }
                std::fs::write(&request.output_path, content).unwrap();
                Ok(InvokeReport::default())
            }
            Behavior::Silent => Ok(InvokeReport::default()),
            Behavior::Fail(failure) => Err(failure),
            Behavior::Interrupt => {
                cancel.cancel();
                cancel.cancelled().await;
                Err(ToolFailure::Interrupted {
                    tool: request.tool.clone(),
                })
            }
        }
    }
}
