use crate::core::models::Stage;
use crate::core::profile::StageParams;
use std::path::{Path, PathBuf};

/// What a stage scans: the target itself, or a list file derived from the
/// previous stage's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput {
    Target(String),
    List(PathBuf),
}

/// Turns a stage's input and tuning parameters into a tool command line.
/// Plugins never run anything themselves.
pub trait ToolPlugin: Send + Sync {
    fn stage(&self) -> Stage;
    fn tool(&self) -> &'static str;
    fn build_args(&self, input: &StageInput, output: &Path, params: &StageParams) -> Vec<String>;
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
