use super::types::{path_arg, StageInput, ToolPlugin};
use crate::core::models::Stage;
use crate::core::profile::StageParams;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct HttpxProbe {
    /// Title, technology and web server detection. Off in stealth mode.
    pub fingerprinting: bool,
}

impl ToolPlugin for HttpxProbe {
    fn stage(&self) -> Stage {
        Stage::HttpProbe
    }

    fn tool(&self) -> &'static str {
        "httpx"
    }

    fn build_args(&self, input: &StageInput, output: &Path, params: &StageParams) -> Vec<String> {
        let mut args = match input {
            StageInput::Target(target) => vec!["-u".to_string(), target.clone()],
            StageInput::List(path) => vec!["-l".to_string(), path_arg(path)],
        };

        args.extend([
            "-json".to_string(),
            "-o".to_string(),
            path_arg(output),
            "-silent".to_string(),
            "-no-color".to_string(),
            "-rate-limit".to_string(),
            params.rate_limit.to_string(),
            "-threads".to_string(),
            params.concurrency.to_string(),
            "-retries".to_string(),
            params.retries.to_string(),
            "-status-code".to_string(),
        ]);

        if self.fingerprinting {
            args.extend(["-title", "-tech-detect", "-web-server"].map(String::from));
        }

        args.extend(params.extra_flags.iter().cloned());
        args
    }
}
