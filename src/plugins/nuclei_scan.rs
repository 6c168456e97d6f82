use super::types::{path_arg, StageInput, ToolPlugin};
use crate::core::budget::VulnScope;
use crate::core::models::Stage;
use crate::core::profile::StageParams;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct NucleiScan {
    pub scope: VulnScope,
    pub interactsh: bool,
}

impl ToolPlugin for NucleiScan {
    fn stage(&self) -> Stage {
        Stage::VulnScan
    }

    fn tool(&self) -> &'static str {
        "nuclei"
    }

    fn build_args(&self, input: &StageInput, output: &Path, params: &StageParams) -> Vec<String> {
        let mut args = match input {
            StageInput::Target(target) => vec!["-u".to_string(), target.clone()],
            StageInput::List(path) => vec!["-l".to_string(), path_arg(path)],
        };

        // A degraded scope carries its own, lower, rate.
        let rate = match self.scope.rate_limit {
            0 => params.rate_limit,
            scoped => scoped.min(params.rate_limit),
        };

        args.extend([
            "-jsonl".to_string(),
            "-o".to_string(),
            path_arg(output),
            "-silent".to_string(),
            "-no-color".to_string(),
            "-rate-limit".to_string(),
            rate.to_string(),
            "-c".to_string(),
            params.concurrency.to_string(),
            "-retries".to_string(),
            params.retries.to_string(),
        ]);

        for template in &self.scope.templates {
            args.extend(["-t".to_string(), template.clone()]);
        }
        if !self.scope.tags.is_empty() {
            args.extend(["-tags".to_string(), self.scope.tags.join(",")]);
        }
        if !self.scope.severities.is_empty() {
            let severities: Vec<&str> = self.scope.severities.iter().map(|s| s.name()).collect();
            args.extend(["-severity".to_string(), severities.join(",")]);
        }
        if !self.interactsh {
            args.push("-no-interactsh".to_string());
        }

        args.extend(params.extra_flags.iter().cloned());
        args
    }
}
