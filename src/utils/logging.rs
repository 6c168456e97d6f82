//! Diagnostics go to stderr only, so `--json-output` keeps stdout machine-readable.

use crate::cli::args::Cli;
use anyhow::{Context, Result};
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    /// Module paths in each line; only worth the noise under `--debug`.
    pub show_targets: bool,
    pub color: bool,
}

impl LogSettings {
    pub fn from_cli(cli: &Cli) -> Self {
        let level = match (cli.debug, cli.verbose) {
            (true, _) => LevelFilter::DEBUG,
            (false, true) => LevelFilter::INFO,
            (false, false) => LevelFilter::WARN,
        };
        Self {
            level,
            show_targets: cli.debug,
            color: std::io::stderr().is_terminal(),
        }
    }

    /// `RUST_LOG` directives are layered over the CLI level. Unparseable
    /// directives are dropped rather than aborting the run.
    fn filter(&self, env: Option<&str>) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level.into())
            .parse_lossy(env.unwrap_or_default())
    }
}

pub fn init(settings: LogSettings) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(settings.filter(env.as_deref()))
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_ansi(settings.color)
                .with_target(settings.show_targets),
        )
        .try_init()
        .context("Failed to initialize logging")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(&["reconflow", "10.0.0.5"], LevelFilter::WARN)]
    #[case(&["reconflow", "10.0.0.5", "-v"], LevelFilter::INFO)]
    #[case(&["reconflow", "10.0.0.5", "-d"], LevelFilter::DEBUG)]
    #[case(&["reconflow", "10.0.0.5", "-v", "-d"], LevelFilter::DEBUG)]
    fn test_level_follows_flags(#[case] argv: &[&str], #[case] expected: LevelFilter) {
        let cli = Cli::try_parse_from(argv).unwrap();
        let settings = LogSettings::from_cli(&cli);

        assert_eq!(settings.level, expected);
        assert_eq!(settings.show_targets, expected == LevelFilter::DEBUG);
    }

    #[test]
    fn test_env_directives_layer_over_cli_level() {
        let settings = LogSettings {
            level: LevelFilter::WARN,
            show_targets: false,
            color: false,
        };

        assert_eq!(settings.filter(None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(settings.filter(Some("reconflow=trace")).max_level_hint(), Some(LevelFilter::TRACE));
    }
}
