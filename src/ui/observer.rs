use super::progress::ProgressManager;
use crate::core::models::Stage;
use colored::Colorize;
use regex::Regex;
use std::sync::LazyLock;

static SEVERITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(critical|high|medium|low)\b").expect("severity pattern"));
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\[err\]|\[ftl\]|\berror\b|\bfatal\b)").expect("error pattern"));
static WARNING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\[wrn\]|\bwarn(ing)?\b)").expect("warning pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives every line a stage's tool prints, as it arrives. Purely for
/// presentation: nothing in the pipeline depends on what an observer does.
pub trait LineObserver: Send + Sync {
    fn on_line(&self, stage: Stage, stream: OutputStream, line: &str);
}

pub struct NullObserver;

impl LineObserver for NullObserver {
    fn on_line(&self, _stage: Stage, _stream: OutputStream, _line: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Critical,
    High,
    Medium,
    Low,
    Error,
    Warning,
    Plain,
}

pub fn classify(line: &str) -> LineClass {
    if ERROR_RE.is_match(line) {
        return LineClass::Error;
    }
    if WARNING_RE.is_match(line) {
        return LineClass::Warning;
    }
    match SEVERITY_RE
        .captures(line)
        .map(|c| c[1].to_ascii_lowercase())
        .as_deref()
    {
        Some("critical") => LineClass::Critical,
        Some("high") => LineClass::High,
        Some("medium") => LineClass::Medium,
        Some("low") => LineClass::Low,
        _ => LineClass::Plain,
    }
}

/// Streams tool output to the terminal, colouring lines by keyword. Plain
/// lines are only shown in verbose mode.
pub struct ConsoleObserver {
    progress: ProgressManager,
    show_plain: bool,
}

impl ConsoleObserver {
    pub fn new(progress: ProgressManager, show_plain: bool) -> Self {
        Self { progress, show_plain }
    }
}

impl LineObserver for ConsoleObserver {
    fn on_line(&self, stage: Stage, _stream: OutputStream, line: &str) {
        let class = classify(line);
        if class == LineClass::Plain && !self.show_plain {
            return;
        }

        let styled = match class {
            LineClass::Critical => line.bright_red().bold(),
            LineClass::High => line.red(),
            LineClass::Medium => line.yellow(),
            LineClass::Low => line.cyan(),
            LineClass::Error => line.bright_red(),
            LineClass::Warning => line.bright_yellow(),
            LineClass::Plain => line.normal(),
        };
        let prefix = format!("[{}]", stage.as_str());
        self.progress.println(&format!("{} {}", prefix.dimmed(), styled));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("[CVE-2021-44228] [http] [critical] https://example.com", LineClass::Critical)]
    #[case(r#"{"info":{"severity":"high"}}"#, LineClass::High)]
    #[case("[tech-detect] [http] [info] https://example.com [nginx]", LineClass::Plain)]
    #[case("[WRN] Could not read template", LineClass::Warning)]
    #[case("[ERR] connection refused", LineClass::Error)]
    #[case("example.com:443", LineClass::Plain)]
    #[case("highlight.js detected", LineClass::Plain)]
    fn test_classify(#[case] line: &str, #[case] expected: LineClass) {
        assert_eq!(classify(line), expected);
    }
}
