use super::context::ReportContext;
use super::writer::Renderer;
use crate::config::types::ReportFormat;
use anyhow::{Context, Result};
use minijinja::{Environment, Value};
use pulldown_cmark::{html, Event, Options, Parser};

const REPORT_TEMPLATE: &str = include_str!("../../report_templates/report.md.j2");

/// Make a value safe inside a Markdown table cell.
fn cell(value: Value) -> String {
    value
        .to_string()
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace(['\r', '\n'], " ")
}

pub fn render_markdown(ctx: &ReportContext<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_filter("cell", cell);
    env.add_template("report.md", REPORT_TEMPLATE)
        .context("Failed to load report template")?;

    let template = env.get_template("report.md")?;
    template.render(ctx).context("Failed to render Markdown report")
}

pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Markdown
    }

    fn file_name(&self) -> &'static str {
        "report.md"
    }

    fn render(&self, ctx: &ReportContext<'_>) -> Result<String> {
        render_markdown(ctx)
    }
}

/// The Markdown report converted to a standalone HTML page.
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn file_name(&self) -> &'static str {
        "report.html"
    }

    fn render(&self, ctx: &ReportContext<'_>) -> Result<String> {
        let markdown = render_markdown(ctx)?;
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        // Tool output can carry markup; never pass it through as raw HTML.
        let events = Parser::new_ext(&markdown, options).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
        let mut body = String::with_capacity(markdown.len() * 2);
        html::push_html(&mut body, events);

        Ok(format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Reconnaissance Report: {title}</title>
<style>
body {{ font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; max-width: 1100px; margin: 2rem auto; padding: 0 1rem; color: #1f2328; }}
table {{ border-collapse: collapse; margin: 1rem 0; width: 100%; }}
th, td {{ border: 1px solid #d0d7de; padding: 6px 10px; text-align: left; }}
th {{ background: #f6f8fa; }}
code {{ background: #f6f8fa; padding: 1px 4px; border-radius: 4px; }}
</style>
</head>
<body>
{body}</body>
</html>
"#,
            title = escape_html(ctx.target),
            body = body
        ))
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
