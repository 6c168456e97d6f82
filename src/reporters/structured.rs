use super::context::ReportContext;
use super::writer::Renderer;
use crate::config::types::ReportFormat;
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::json;
use std::io::Cursor;

pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn file_name(&self) -> &'static str {
        "report.json"
    }

    fn render(&self, ctx: &ReportContext<'_>) -> Result<String> {
        serde_json::to_string_pretty(&json_report(ctx)).context("Failed to serialize JSON report")
    }
}

/// Machine-readable report; also what `--json-output` prints.
pub fn json_report(ctx: &ReportContext<'_>) -> serde_json::Value {
    json!({
        "target": ctx.target,
        "run_id": ctx.run_id,
        "status": ctx.status,
        "mode": ctx.mode,
        "started_at": ctx.started_at,
        "finished_at": ctx.finished_at,
        "generated_at": ctx.generated_at,
        "risk": {
            "score": ctx.risk.score,
            "level": ctx.risk.level,
            "remediation": ctx.risk.remediation,
        },
        "analytics": ctx.analytics,
        "stages": ctx.stages,
        "degraded_stages": ctx.degraded,
        "findings": ctx.findings,
        "services": ctx.services,
        "ports": ctx.ports,
        "notes": ctx.notes,
    })
}

pub struct CsvRenderer;

const CSV_HEADER: [&str; 7] = ["severity", "name", "template_id", "matched_url", "cve_id", "tags", "description"];

impl Renderer for CsvRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Csv
    }

    fn file_name(&self) -> &'static str {
        "findings.csv"
    }

    fn render(&self, ctx: &ReportContext<'_>) -> Result<String> {
        let mut out = String::new();
        out.push_str(&CSV_HEADER.join(","));
        out.push('\n');

        for f in &ctx.findings {
            let tags = f.tags.join(";");
            let row = [
                f.severity.name(),
                f.name.as_str(),
                f.template_id.as_str(),
                f.matched_url.as_str(),
                f.cve_id.as_deref().unwrap_or(""),
                tags.as_str(),
                f.description.as_str(),
            ];
            let escaped: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
            out.push_str(&escaped.join(","));
            out.push('\n');
        }
        Ok(out)
    }
}

/// RFC 4180 quoting.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

pub struct XmlRenderer;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

impl Renderer for XmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xml
    }

    fn file_name(&self) -> &'static str {
        "report.xml"
    }

    fn render(&self, ctx: &ReportContext<'_>) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        start(
            &mut writer,
            "report",
            &[
                ("target", printable(ctx.target)),
                ("run_id", printable(ctx.run_id)),
                ("status", ctx.status.to_string()),
                ("mode", ctx.mode.to_string()),
                ("generated_at", ctx.generated_at.clone()),
            ],
        )?;
        empty(
            &mut writer,
            "risk",
            &[("score", ctx.score_display.clone()), ("level", ctx.risk.level.to_string())],
        )?;

        let a = ctx.analytics;
        start(
            &mut writer,
            "analytics",
            &[
                ("total_vulnerabilities", a.total_vulnerabilities.to_string()),
                ("cve_count", a.cve_count.to_string()),
                ("unique_templates", a.unique_templates.to_string()),
                ("affected_services", a.affected_services.to_string()),
                ("open_ports", a.total_open_ports.to_string()),
                ("http_services", a.total_http_services.to_string()),
            ],
        )?;
        for row in &ctx.severity_rows {
            empty(
                &mut writer,
                "severity",
                &[("name", row.name.to_lowercase()), ("count", row.count.to_string())],
            )?;
        }
        end(&mut writer, "analytics")?;

        start(&mut writer, "stages", &[])?;
        for s in &ctx.stages {
            empty(
                &mut writer,
                "stage",
                &[
                    ("name", s.name.to_string()),
                    ("status", s.status.to_string()),
                    ("records", s.records.to_string()),
                    ("attempts", s.attempts.to_string()),
                ],
            )?;
        }
        end(&mut writer, "stages")?;

        start(&mut writer, "findings", &[])?;
        for f in &ctx.findings {
            start(
                &mut writer,
                "finding",
                &[
                    ("severity", f.severity.name().to_string()),
                    ("template_id", printable(&f.template_id)),
                ],
            )?;
            text(&mut writer, "name", &f.name)?;
            text(&mut writer, "matched_url", &f.matched_url)?;
            if let Some(cve) = &f.cve_id {
                text(&mut writer, "cve_id", cve)?;
            }
            text(&mut writer, "description", &f.description)?;
            end(&mut writer, "finding")?;
        }
        end(&mut writer, "findings")?;

        start(&mut writer, "services", &[])?;
        for s in ctx.services {
            let status = s.status_code.map(|c| c.to_string()).unwrap_or_default();
            empty(&mut writer, "service", &[("url", printable(&s.url)), ("status", status)])?;
        }
        end(&mut writer, "services")?;

        start(&mut writer, "ports", &[])?;
        for p in ctx.ports {
            empty(
                &mut writer,
                "port",
                &[
                    ("host", printable(&p.host)),
                    ("port", p.port.to_string()),
                    ("protocol", printable(&p.protocol)),
                ],
            )?;
        }
        end(&mut writer, "ports")?;
        end(&mut writer, "report")?;

        let mut xml = String::from_utf8(writer.into_inner().into_inner()).context("XML report is not valid UTF-8")?;
        xml.push('\n');
        Ok(xml)
    }
}

fn start(writer: &mut XmlWriter, name: &str, attrs: &[(&str, String)]) -> Result<()> {
    let element = BytesStart::new(name).with_attributes(attrs.iter().map(|(k, v)| (*k, v.as_str())));
    writer.write_event(Event::Start(element))?;
    Ok(())
}

fn empty(writer: &mut XmlWriter, name: &str, attrs: &[(&str, String)]) -> Result<()> {
    let element = BytesStart::new(name).with_attributes(attrs.iter().map(|(k, v)| (*k, v.as_str())));
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text(writer: &mut XmlWriter, name: &str, content: &str) -> Result<()> {
    start(writer, name, &[])?;
    writer.write_event(Event::Text(BytesText::new(&printable(content))))?;
    end(writer, name)
}

/// XML 1.0 has no representation for most control characters; drop them.
fn printable(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}
