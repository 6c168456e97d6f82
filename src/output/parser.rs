use crate::core::models::{
    FindingRecord, PortRecord, ServiceRecord, Severity, SeverityCounts, Stage, StageRecords,
};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// One stage's raw file turned into records, plus what was thrown away.
#[derive(Debug, Clone)]
pub struct ParsedStage {
    pub records: StageRecords,
    pub skipped: usize,
    pub counts: SeverityCounts,
}

/// Parse raw stage output. Accepts a single JSON array, JSON-Lines, or the
/// plain-text fallback shapes (`host:port` lines, one URL per line). Bad lines
/// are logged and skipped; this never fails.
pub fn normalize(stage: Stage, content: &str) -> ParsedStage {
    match stage {
        Stage::PortScan => {
            let (records, skipped) = parse_records(stage, content, port_from_json, port_from_text);
            ParsedStage {
                records: StageRecords::Ports(records),
                skipped,
                counts: SeverityCounts::default(),
            }
        }
        Stage::HttpProbe => {
            let (records, skipped) =
                parse_records(stage, content, service_from_json, service_from_text);
            ParsedStage {
                records: StageRecords::Services(records),
                skipped,
                counts: SeverityCounts::default(),
            }
        }
        Stage::VulnScan => {
            let (records, skipped) = parse_records(stage, content, finding_from_json, |_| None);
            let mut counts = SeverityCounts::default();
            for finding in &records {
                counts.increment(finding.severity);
            }
            ParsedStage {
                records: StageRecords::Findings(records),
                skipped,
                counts,
            }
        }
    }
}

/// Read and normalize a stage file. Invalid UTF-8 is replaced rather than rejected.
pub fn normalize_file(stage: Stage, path: &Path) -> std::io::Result<ParsedStage> {
    let bytes = std::fs::read(path)?;
    Ok(normalize(stage, &String::from_utf8_lossy(&bytes)))
}

fn parse_records<T>(
    stage: Stage,
    content: &str,
    from_json: fn(&Value) -> Option<T>,
    from_text: fn(&str) -> Option<T>,
) -> (Vec<T>, usize) {
    let trimmed = content.trim();
    let mut records = Vec::new();
    let mut skipped = 0;

    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        match serde_json::from_str::<Vec<Value>>(trimmed) {
            Ok(values) => {
                for (idx, value) in values.iter().enumerate() {
                    match from_json(value) {
                        Some(record) => records.push(record),
                        None => {
                            warn!("{}: array element {} lacks required fields, skipping", stage, idx + 1);
                            skipped += 1;
                        }
                    }
                }
                return (records, skipped);
            }
            Err(e) => {
                warn!("{}: output looks like a JSON array but failed to parse ({}), reading line by line", stage, e);
            }
        }
    }

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = if line.starts_with('{') {
            match serde_json::from_str::<Value>(line) {
                Ok(value) => from_json(&value),
                Err(e) => {
                    warn!("{}: line {} is not valid JSON ({}), skipping", stage, idx + 1, e);
                    skipped += 1;
                    continue;
                }
            }
        } else {
            from_text(line)
        };

        match parsed {
            Some(record) => records.push(record),
            None => {
                warn!("{}: line {} not recognised, skipping", stage, idx + 1);
                debug!("{}: unrecognised line content: {}", stage, line);
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn number_field(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| {
        let v = value.get(*k)?;
        v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn valid_port(port: u64) -> Option<u16> {
    u16::try_from(port).ok().filter(|p| *p > 0)
}

fn port_from_json(value: &Value) -> Option<PortRecord> {
    let host = str_field(value, &["host", "ip"])?;
    let port = number_field(value, &["port"])
        .or_else(|| value.get("port").and_then(|p| number_field(p, &["Port"])))
        .and_then(valid_port)?;
    let protocol = str_field(value, &["protocol"]).unwrap_or("tcp").to_ascii_lowercase();

    Some(PortRecord {
        host: host.to_string(),
        port,
        protocol,
    })
}

fn port_from_text(line: &str) -> Option<PortRecord> {
    let (host, port) = line.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || host.contains('/') {
        return None;
    }
    let port = port.trim().parse::<u64>().ok().and_then(valid_port)?;
    Some(PortRecord {
        host: host.to_string(),
        port,
        protocol: "tcp".to_string(),
    })
}

fn service_from_json(value: &Value) -> Option<ServiceRecord> {
    let url = str_field(value, &["url"])?;
    let status_code = number_field(value, &["status_code", "status-code"])
        .and_then(|c| u16::try_from(c).ok());
    let mut tech = string_list(value.get("tech"));
    if tech.is_empty() {
        tech = string_list(value.get("technologies"));
    }

    Some(ServiceRecord {
        url: url.to_string(),
        status_code,
        title: str_field(value, &["title"]).map(String::from),
        tech,
        server: str_field(value, &["webserver", "server"]).map(String::from),
    })
}

fn service_from_text(line: &str) -> Option<ServiceRecord> {
    let url = line.split_whitespace().next()?;
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(ServiceRecord::bare(url))
    } else {
        None
    }
}

fn finding_from_json(value: &Value) -> Option<FindingRecord> {
    let empty = Value::Null;
    let info = value.get("info").unwrap_or(&empty);
    let template_id = str_field(value, &["template-id", "templateID", "template_id"]);
    let name = str_field(info, &["name"]).or(template_id)?;

    let severity = str_field(info, &["severity"])
        .map(Severity::parse_lenient)
        .unwrap_or(Severity::Info);

    let classification = info.get("classification").unwrap_or(&empty);
    let cve_id = string_list(classification.get("cve-id"))
        .into_iter()
        .next()
        .map(|c| c.to_ascii_uppercase());

    let mut tags = string_list(info.get("tags"));
    if tags.is_empty() {
        tags = string_list(classification.get("tags"));
    }

    Some(FindingRecord {
        name: name.to_string(),
        severity,
        template_id: template_id.unwrap_or(name).to_string(),
        matched_url: str_field(value, &["matched-at", "matched", "host", "url"])
            .unwrap_or_default()
            .to_string(),
        description: str_field(info, &["description"]).unwrap_or_default().to_string(),
        cve_id,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn ports(parsed: ParsedStage) -> Vec<PortRecord> {
        match parsed.records {
            StageRecords::Ports(r) => r,
            other => panic!("expected ports, got {:?}", other),
        }
    }

    fn services(parsed: ParsedStage) -> Vec<ServiceRecord> {
        match parsed.records {
            StageRecords::Services(r) => r,
            other => panic!("expected services, got {:?}", other),
        }
    }

    fn findings(parsed: &ParsedStage) -> &[FindingRecord] {
        match &parsed.records {
            StageRecords::Findings(r) => r,
            other => panic!("expected findings, got {:?}", other),
        }
    }

    const NUCLEI_LINE: &str = r#"{"template-id":"CVE-2021-44228","info":{"name":"Log4j RCE","severity":"CRITICAL","description":"JNDI lookup","classification":{"cve-id":["cve-2021-44228"]},"tags":["cve","rce"]},"matched-at":"https://example.com/api"}"#;

    #[test]
    fn test_json_lines_ports_in_file_order() {
        let content = "{\"host\":\"example.com\",\"port\":443,\"protocol\":\"tcp\"}\n\
                       {\"host\":\"example.com\",\"ip\":\"93.184.216.34\",\"port\":80}\n";
        let records = ports(normalize(Stage::PortScan, content));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].port, 443);
        assert_eq!(records[1].port, 80);
        assert_eq!(records[1].protocol, "tcp");
    }

    #[test]
    fn test_json_array_ports() {
        let content = r#"[{"host":"10.0.0.5","port":22},{"host":"10.0.0.5","port":"8080","protocol":"TCP"}]"#;
        let records = ports(normalize(Stage::PortScan, content));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].port, 8080);
        assert_eq!(records[1].protocol, "tcp");
    }

    #[test]
    fn test_plain_text_port_fallback() {
        let records = ports(normalize(Stage::PortScan, "example.com:80\nexample.com:443\n[::1]:22\n"));
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].host, "::1");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let content = "{\"host\":\"a\",\"port\":1}\nWARNING: rate limited\n{\"host\":\"a\",\"port\":\n{\"host\":\"a\",\"port\":70000}\n{\"host\":\"a\",\"port\":2}\n";
        let parsed = normalize(Stage::PortScan, content);
        assert_eq!(parsed.skipped, 3);
        assert_eq!(ports(parsed).len(), 2);
    }

    #[test]
    fn test_broken_array_falls_back_to_lines() {
        let parsed = normalize(Stage::PortScan, "[{\"host\":\"a\",\"port\":1},]");
        assert_eq!(parsed.records.len(), 0);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_httpx_service_fields() {
        let content = r#"{"url":"https://example.com","status_code":200,"title":"Example","tech":["Nginx","PHP"],"webserver":"nginx/1.18"}
{"url":"http://example.com:8080","status-code":"301","technologies":"Apache, Tomcat"}
https://example.com:8443 [403] [Forbidden]"#;
        let records = services(normalize(Stage::HttpProbe, content));
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].status_code, Some(200));
        assert_eq!(records[0].server.as_deref(), Some("nginx/1.18"));
        assert_eq!(records[1].status_code, Some(301));
        assert_eq!(records[1].tech, vec!["Apache", "Tomcat"]);
        assert_eq!(records[2], ServiceRecord::bare("https://example.com:8443"));
    }

    #[test]
    fn test_nuclei_finding_fields() {
        let parsed = normalize(Stage::VulnScan, NUCLEI_LINE);
        let finding = &findings(&parsed)[0];
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.template_id, "CVE-2021-44228");
        assert_eq!(finding.matched_url, "https://example.com/api");
        assert_eq!(finding.cve_id.as_deref(), Some("CVE-2021-44228"));
        assert_eq!(finding.tags, vec!["cve", "rce"]);
        assert_eq!(parsed.counts.critical, 1);
    }

    #[test]
    fn test_unknown_or_missing_severity_counts_as_info() {
        let content = r#"{"template-id":"a","info":{"name":"A","severity":"urgent"}}
{"template-id":"b","info":{"name":"B"}}
{"template-id":"c"}"#;
        let parsed = normalize(Stage::VulnScan, content);
        assert_eq!(findings(&parsed).len(), 3);
        assert_eq!(parsed.counts.info, 3);
        assert_eq!(findings(&parsed)[2].name, "c");
    }

    #[test]
    fn test_empty_array_is_valid_empty_result() {
        let parsed = normalize(Stage::VulnScan, "[]\n");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_normalize_missing_file_is_error() {
        assert!(normalize_file(Stage::PortScan, Path::new("/nonexistent/ports.json")).is_err());
    }

    proptest! {
        #[test]
        fn prop_garbage_line_never_changes_count(
            n in 0usize..20,
            garbage in "[a-zA-Z !#=:,.\\-]{1,40}",
        ) {
            let valid: String = (0..n)
                .map(|i| format!("{{\"host\":\"h{}\",\"port\":{}}}\n", i, i + 1))
                .collect();
            let baseline = normalize(Stage::PortScan, &valid).records.len();
            let noisy = format!("{}{}\n", valid, garbage);
            prop_assert_eq!(normalize(Stage::PortScan, &noisy).records.len(), baseline);
        }

        #[test]
        fn prop_truncated_json_is_skipped(n in 1usize..10, cut in 1usize..20) {
            let mut content = String::new();
            for i in 0..n {
                content.push_str(&format!("{}\n", NUCLEI_LINE.replace("CVE-2021-44228", &format!("t{}", i))));
            }
            let broken = &NUCLEI_LINE[..NUCLEI_LINE.len().saturating_sub(cut)];
            content.push_str(broken);
            let parsed = normalize(Stage::VulnScan, &content);
            prop_assert_eq!(parsed.records.len(), n);
            prop_assert_eq!(parsed.counts.total(), n);
        }
    }
}
