use crate::core::models::{FindingRecord, PortRecord, ServiceRecord, Severity, SeverityCounts};
use crate::core::state::ScanResults;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const MAX_SCORE: f64 = 10.0;
/// Added per open port and per HTTP service.
pub const EXPOSURE_WEIGHT: f64 = 0.1;
/// Added per finding that carries a CVE identifier.
pub const CVE_WEIGHT: f64 = 0.5;
const MAX_REMEDIATIONS: usize = 10;

pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 4.0,
        Severity::High => 3.0,
        Severity::Medium => 2.0,
        Severity::Low => 1.0,
        Severity::Info => 0.0,
    }
}

/// Aggregates derived from the normalized records and the normalizer's
/// severity tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub counts: SeverityCounts,
    pub total_vulnerabilities: usize,
    pub cve_count: usize,
    pub unique_templates: usize,
    pub affected_services: usize,
    pub total_open_ports: usize,
    pub total_http_services: usize,
}

impl Analytics {
    pub fn from_results(results: &ScanResults) -> Self {
        Self::compute(results.severity_counts, &results.ports, &results.services, &results.findings)
    }

    pub fn compute(
        counts: SeverityCounts,
        ports: &[PortRecord],
        services: &[ServiceRecord],
        findings: &[FindingRecord],
    ) -> Self {
        let unique = |keys: Vec<&str>| keys.into_iter().collect::<HashSet<_>>().len();
        let open_ports: HashSet<(&str, u16, &str)> = ports
            .iter()
            .map(|p| (p.host.as_str(), p.port, p.protocol.as_str()))
            .collect();

        Self {
            total_vulnerabilities: counts.total(),
            counts,
            cve_count: findings.iter().filter(|f| f.cve_id.is_some()).count(),
            unique_templates: unique(findings.iter().map(|f| f.template_id.as_str()).collect()),
            affected_services: unique(findings.iter().map(|f| f.matched_url.as_str()).collect()),
            total_open_ports: open_ports.len(),
            total_http_services: unique(services.iter().map(|s| s.url.as_str()).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s <= 0.0 => RiskLevel::None,
            s if s < 4.0 => RiskLevel::Low,
            s if s < 7.0 => RiskLevel::Medium,
            s if s < 9.0 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "NONE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub remediation: Vec<String>,
}

impl RiskAssessment {
    pub fn from_analytics(analytics: &Analytics) -> Self {
        let score = risk_score(analytics);
        Self {
            score,
            level: RiskLevel::from_score(score),
            remediation: remediation_plan(analytics),
        }
    }
}

/// Severity-weighted base plus exposure and CVE adjustments, clamped to
/// `[0, 10]` and rounded to one decimal. The weights are fixed policy.
pub fn risk_score(analytics: &Analytics) -> f64 {
    let base: f64 = Severity::DESCENDING
        .iter()
        .map(|s| analytics.counts.get(*s) as f64 * severity_weight(*s))
        .sum();
    let exposure = EXPOSURE_WEIGHT * (analytics.total_open_ports + analytics.total_http_services) as f64;
    let cve = CVE_WEIGHT * analytics.cve_count as f64;

    let clamped = (base + exposure + cve).clamp(0.0, MAX_SCORE);
    (clamped * 10.0).round() / 10.0
}

/// Rule precedence decides the order, never magnitude.
pub fn remediation_plan(analytics: &Analytics) -> Vec<String> {
    let counts = &analytics.counts;
    let mut plan = Vec::new();

    if counts.critical > 0 {
        plan.push(format!(
            "Fix {} critical finding(s) immediately",
            counts.critical
        ));
    }
    if counts.high > 0 {
        plan.push(format!(
            "Fix {} high severity finding(s) within 24-48 hours",
            counts.high
        ));
    }
    if analytics.total_http_services > 10 {
        plan.push(format!(
            "Reduce exposure: {} HTTP services are reachable, restrict or retire the ones not needed",
            analytics.total_http_services
        ));
    }
    if analytics.total_open_ports > 20 {
        plan.push(format!(
            "Close unused ports: {} open ports detected",
            analytics.total_open_ports
        ));
    }
    if analytics.cve_count > 0 {
        plan.push(format!(
            "Patch affected software: {} finding(s) reference known CVEs",
            analytics.cve_count
        ));
    }
    if counts.medium > 5 {
        plan.push(format!(
            "Plan remediation for {} medium severity findings",
            counts.medium
        ));
    }
    plan.push("Apply a hardening baseline: security headers, TLS configuration, default credentials".to_string());
    plan.push("Set up continuous monitoring and recurring scans".to_string());

    plan.truncate(MAX_REMEDIATIONS);
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn finding(severity: Severity, template: &str, url: &str, cve: Option<&str>) -> FindingRecord {
        FindingRecord {
            name: template.to_string(),
            severity,
            template_id: template.to_string(),
            matched_url: url.to_string(),
            description: String::new(),
            cve_id: cve.map(String::from),
            tags: Vec::new(),
        }
    }

    fn analytics_of(ports: &[PortRecord], services: &[ServiceRecord], findings: &[FindingRecord]) -> Analytics {
        let mut counts = SeverityCounts::default();
        for f in findings {
            counts.increment(f.severity);
        }
        Analytics::compute(counts, ports, services, findings)
    }

    fn port(host: &str, port: u16) -> PortRecord {
        PortRecord {
            host: host.to_string(),
            port,
            protocol: "tcp".to_string(),
        }
    }

    #[test]
    fn test_empty_run_scores_zero() {
        let analytics = analytics_of(&[], &[], &[]);
        let risk = RiskAssessment::from_analytics(&analytics);

        assert_eq!(risk.score, 0.0);
        assert_eq!(risk.level, RiskLevel::None);
        assert_eq!(risk.remediation.len(), 2);
    }

    #[test]
    fn test_score_formula() {
        let ports = vec![port("example.com", 80), port("example.com", 443), port("example.com", 443)];
        let services = vec![ServiceRecord::bare("https://example.com")];
        let findings = vec![
            finding(Severity::High, "cve-2021-41773", "https://example.com", Some("CVE-2021-41773")),
            finding(Severity::Low, "missing-hsts", "https://example.com", None),
            finding(Severity::Info, "tech-detect", "https://example.com", None),
        ];

        let analytics = analytics_of(&ports, &services, &findings);
        assert_eq!(analytics.total_open_ports, 2);
        assert_eq!(analytics.total_http_services, 1);
        assert_eq!(analytics.cve_count, 1);
        assert_eq!(analytics.unique_templates, 3);
        assert_eq!(analytics.affected_services, 1);

        // 3 + 1 + 0.1 * 3 + 0.5
        assert_eq!(risk_score(&analytics), 4.8);
        assert_eq!(RiskLevel::from_score(4.8), RiskLevel::Medium);
    }

    #[test]
    fn test_score_clamps_at_ceiling() {
        let findings: Vec<_> = (0..5)
            .map(|i| finding(Severity::Critical, &format!("t{i}"), "https://x", None))
            .collect();
        let analytics = analytics_of(&[], &[], &findings);
        assert_eq!(risk_score(&analytics), 10.0);
        assert_eq!(RiskLevel::from_score(10.0), RiskLevel::Critical);
    }

    #[test]
    fn test_remediation_follows_rule_order() {
        let analytics = Analytics {
            counts: SeverityCounts {
                critical: 1,
                high: 0,
                medium: 6,
                low: 0,
                info: 0,
            },
            total_vulnerabilities: 7,
            cve_count: 2,
            unique_templates: 7,
            affected_services: 3,
            total_open_ports: 25,
            total_http_services: 3,
        };

        let plan = remediation_plan(&analytics);
        assert_eq!(plan.len(), 6);
        assert!(plan[0].contains("critical"));
        assert!(plan[1].starts_with("Close unused ports"));
        assert!(plan[2].starts_with("Patch"));
        assert!(plan[3].contains("medium"));
        assert!(plan[4].starts_with("Apply a hardening baseline"));
        assert!(plan[5].starts_with("Set up continuous monitoring"));
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Critical),
            Just(Severity::High),
            Just(Severity::Medium),
            Just(Severity::Low),
            Just(Severity::Info),
        ]
    }

    fn finding_strategy() -> impl Strategy<Value = FindingRecord> {
        (severity_strategy(), "[a-z]{1,6}", "[a-z]{1,6}", proptest::option::of("CVE-20[0-9]{2}-[0-9]{4}"))
            .prop_map(|(severity, template, host, cve)| {
                finding(severity, &template, &format!("https://{host}"), cve.as_deref())
            })
    }

    proptest! {
        #[test]
        fn prop_severity_counts_conserved(findings in proptest::collection::vec(finding_strategy(), 0..40)) {
            let analytics = analytics_of(&[], &[], &findings);
            let summed: usize = Severity::DESCENDING.iter().map(|s| analytics.counts.get(*s)).sum();
            prop_assert_eq!(summed, analytics.total_vulnerabilities);
            prop_assert_eq!(analytics.total_vulnerabilities, findings.len());
        }

        #[test]
        fn prop_score_bounded(
            findings in proptest::collection::vec(finding_strategy(), 0..60),
            open_ports in 0u16..500,
        ) {
            let ports: Vec<_> = (1..=open_ports).map(|p| port("10.0.0.1", p)).collect();
            let score = risk_score(&analytics_of(&ports, &[], &findings));
            prop_assert!((0.0..=MAX_SCORE).contains(&score));
        }

        #[test]
        fn prop_adding_finding_never_lowers_score(
            findings in proptest::collection::vec(finding_strategy(), 0..20),
            extra in finding_strategy(),
            open_ports in 0u16..30,
        ) {
            let ports: Vec<_> = (1..=open_ports).map(|p| port("10.0.0.1", p)).collect();
            let before = risk_score(&analytics_of(&ports, &[], &findings));
            let mut more = findings.clone();
            more.push(extra);
            let after = risk_score(&analytics_of(&ports, &[], &more));
            prop_assert!(after >= before);
        }
    }
}
