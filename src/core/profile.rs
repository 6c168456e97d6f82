use super::errors::ReconError;
use super::models::Stage;
use crate::config::types::StageDefaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for thread counts derived from host capability.
pub const MAX_AUTO_THREADS: u32 = 100;
const MIN_AUTO_THREADS: u32 = 10;
const LOW_MEMORY_MB: u64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Normal,
    Stealth,
    Auto,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Normal => "normal",
            ScanMode::Stealth => "stealth",
            ScanMode::Auto => "auto",
        }
    }
}

/// Tuning knobs for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageParams {
    pub rate_limit: u32,
    pub concurrency: u32,
    pub timeout_secs: u64,
    pub retries: u32,
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

impl StageParams {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn capped(&self, cap: &StageCap) -> Self {
        Self {
            rate_limit: self.rate_limit.min(cap.rate_limit),
            concurrency: self.concurrency.min(cap.concurrency),
            timeout_secs: self.timeout_secs.saturating_mul(2),
            retries: self.retries.min(cap.retries),
            extra_flags: self.extra_flags.clone(),
        }
    }

    fn validate(&self, stage: Stage) -> Result<(), ReconError> {
        if self.rate_limit == 0 {
            return Err(ReconError::config(format!("{} rate_limit must be greater than 0", stage)));
        }
        if self.concurrency == 0 {
            return Err(ReconError::config(format!("{} concurrency must be greater than 0", stage)));
        }
        if self.timeout_secs == 0 {
            return Err(ReconError::config(format!("{} timeout_secs must be greater than 0", stage)));
        }
        Ok(())
    }
}

struct StageCap {
    rate_limit: u32,
    concurrency: u32,
    retries: u32,
}

const STEALTH_PORT_SCAN: StageCap = StageCap { rate_limit: 100, concurrency: 10, retries: 1 };
const STEALTH_HTTP_PROBE: StageCap = StageCap { rate_limit: 10, concurrency: 5, retries: 1 };
const STEALTH_VULN_SCAN: StageCap = StageCap { rate_limit: 10, concurrency: 5, retries: 1 };

/// Port-stage probe technique. SYN needs raw sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanTechnique {
    Syn,
    Connect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCapabilities {
    pub cpu_count: usize,
    pub memory_mb: Option<u64>,
    pub privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProfile {
    pub mode: ScanMode,
    pub port_scan: StageParams,
    pub http_probe: StageParams,
    pub vuln_scan: StageParams,
    pub scan_technique: ScanTechnique,
    /// Title, tech and server probes during HTTP probing.
    pub fingerprinting: bool,
    /// Out-of-band callback detection during the vulnerability scan.
    pub interactsh: bool,
}

impl ScanProfile {
    pub fn params(&self, stage: Stage) -> &StageParams {
        match stage {
            Stage::PortScan => &self.port_scan,
            Stage::HttpProbe => &self.http_probe,
            Stage::VulnScan => &self.vuln_scan,
        }
    }
}

/// Turns a requested mode into concrete per-stage parameters. Pure: no I/O,
/// host capabilities are passed in.
pub struct ProfileResolver<'a> {
    defaults: &'a StageDefaults,
}

impl<'a> ProfileResolver<'a> {
    pub fn new(defaults: &'a StageDefaults) -> Self {
        Self { defaults }
    }

    pub fn resolve(
        &self,
        mode: ScanMode,
        capabilities: Option<&HostCapabilities>,
    ) -> Result<ScanProfile, ReconError> {
        for stage in Stage::ALL {
            self.defaults.params(stage).validate(stage)?;
        }

        let privileged = capabilities.map(|c| c.privileged).unwrap_or(false);
        let technique = if privileged { ScanTechnique::Syn } else { ScanTechnique::Connect };

        let profile = match mode {
            ScanMode::Normal => ScanProfile {
                mode,
                port_scan: self.defaults.port_scan.clone(),
                http_probe: self.defaults.http_probe.clone(),
                vuln_scan: self.defaults.vuln_scan.clone(),
                scan_technique: ScanTechnique::Connect,
                fingerprinting: true,
                interactsh: true,
            },
            ScanMode::Stealth => ScanProfile {
                mode,
                port_scan: self.defaults.port_scan.capped(&STEALTH_PORT_SCAN),
                http_probe: self.defaults.http_probe.capped(&STEALTH_HTTP_PROBE),
                vuln_scan: self.defaults.vuln_scan.capped(&STEALTH_VULN_SCAN),
                scan_technique: technique,
                fingerprinting: false,
                interactsh: false,
            },
            ScanMode::Auto => {
                let caps = capabilities.ok_or_else(|| {
                    ReconError::config("auto mode requires host capability information")
                })?;
                self.auto_profile(caps, technique)
            }
        };

        Ok(profile)
    }

    fn auto_profile(&self, caps: &HostCapabilities, technique: ScanTechnique) -> ScanProfile {
        let cpus = caps.cpu_count.max(1) as u32;
        let mut threads = cpus.saturating_mul(10).clamp(MIN_AUTO_THREADS, MAX_AUTO_THREADS);
        if caps.memory_mb.is_some_and(|mb| mb < LOW_MEMORY_MB) {
            threads = (threads / 2).max(5);
        }

        let port_rate = match technique {
            ScanTechnique::Syn => 2000,
            ScanTechnique::Connect => 1000,
        };

        ScanProfile {
            mode: ScanMode::Auto,
            port_scan: StageParams {
                rate_limit: port_rate,
                concurrency: (threads / 2).max(5),
                ..self.defaults.port_scan.clone()
            },
            http_probe: StageParams {
                rate_limit: (threads * 3).min(300),
                concurrency: threads,
                ..self.defaults.http_probe.clone()
            },
            vuln_scan: StageParams {
                rate_limit: (threads * 3 / 2).clamp(50, 300),
                concurrency: (threads / 4).max(5),
                ..self.defaults.vuln_scan.clone()
            },
            scan_technique: technique,
            fingerprinting: true,
            interactsh: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn caps(cpu_count: usize, memory_mb: Option<u64>, privileged: bool) -> HostCapabilities {
        HostCapabilities { cpu_count, memory_mb, privileged }
    }

    #[test]
    fn test_normal_profile_uses_defaults() {
        let defaults = StageDefaults::default();
        let profile = ProfileResolver::new(&defaults).resolve(ScanMode::Normal, None).unwrap();
        assert_eq!(profile.port_scan, defaults.port_scan);
        assert_eq!(profile.http_probe, defaults.http_probe);
        assert_eq!(profile.vuln_scan, defaults.vuln_scan);
        assert!(profile.fingerprinting);
        assert!(profile.interactsh);
    }

    #[test]
    fn test_stealth_never_exceeds_normal() {
        let defaults = StageDefaults::default();
        let resolver = ProfileResolver::new(&defaults);
        let normal = resolver.resolve(ScanMode::Normal, None).unwrap();
        let stealth = resolver.resolve(ScanMode::Stealth, None).unwrap();

        for stage in Stage::ALL {
            let (n, s) = (normal.params(stage), stealth.params(stage));
            assert!(s.rate_limit <= n.rate_limit, "{} rate", stage);
            assert!(s.concurrency <= n.concurrency, "{} concurrency", stage);
            assert!(s.retries <= n.retries, "{} retries", stage);
        }
        assert!(!stealth.fingerprinting);
        assert!(!stealth.interactsh);
    }

    #[test]
    fn test_stealth_respects_already_low_defaults() {
        let mut defaults = StageDefaults::default();
        defaults.http_probe.rate_limit = 3;
        defaults.http_probe.concurrency = 2;
        let stealth = ProfileResolver::new(&defaults).resolve(ScanMode::Stealth, None).unwrap();
        assert_eq!(stealth.http_probe.rate_limit, 3);
        assert_eq!(stealth.http_probe.concurrency, 2);
    }

    #[test]
    fn test_auto_scales_with_cpus_and_clamps() {
        let defaults = StageDefaults::default();
        let resolver = ProfileResolver::new(&defaults);

        let small = resolver.resolve(ScanMode::Auto, Some(&caps(2, Some(8192), false))).unwrap();
        assert_eq!(small.http_probe.concurrency, 20);
        assert_eq!(small.scan_technique, ScanTechnique::Connect);

        let huge = resolver.resolve(ScanMode::Auto, Some(&caps(256, Some(65536), true))).unwrap();
        assert_eq!(huge.http_probe.concurrency, MAX_AUTO_THREADS);
        assert_eq!(huge.scan_technique, ScanTechnique::Syn);
        assert_eq!(huge.port_scan.rate_limit, 2000);
    }

    #[test]
    fn test_auto_halves_threads_on_low_memory() {
        let defaults = StageDefaults::default();
        let profile = ProfileResolver::new(&defaults)
            .resolve(ScanMode::Auto, Some(&caps(4, Some(1024), false)))
            .unwrap();
        assert_eq!(profile.http_probe.concurrency, 20);
    }

    #[test]
    fn test_auto_without_capabilities_is_config_error() {
        let defaults = StageDefaults::default();
        let err = ProfileResolver::new(&defaults).resolve(ScanMode::Auto, None).unwrap_err();
        assert!(matches!(err, ReconError::Configuration(_)));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let defaults = StageDefaults::default();
        let resolver = ProfileResolver::new(&defaults);
        let c = caps(8, Some(16384), false);
        assert_eq!(
            resolver.resolve(ScanMode::Auto, Some(&c)).unwrap(),
            resolver.resolve(ScanMode::Auto, Some(&c)).unwrap()
        );
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut defaults = StageDefaults::default();
        defaults.vuln_scan.rate_limit = 0;
        let err = ProfileResolver::new(&defaults).resolve(ScanMode::Normal, None).unwrap_err();
        assert!(err.to_string().contains("vulnerabilities rate_limit"));
    }
}
