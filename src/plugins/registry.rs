use super::httpx_probe::HttpxProbe;
use super::nuclei_scan::NucleiScan;
use super::portscan_naabu::{NaabuPortScan, PortSelection};
use super::types::ToolPlugin;
use crate::core::budget::VulnScope;
use crate::core::models::Stage;
use crate::core::profile::ScanProfile;

/// Executables the pipeline may need, in stage order.
pub const TOOLS: [&str; 3] = ["naabu", "httpx", "nuclei"];

pub fn tool_for(stage: Stage) -> &'static str {
    match stage {
        Stage::PortScan => TOOLS[0],
        Stage::HttpProbe => TOOLS[1],
        Stage::VulnScan => TOOLS[2],
    }
}

/// One plugin per stage, configured for a single run.
pub struct PluginRegistry {
    port_scan: NaabuPortScan,
    http_probe: HttpxProbe,
    vuln_scan: NucleiScan,
}

impl PluginRegistry {
    pub fn new(profile: &ScanProfile, ports: PortSelection, vuln_scope: VulnScope) -> Self {
        Self {
            port_scan: NaabuPortScan {
                ports,
                technique: profile.scan_technique,
            },
            http_probe: HttpxProbe {
                fingerprinting: profile.fingerprinting,
            },
            vuln_scan: NucleiScan {
                scope: vuln_scope,
                interactsh: profile.interactsh,
            },
        }
    }

    pub fn plugin(&self, stage: Stage) -> &dyn ToolPlugin {
        match stage {
            Stage::PortScan => &self.port_scan,
            Stage::HttpProbe => &self.http_probe,
            Stage::VulnScan => &self.vuln_scan,
        }
    }

    /// Replace the vulnerability scope, e.g. after budget degradation.
    pub fn set_vuln_scope(&mut self, scope: VulnScope) {
        self.vuln_scan.scope = scope;
    }
}
