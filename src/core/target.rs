use super::errors::ReconError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[a-z0-9_]([a-z0-9_-]{0,61}[a-z0-9])?(\.[a-z0-9_]([a-z0-9_-]{0,61}[a-z0-9])?)*\.?$")
        .expect("domain pattern")
});

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(https?)://(\[[0-9a-f:.]+\]|[^/:?#\s\[\]]+)(:\d{1,5})?([/?#]\S*)?$")
        .expect("url pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Ip,
    Cidr,
    Domain,
    Url,
}

/// Validated scan target. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    raw: String,
    kind: TargetKind,
    host: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, ReconError> {
        let value = raw.trim();
        let invalid = |reason: &str| ReconError::InvalidTarget {
            target: raw.to_string(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("target is empty"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(invalid("target contains whitespace"));
        }

        if value.contains("://") {
            let caps = URL_RE
                .captures(value)
                .ok_or_else(|| invalid("not a valid http(s) URL"))?;
            let host = caps[2].trim_start_matches('[').trim_end_matches(']').to_string();
            if host.parse::<IpAddr>().is_err() && !is_domain(&host) {
                return Err(invalid("URL host is not a valid hostname or IP"));
            }
            if let Some(port) = caps.get(3) {
                let port: u32 = port.as_str()[1..].parse().map_err(|_| invalid("bad port"))?;
                if port == 0 || port > 65535 {
                    return Err(invalid("URL port out of range"));
                }
            }
            return Ok(Self {
                raw: value.to_string(),
                kind: TargetKind::Url,
                host,
            });
        }

        if let Some((addr, prefix)) = value.split_once('/') {
            let ip: IpAddr = addr.parse().map_err(|_| invalid("CIDR base is not an IP address"))?;
            let prefix: u8 = prefix.parse().map_err(|_| invalid("CIDR prefix is not a number"))?;
            let max = if ip.is_ipv4() { 32 } else { 128 };
            if prefix > max {
                return Err(invalid("CIDR prefix out of range"));
            }
            return Ok(Self {
                raw: value.to_string(),
                kind: TargetKind::Cidr,
                host: ip.to_string(),
            });
        }

        if let Ok(ip) = value.parse::<IpAddr>() {
            return Ok(Self {
                raw: value.to_string(),
                kind: TargetKind::Ip,
                host: ip.to_string(),
            });
        }

        if is_domain(value) {
            return Ok(Self {
                raw: value.to_string(),
                kind: TargetKind::Domain,
                host: value.trim_end_matches('.').to_ascii_lowercase(),
            });
        }

        Err(invalid("not an IP, CIDR, domain or URL"))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Host handed to the port scanner. CIDR ranges are passed through whole.
    pub fn scan_host(&self) -> &str {
        match self.kind {
            TargetKind::Cidr => &self.raw,
            _ => &self.host,
        }
    }

    /// Single host used when synthesizing fallback records, bracketed if IPv6.
    fn seed_authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    pub fn seed_host_port(&self, port: u16) -> String {
        format!("{}:{}", self.seed_authority(), port)
    }

    pub fn seed_urls(&self) -> [String; 2] {
        let host = self.seed_authority();
        [format!("http://{}", host), format!("https://{}", host)]
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_domain(value: &str) -> bool {
    value.len() <= 253 && DOMAIN_RE.is_match(value) && value.chars().any(|c| c.is_ascii_alphabetic())
}
