use super::types::{path_arg, StageInput, ToolPlugin};
use crate::core::models::Stage;
use crate::core::profile::{ScanTechnique, StageParams};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which ports the port stage probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelection {
    /// naabu only ships the 100 and 1000 lists.
    Top(u16),
    Full,
    /// Comma separated ports and ranges, e.g. `22,80,8000-8100`.
    List(String),
}

impl Default for PortSelection {
    fn default() -> Self {
        PortSelection::Top(1000)
    }
}

impl FromStr for PortSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "top-100" => return Ok(PortSelection::Top(100)),
            "top-1000" => return Ok(PortSelection::Top(1000)),
            "full" | "-" | "1-65535" => return Ok(PortSelection::Full),
            "" => return Err("port selection cannot be empty".to_string()),
            _ => {}
        }

        for part in s.split(',') {
            let part = part.trim();
            match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_port(start)?;
                    let end = parse_port(end)?;
                    if start > end {
                        return Err(format!("invalid port range '{}': start exceeds end", part));
                    }
                }
                None => {
                    parse_port(part)?;
                }
            }
        }
        Ok(PortSelection::List(s.split(',').map(str::trim).collect::<Vec<_>>().join(",")))
    }
}

fn parse_port(raw: &str) -> Result<u16, String> {
    let raw = raw.trim();
    match raw.parse::<u16>() {
        Ok(0) => Err("port 0 is not scannable".to_string()),
        Ok(port) => Ok(port),
        Err(_) => Err(format!(
            "invalid port '{}': expected top-100, top-1000, full or a list like 22,80,8000-8100",
            raw
        )),
    }
}

impl fmt::Display for PortSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelection::Top(n) => write!(f, "top-{}", n),
            PortSelection::Full => f.write_str("full"),
            PortSelection::List(list) => f.write_str(list),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NaabuPortScan {
    pub ports: PortSelection,
    pub technique: ScanTechnique,
}

impl ToolPlugin for NaabuPortScan {
    fn stage(&self) -> Stage {
        Stage::PortScan
    }

    fn tool(&self) -> &'static str {
        "naabu"
    }

    fn build_args(&self, input: &StageInput, output: &Path, params: &StageParams) -> Vec<String> {
        let mut args = match input {
            StageInput::Target(host) => vec!["-host".to_string(), host.clone()],
            StageInput::List(path) => vec!["-list".to_string(), path_arg(path)],
        };

        args.extend([
            "-json".to_string(),
            "-o".to_string(),
            path_arg(output),
            "-silent".to_string(),
            "-rate".to_string(),
            params.rate_limit.to_string(),
            "-c".to_string(),
            params.concurrency.to_string(),
            "-retries".to_string(),
            params.retries.to_string(),
            "-scan-type".to_string(),
            match self.technique {
                ScanTechnique::Syn => "s",
                ScanTechnique::Connect => "c",
            }
            .to_string(),
        ]);

        match &self.ports {
            PortSelection::Top(n) => args.extend(["-top-ports".to_string(), n.to_string()]),
            PortSelection::Full => args.extend(["-p".to_string(), "-".to_string()]),
            PortSelection::List(list) => args.extend(["-p".to_string(), list.clone()]),
        }

        args.extend(params.extra_flags.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn params() -> StageParams {
        StageParams {
            rate_limit: 1000,
            concurrency: 25,
            timeout_secs: 600,
            retries: 2,
            extra_flags: vec!["-exclude-cdn".to_string()],
        }
    }

    #[rstest]
    #[case("top-100", PortSelection::Top(100))]
    #[case("TOP-1000", PortSelection::Top(1000))]
    #[case("full", PortSelection::Full)]
    #[case("22, 80,8000-8100", PortSelection::List("22,80,8000-8100".to_string()))]
    fn test_port_selection_parses(#[case] raw: &str, #[case] expected: PortSelection) {
        assert_eq!(raw.parse::<PortSelection>().unwrap(), expected);
    }

    #[rstest]
    #[case("top-50")]
    #[case("70000")]
    #[case("0")]
    #[case("443-80")]
    #[case("80,,443")]
    #[case("")]
    fn test_port_selection_rejects(#[case] raw: &str) {
        assert!(raw.parse::<PortSelection>().is_err());
    }

    #[test]
    fn test_args_for_single_host() {
        let plugin = NaabuPortScan {
            ports: PortSelection::Top(100),
            technique: ScanTechnique::Connect,
        };
        let args = plugin.build_args(
            &StageInput::Target("example.com".to_string()),
            Path::new("/tmp/run/ports.json"),
            &params(),
        );
        let joined = args.join(" ");

        assert!(joined.starts_with("-host example.com -json -o /tmp/run/ports.json"));
        assert!(joined.contains("-rate 1000 -c 25 -retries 2 -scan-type c"));
        assert!(joined.contains("-top-ports 100"));
        assert_eq!(args.last().map(String::as_str), Some("-exclude-cdn"));
    }

    #[test]
    fn test_args_for_list_input_full_range() {
        let plugin = NaabuPortScan {
            ports: PortSelection::Full,
            technique: ScanTechnique::Syn,
        };
        let args = plugin.build_args(
            &StageInput::List("/tmp/hosts.txt".into()),
            Path::new("/tmp/ports.json"),
            &params(),
        );
        let joined = args.join(" ");

        assert!(joined.starts_with("-list /tmp/hosts.txt"));
        assert!(joined.contains("-scan-type s"));
        assert!(joined.contains("-p -"));
    }
}
