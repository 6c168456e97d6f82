use crate::config::types::ToolPaths;
use directories::BaseDirs;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use which::which;

const COMMON_INSTALL_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin", "/snap/bin"];

/// Resolved executables, keyed by tool name. A tool that could not be found
/// is simply absent; the stage that needs it reports `not_found` when it runs.
#[derive(Debug, Clone, Default)]
pub struct ToolLocations {
    paths: BTreeMap<String, PathBuf>,
}

impl ToolLocations {
    /// Lookup order: explicit override, configured search dirs, PATH,
    /// `~/go/bin`, then the usual system locations.
    pub fn discover(config: &ToolPaths, tools: &[&str]) -> Self {
        let mut paths = BTreeMap::new();
        for tool in tools {
            match locate(config, tool) {
                Some(path) => {
                    tracing::debug!("Found {}: {:?}", tool, path);
                    paths.insert(tool.to_string(), path);
                }
                None => tracing::debug!("{} not found", tool),
            }
        }
        Self { paths }
    }

    #[cfg(test)]
    pub fn with_paths<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, PathBuf)>,
        S: Into<String>,
    {
        Self {
            paths: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn resolve(&self, tool: &str) -> Option<&Path> {
        self.paths.get(tool).map(PathBuf::as_path)
    }

    pub fn missing<'a>(&self, tools: &[&'a str]) -> Vec<&'a str> {
        tools
            .iter()
            .copied()
            .filter(|tool| !self.paths.contains_key(*tool))
            .collect()
    }
}

fn locate(config: &ToolPaths, tool: &str) -> Option<PathBuf> {
    if let Some(explicit) = config.override_for(tool) {
        if is_executable(explicit) {
            return Some(explicit.clone());
        }
        tracing::warn!("Configured path for {} is not executable: {:?}", tool, explicit);
    }

    if let Some(found) = config
        .search_dirs
        .iter()
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
    {
        return Some(found);
    }

    if let Ok(found) = which(tool) {
        return Some(found);
    }

    let go_bin = BaseDirs::new().map(|dirs| dirs.home_dir().join("go").join("bin"));
    go_bin
        .into_iter()
        .chain(COMMON_INSTALL_DIRS.iter().map(PathBuf::from))
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
