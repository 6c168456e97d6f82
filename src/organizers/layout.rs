use crate::core::models::Stage;
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const MAX_NAME_COLLISIONS: u32 = 100;
pub const RESULTS_FILE: &str = "results.json";

/// One run directory. Everything a run writes lives directly inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// Create a fresh directory under `base`. Two runs started within the same
    /// second get distinct directories via a numeric suffix.
    pub fn create(base: &Path, run_id: &str) -> Result<Self> {
        fs::create_dir_all(base).with_context(|| format!("Failed to create output directory: {:?}", base))?;

        for attempt in 1..=MAX_NAME_COLLISIONS {
            let name = match attempt {
                1 => run_id.to_string(),
                n => format!("{}_{}", run_id, n),
            };
            let root = base.join(name);
            match fs::create_dir(&root) {
                Ok(()) => {
                    verify_writable(&root)?;
                    return Ok(Self { root });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e).with_context(|| format!("Failed to create run directory: {:?}", root)),
            }
        }
        bail!("Could not find a free run directory name for {} under {:?}", run_id, base)
    }

    /// Use an existing run directory, e.g. for report regeneration.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("Run directory does not exist: {:?}", root);
        }
        verify_writable(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_id(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stage_output(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.output_file())
    }

    /// List file fed to `stage`, derived from the previous stage's records.
    /// The port stage reads the target directly and has none.
    pub fn stage_input(&self, stage: Stage) -> Option<PathBuf> {
        match stage {
            Stage::PortScan => None,
            Stage::HttpProbe => Some(self.root.join("ports_input.txt")),
            Stage::VulnScan => Some(self.root.join("services_input.txt")),
        }
    }

    pub fn results_file(&self) -> PathBuf {
        self.root.join(RESULTS_FILE)
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn verify_writable(path: &Path) -> Result<()> {
    let test_file = path.join(".write_test");
    fs::write(&test_file, b"test").with_context(|| format!("Directory not writable: {:?}", path))?;
    fs::remove_file(&test_file).with_context(|| format!("Failed to remove test file: {:?}", test_file))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_run_id_gets_distinct_dirs() {
        let base = tempfile::tempdir().unwrap();
        let first = RunLayout::create(base.path(), "example.com_20240101_000000").unwrap();
        let second = RunLayout::create(base.path(), "example.com_20240101_000000").unwrap();

        assert_ne!(first.root(), second.root());
        assert_eq!(second.run_id(), "example.com_20240101_000000_2");
        assert!(first.root().is_dir() && second.root().is_dir());
    }

    #[test]
    fn test_stage_paths() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "run").unwrap();

        assert_eq!(layout.stage_output(Stage::VulnScan), layout.root().join("vulnerabilities.jsonl"));
        assert_eq!(layout.stage_input(Stage::PortScan), None);
        assert_eq!(
            layout.stage_input(Stage::HttpProbe),
            Some(layout.root().join("ports_input.txt"))
        );
    }

    #[test]
    fn test_open_missing_dir_fails() {
        let base = tempfile::tempdir().unwrap();
        assert!(RunLayout::open(&base.path().join("nope")).is_err());
    }
}
