use super::basic::SUMMARY_FILE;
use crate::organizers::layout::RunLayout;
use anyhow::{bail, Result};
use std::fs;

/// A run is never left without a readable summary.
pub fn validate_reports(layout: &RunLayout) -> Result<()> {
    let summary = layout.file(SUMMARY_FILE);
    if !summary.exists() {
        bail!("Required report file missing: {:?}", summary);
    }

    let metadata = fs::metadata(&summary)?;
    if metadata.len() == 0 {
        bail!("Report file is empty: {:?}", summary);
    }

    tracing::info!("Summary report validated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_or_empty_summary_rejected() {
        let base = tempfile::tempdir().unwrap();
        let layout = RunLayout::create(base.path(), "run").unwrap();
        assert!(validate_reports(&layout).is_err());

        fs::write(layout.file(SUMMARY_FILE), "").unwrap();
        assert!(validate_reports(&layout).is_err());

        fs::write(layout.file(SUMMARY_FILE), "ok\n").unwrap();
        assert!(validate_reports(&layout).is_ok());
    }
}
