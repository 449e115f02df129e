//! Preflight command - runs preflight checks.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::preflight::{self, PreflightInput};

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, source: &Path, bin: Option<&str>, strict: bool) -> Result<()> {
    let input = PreflightInput { config, source, bin };
    if strict {
        preflight::run_preflight_or_fail(&input)?;
    } else {
        let report = preflight::run_preflight(&input);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to fail with a non-zero exit code.");
        }
    }
    Ok(())
}
