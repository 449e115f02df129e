//! Run command - starts a built image's default process.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::rebuild;
use crate::recipe::BuildTarget;

use super::detect_engine;

/// Execute the run command.
///
/// The container gets no arguments; the server reads its own configuration
/// from its environment. Returns when the server exits.
pub fn cmd_run(config: &Config, target: BuildTarget, tag: Option<String>) -> Result<()> {
    let tag = match tag {
        Some(tag) => tag,
        None => match rebuild::read_receipt(&config.output_dir, target) {
            Some(receipt) => receipt.tag,
            None => bail!(
                "No {} has been built yet. Run 'slipway build {}' first.",
                target,
                target
            ),
        },
    };

    let engine = detect_engine(config)?;
    println!("Running {}...", tag);
    let status = engine.run(&tag)?;
    if !status.success() {
        bail!(
            "{} exited with code {}",
            tag,
            status.code().unwrap_or(-1)
        );
    }
    Ok(())
}
