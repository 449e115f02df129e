//! Clean command - removes build outputs.

use anyhow::Result;

use crate::clean;
use crate::config::Config;

use super::detect_engine;

/// Execute the clean command. With `images`, built images go first, since
/// their tags are only known from the receipts in the output dir.
pub fn cmd_clean(config: &Config, images: bool) -> Result<()> {
    config.validate()?;
    if images {
        let engine = detect_engine(config)?;
        clean::clean_images(&engine, &config.output_dir)?;
    }
    clean::clean_outputs(&config.output_dir)
}
