//! Render command - prints or writes the two-stage Dockerfile.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::recipe::Recipe;
use crate::source::SourceTree;

/// Render the recipe for `source_dir`.
pub fn render(config: &Config, source_dir: &Path, bin: Option<&str>) -> Result<String> {
    let source = SourceTree::load(source_dir, bin)?;
    config.validate()?;
    Ok(Recipe::new(&config.build, &source).render())
}

/// Execute the render command. Writes to `output` if given, else stdout.
pub fn cmd_render(
    config: &Config,
    source_dir: &Path,
    bin: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let dockerfile = render(config, source_dir, bin)?;
    match output {
        Some(path) => {
            fs::write(path, &dockerfile)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", dockerfile),
    }
    Ok(())
}
