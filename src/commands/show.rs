//! Show command - displays information.

use anyhow::Result;
use std::path::Path;

use crate::cache;
use crate::config::Config;
use crate::rebuild;
use crate::recipe::{ArtifactPath, BuildTarget};
use crate::source::SourceTree;

use super::detect_engine;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show where the artifact lands in each stage
    Artifact,
    /// Show per-target build status
    Status,
}

/// Execute the show command.
pub fn cmd_show(
    config: &Config,
    target: ShowTarget,
    source_dir: &Path,
    bin: Option<&str>,
) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Artifact => {
            let source = SourceTree::load(source_dir, bin)?;
            print_artifact(&ArtifactPath::new(&config.build, &source.artifact));
        }
        ShowTarget::Status => print_status(config),
    }
    Ok(())
}

fn print_artifact(artifact: &ArtifactPath) {
    println!("Artifact: {}", artifact.name);
    println!("  Target triple:  {}", artifact.target_triple);
    println!("  Linkage:        static");
    println!("  Source tree:    {}", artifact.relative);
    println!("  dev-image:      {}", artifact.builder);
    println!("  minimal-image:  {}", artifact.runtime);
    for target in BuildTarget::ALL {
        println!(
            "  {} runs:  {:?}",
            target,
            artifact.command(target)
        );
    }
}

fn print_status(config: &Config) {
    // Status is still useful without an engine; image presence is then unknown.
    let engine = detect_engine(config).ok();

    println!("Build status ({}):", config.output_dir.display());
    for target in BuildTarget::ALL {
        match rebuild::read_receipt(&config.output_dir, target) {
            Some(receipt) => {
                let present = match &engine {
                    Some(engine) if engine.image_exists(&receipt.tag) => "present",
                    Some(_) => "MISSING",
                    None => "unknown",
                };
                println!(
                    "  {:<14} {} (digest {}, image {}, built in {:.1}s)",
                    target.stage_name(),
                    receipt.tag,
                    cache::short(&receipt.source_digest),
                    present,
                    receipt.duration_secs
                );
            }
            None => println!("  {:<14} not built", target.stage_name()),
        }
    }
}
