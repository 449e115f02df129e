//! Compile command - runs the compile stage on the host.
//!
//! Same cargo invocation and static-linking flags as the `dev-image` stage,
//! without a container. Requires the target's toolchain on the host.

use anyhow::Result;
use std::path::Path;

use crate::cache;
use crate::config::Config;
use crate::error::BuildError;
use crate::process::Cmd;
use crate::recipe::{cargo_build_args, ArtifactPath, STATIC_RUSTFLAGS};
use crate::source::SourceTree;
use crate::timing::Timer;

/// Execute the compile command.
pub fn cmd_compile(config: &Config, source_dir: &Path, bin: Option<&str>) -> Result<()> {
    let source = SourceTree::load(source_dir, bin)?;
    config.validate()?;

    let artifact = ArtifactPath::new(&config.build, &source.artifact);
    println!(
        "=== Compiling {} for {} ===\n",
        artifact.name, artifact.target_triple
    );

    let t = Timer::start("Compile");
    // Pin the target dir so the artifact lands at the documented path.
    let status = Cmd::new("cargo")
        .args(cargo_build_args(&config.build, &source))
        .arg("--manifest-path")
        .arg_path(&source.manifest_path())
        .env("RUSTFLAGS", STATIC_RUSTFLAGS)
        .env("CARGO_TARGET_DIR", source.root.join("target").to_string_lossy())
        .dir(&source.root)
        .allow_fail()
        .run_interactive()?;
    if !status.success() {
        return Err(BuildError::Compile {
            code: status.code().unwrap_or(-1),
        }
        .into());
    }
    t.finish();

    let path = source.root.join(&artifact.relative);
    if !path.is_file() {
        return Err(BuildError::ArtifactMissing(path.display().to_string()).into());
    }

    println!("\nArtifact: {}", path.display());
    if let Some(digest) = cache::hash_file(&path) {
        println!("  sha256: {}", digest);
    }
    Ok(())
}
