//! Build command - produces a named image target.
//!
//! `dev-image` runs the compile stage. `minimal-image` runs the compile
//! stage and then the package stage as a separate engine invocation, so a
//! failure is always attributed to the stage that caused it.

use anyhow::Result;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::cache;
use crate::config::Config;
use crate::context::{self, StagedContext};
use crate::engine::{BuildRequest, Engine, DIGEST_LABEL, TARGET_LABEL};
use crate::error::BuildError;
use crate::rebuild::{self, Receipt};
use crate::recipe::{BuildTarget, Recipe};
use crate::source::SourceTree;
use crate::timing::{format_duration, Timer};

use super::{compile_tag, default_tag, detect_engine};

/// Options for one build.
pub struct BuildOptions {
    pub target: BuildTarget,
    pub source: PathBuf,
    pub bin: Option<String>,
    pub tag: Option<String>,
    /// Rebuild even if the receipt says the image is current.
    pub force: bool,
    /// Inspect the image after building.
    pub verify: bool,
}

/// Execute the build command.
pub fn cmd_build(config: &Config, opts: &BuildOptions) -> Result<()> {
    println!("=== Building {} ===\n", opts.target);
    let build_start = Instant::now();

    // A bad source tree aborts before anything is staged or executed.
    let source = SourceTree::load(&opts.source, opts.bin.as_deref())?;
    config.validate()?;
    config.check_output_dir(&source.root)?;

    let recipe = Recipe::new(&config.build, &source);
    println!(
        "Package '{}', artifact '{}' for {}",
        source.package, recipe.artifact.name, recipe.artifact.target_triple
    );

    let engine = detect_engine(config)?;
    let tag = opts
        .tag
        .clone()
        .unwrap_or_else(|| default_tag(config, &source.artifact, opts.target));

    let t = Timer::start("Stage build context");
    let staged = context::stage(&source, &config.output_dir, &recipe.render())?;
    t.finish();
    println!(
        "  {} files, digest {}",
        staged.file_count,
        cache::short(&staged.digest)
    );

    if !opts.force
        && !rebuild::needs_rebuild(&config.output_dir, opts.target, &tag, &staged.digest, |t| {
            engine.image_exists(t)
        })
    {
        println!(
            "\n[SKIP] {} is up to date (digest {}). Use --force to rebuild.",
            tag,
            cache::short(&staged.digest)
        );
        return Ok(());
    }

    // Compile stage. For dev-image this is the requested image itself.
    let dev_tag = match opts.target {
        BuildTarget::Dev => tag.clone(),
        BuildTarget::Minimal => compile_tag(&tag),
    };
    println!("\nCompile stage ({})...", dev_tag);
    let t = Timer::start("Compile stage");
    run_stage(&engine, &staged, BuildTarget::Dev, &dev_tag)?;
    t.finish();

    // Package stage copies the artifact produced above; nothing is recompiled.
    if opts.target == BuildTarget::Minimal {
        println!("\nPackage stage ({})...", tag);
        let t = Timer::start("Package stage");
        run_stage(&engine, &staged, BuildTarget::Minimal, &tag)?;
        t.finish();
    }

    if opts.verify {
        println!("\nVerifying {}...", tag);
        verify_image(&engine, &recipe, opts.target, &tag)?;
        println!("  Default process: {:?}", recipe.artifact.command(opts.target));
    }

    let receipt = Receipt {
        target: opts.target.stage_name().to_string(),
        tag: tag.clone(),
        engine: engine.kind.to_string(),
        source_digest: staged.digest.clone(),
        artifact: recipe.artifact.name.clone(),
        builder_path: recipe.artifact.builder.clone(),
        runtime_path: (opts.target == BuildTarget::Minimal).then(|| recipe.artifact.runtime.clone()),
        command: recipe.artifact.command(opts.target),
        built_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
        duration_secs: build_start.elapsed().as_secs_f64(),
    };
    rebuild::write_receipt(&config.output_dir, opts.target, &receipt)?;

    println!("\n=== Build Complete ({}) ===", format_duration(build_start.elapsed()));
    println!("  Image: {}", tag);
    match opts.target {
        BuildTarget::Dev => println!("  Artifact: {}", recipe.artifact.builder),
        BuildTarget::Minimal => println!("  Artifact: {}", recipe.artifact.runtime),
    }
    println!("\nNext: slipway run {}", opts.target);

    Ok(())
}

/// Build one stage, mapping a non-zero exit to that stage's error.
fn run_stage(engine: &Engine, staged: &StagedContext, target: BuildTarget, tag: &str) -> Result<()> {
    let request = BuildRequest {
        context: &staged.dir,
        dockerfile: &staged.dockerfile,
        target,
        tag,
        labels: vec![
            (DIGEST_LABEL.to_string(), staged.digest.clone()),
            (TARGET_LABEL.to_string(), target.stage_name().to_string()),
        ],
    };

    let status = engine.build(&request)?;
    if status.success() {
        return Ok(());
    }

    let code = status.code().unwrap_or(-1);
    let err = match target {
        BuildTarget::Dev => BuildError::Compile { code },
        BuildTarget::Minimal => BuildError::Package { code },
    };
    Err(err.into())
}

/// Check the default-process and file-placement contracts on a built image.
fn verify_image(engine: &Engine, recipe: &Recipe, target: BuildTarget, tag: &str) -> Result<()> {
    let expected = recipe.artifact.command(target);
    let actual = engine.image_command(tag)?;
    if actual != expected {
        return Err(BuildError::CommandMismatch {
            tag: tag.to_string(),
            expected,
            actual,
        }
        .into());
    }

    let artifact_path = match target {
        BuildTarget::Dev => &recipe.artifact.builder,
        BuildTarget::Minimal => &recipe.artifact.runtime,
    };
    let present = engine.probe(tag, &format!("test -x '{}'", artifact_path))?;
    if !present.success() {
        return Err(BuildError::ArtifactMissing(format!("{} in {}", artifact_path, tag)).into());
    }

    if target == BuildTarget::Minimal {
        let toolchain = engine.probe(
            tag,
            "command -v cargo >/dev/null 2>&1 || command -v rustc >/dev/null 2>&1",
        )?;
        if toolchain.success() {
            return Err(BuildError::ToolchainInRuntime(tag.to_string()).into());
        }
    }

    Ok(())
}
