//! Preflight checks for an image build.
//!
//! Validates configuration, the source tree, and host tools before
//! starting a build. Run with `slipway preflight`.

use anyhow::{bail, Result};

use crate::config::{Config, DEFAULT_BUILDER_IMAGE, DEFAULT_BUILDER_WORKDIR};
use crate::engine::{Engine, EngineKind};
use crate::source::SourceTree;

mod types;

pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Inputs for one preflight run.
pub struct PreflightInput<'a> {
    pub config: &'a Config,
    pub source: &'a std::path::Path,
    pub bin: Option<&'a str>,
}

/// Run all preflight checks.
pub fn run_preflight(input: &PreflightInput<'_>) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking configuration...");
    checks.push(check_config(input.config));
    checks.push(check_builder_workdir(input.config));

    println!("Checking source tree...");
    checks.extend(check_source(input));

    println!("Checking host tools...");
    checks.extend(check_engine(input.config));
    checks.push(check_cargo());

    println!();

    PreflightReport { checks }
}

/// Run preflight and fail if anything is missing.
pub fn run_preflight_or_fail(input: &PreflightInput<'_>) -> Result<()> {
    let report = run_preflight(input);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    Ok(())
}

fn check_config(config: &Config) -> CheckResult {
    match config.validate() {
        Ok(()) => CheckResult::pass_with(
            "Configuration",
            &format!(
                "build as {}, target {}",
                config.build.chown(),
                config.build.target_triple
            ),
        ),
        Err(e) => CheckResult::fail("Configuration", &e.to_string()),
    }
}

/// The compile stage switches to the build user before `WORKDIR`, so a
/// directory the builder image lacks would be created root-owned and the
/// build could not write `target/`. Only the default pairing is known good.
fn check_builder_workdir(config: &Config) -> CheckResult {
    let b = &config.build;
    if b.builder_image == DEFAULT_BUILDER_IMAGE && b.builder_workdir == DEFAULT_BUILDER_WORKDIR {
        return CheckResult::pass_with("Builder workdir", &b.builder_workdir);
    }
    CheckResult::warn(
        "Builder workdir",
        &format!(
            "{} must already exist in {} and be writable by {}",
            b.builder_workdir, b.builder_image, b.build_user
        ),
    )
}

fn check_source(input: &PreflightInput<'_>) -> Vec<CheckResult> {
    let mut results = Vec::new();

    match SourceTree::load(input.source, input.bin) {
        Ok(source) => {
            results.push(CheckResult::pass_with(
                "Cargo manifest",
                &format!(
                    "package '{}', artifact '{}'",
                    source.package, source.artifact
                ),
            ));
            if source.has_lockfile {
                results.push(CheckResult::pass("Cargo.lock"));
            } else {
                results.push(CheckResult::warn(
                    "Cargo.lock",
                    "Not found - dependency versions are resolved at build time",
                ));
            }
        }
        Err(e) => results.push(CheckResult::fail("Cargo manifest", &e.to_string())),
    }

    results
}

fn check_engine(config: &Config) -> Vec<CheckResult> {
    let preferred = match config.engine.as_deref().map(str::parse::<EngineKind>) {
        Some(Ok(kind)) => Some(kind),
        Some(Err(e)) => return vec![CheckResult::fail("Container engine", &e.to_string())],
        None => None,
    };

    let engine = match Engine::detect(preferred) {
        Ok(engine) => engine,
        Err(e) => {
            return vec![CheckResult::fail(
                "Container engine",
                &format!("{}. Install docker or podman.", e),
            )]
        }
    };

    let mut results = vec![CheckResult::pass_with(
        "Container engine",
        &engine.program.display().to_string(),
    )];

    match engine.server_version() {
        Ok(version) => results.push(CheckResult::pass_with(
            "Engine service",
            &format!("{} {}", engine.kind, version),
        )),
        Err(e) => results.push(CheckResult::fail("Engine service", &format!("{:#}", e))),
    }

    results
}

/// cargo is only needed for `slipway compile`; image builds compile in the builder.
fn check_cargo() -> CheckResult {
    match which::which("cargo") {
        Ok(path) => CheckResult::pass_with("cargo", &path.display().to_string()),
        Err(_) => CheckResult::warn(
            "cargo",
            "Not found - only needed for `slipway compile` on the host",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_manifest_fails_report() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "not toml [").unwrap();
        let config = Config::from_vars(dir.path(), &HashMap::new());
        let input = PreflightInput {
            config: &config,
            source: dir.path(),
            bin: None,
        };
        let report = run_preflight(&input);
        assert!(!report.all_passed());
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "Cargo manifest" && c.status == CheckStatus::Fail));
    }

    #[test]
    fn test_root_user_fails_config_check() {
        let mut vars = HashMap::new();
        vars.insert("SLIPWAY_BUILD_USER".to_string(), "root".to_string());
        let config = Config::from_vars(std::path::Path::new("/work"), &vars);
        assert_eq!(check_config(&config).status, CheckStatus::Fail);
    }

    #[test]
    fn test_custom_builder_workdir_warns() {
        let config = Config::from_vars(std::path::Path::new("/work"), &HashMap::new());
        assert_eq!(check_builder_workdir(&config).status, CheckStatus::Pass);

        let mut vars = HashMap::new();
        vars.insert("SLIPWAY_BUILDER_WORKDIR".to_string(), "/app".to_string());
        let config = Config::from_vars(std::path::Path::new("/work"), &vars);
        let check = check_builder_workdir(&config);
        assert_eq!(check.status, CheckStatus::Warn);
        assert!(check.details.unwrap().contains("/app must already exist"));
    }

    #[test]
    fn test_report_counts() {
        let report = PreflightReport {
            checks: vec![
                CheckResult::pass("a"),
                CheckResult::warn("b", "meh"),
                CheckResult::fail("c", "bad"),
            ],
        };
        assert!(!report.all_passed());
        assert_eq!(report.fail_count(), 1);
        assert_eq!(report.warn_count(), 1);
    }
}
