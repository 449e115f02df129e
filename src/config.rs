//! Configuration management for slipway.
//!
//! Reads configuration from .env files and environment variables.
//! Environment variables take precedence over .env files, and CLI flags
//! take precedence over both (applied by the caller).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::engine::EngineKind;
use crate::error::BuildError;

/// Builder image carrying a musl toolchain and a non-root `rust` user.
pub const DEFAULT_BUILDER_IMAGE: &str = "ekidd/rust-musl-builder:latest";
pub const DEFAULT_RUNTIME_IMAGE: &str = "alpine:latest";
pub const DEFAULT_TARGET_TRIPLE: &str = "x86_64-unknown-linux-musl";
pub const DEFAULT_BUILD_USER: &str = "rust";
pub const DEFAULT_BUILD_GROUP: &str = "rust";
/// Source directory in the builder image. A custom value must already
/// exist in the builder image and be owned by the build user.
pub const DEFAULT_BUILDER_WORKDIR: &str = "/home/rust/src";
/// Fixed location of the artifact inside the runtime image.
pub const RUNTIME_BIN_DIR: &str = "/usr/local/bin";
pub const CERT_PACKAGE: &str = "ca-certificates";
pub const RELEASE_PROFILE: &str = "release";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Prefix shared by every configuration key.
const KEY_PREFIX: &str = "SLIPWAY_";

/// Settings shared by the compile and package stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub builder_image: String,
    pub runtime_image: String,
    pub target_triple: String,
    pub build_user: String,
    pub build_group: String,
    pub builder_workdir: String,
    pub runtime_bin_dir: String,
    pub cert_package: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            builder_image: DEFAULT_BUILDER_IMAGE.to_string(),
            runtime_image: DEFAULT_RUNTIME_IMAGE.to_string(),
            target_triple: DEFAULT_TARGET_TRIPLE.to_string(),
            build_user: DEFAULT_BUILD_USER.to_string(),
            build_group: DEFAULT_BUILD_GROUP.to_string(),
            builder_workdir: DEFAULT_BUILDER_WORKDIR.to_string(),
            runtime_bin_dir: RUNTIME_BIN_DIR.to_string(),
            cert_package: CERT_PACKAGE.to_string(),
        }
    }
}

impl BuildConfig {
    /// `user:group` pair used for `COPY --chown`.
    pub fn chown(&self) -> String {
        format!("{}:{}", self.build_user, self.build_group)
    }

    /// Artifact path relative to the source root: `target/<triple>/release/<name>`.
    pub fn artifact_rel_path(&self, name: &str) -> String {
        format!("target/{}/{}/{}", self.target_triple, RELEASE_PROFILE, name)
    }

    /// Absolute artifact path inside the builder stage.
    pub fn builder_artifact_path(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.builder_workdir.trim_end_matches('/'),
            self.artifact_rel_path(name)
        )
    }

    /// Absolute artifact path inside the runtime image.
    pub fn runtime_artifact_path(&self, name: &str) -> String {
        format!("{}/{}", self.runtime_bin_dir.trim_end_matches('/'), name)
    }
}

/// Slipway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Container engine override (default: first of docker, podman on PATH)
    pub engine: Option<String>,
    /// Image repository name (default: the artifact name)
    pub image_name: Option<String>,
    /// Where staged contexts and build receipts go (default: output)
    pub output_dir: PathBuf,
    /// Directory the configuration was loaded for (the working directory)
    pub base_dir: PathBuf,
    pub build: BuildConfig,
}

impl Config {
    /// Load configuration from .env files and environment.
    ///
    /// Later sources win:
    /// 1. `$XDG_CONFIG_HOME/slipway/env`
    /// 2. `.env` in the base directory
    /// 3. Process environment
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut vars = HashMap::new();

        let mut env_files = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            env_files.push(config_dir.join("slipway").join("env"));
        }
        env_files.push(base_dir.join(".env"));

        for path in env_files {
            if !path.exists() {
                continue;
            }
            let iter = dotenvy::from_path_iter(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            for item in iter {
                let (key, value) =
                    item.with_context(|| format!("Failed to parse {}", path.display()))?;
                if key.starts_with(KEY_PREFIX) {
                    vars.insert(key, value);
                }
            }
        }

        for (key, value) in std::env::vars() {
            if key.starts_with(KEY_PREFIX) {
                vars.insert(key, value);
            }
        }

        Ok(Self::from_vars(base_dir, &vars))
    }

    /// Build config from an already-merged variable map.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Self {
        let get = |key: &str, default: &str| -> String {
            vars.get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let output_dir = vars
            .get("SLIPWAY_OUTPUT_DIR")
            .map(|s| {
                let path = PathBuf::from(s);
                if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                }
            })
            .unwrap_or_else(|| base_dir.join(DEFAULT_OUTPUT_DIR));

        Self {
            engine: vars.get("SLIPWAY_ENGINE").cloned(),
            image_name: vars.get("SLIPWAY_IMAGE_NAME").cloned(),
            output_dir,
            base_dir: base_dir.to_path_buf(),
            build: BuildConfig {
                builder_image: get("SLIPWAY_BUILDER_IMAGE", DEFAULT_BUILDER_IMAGE),
                runtime_image: get("SLIPWAY_RUNTIME_IMAGE", DEFAULT_RUNTIME_IMAGE),
                target_triple: get("SLIPWAY_TARGET_TRIPLE", DEFAULT_TARGET_TRIPLE),
                build_user: get("SLIPWAY_BUILD_USER", DEFAULT_BUILD_USER),
                build_group: get("SLIPWAY_BUILD_GROUP", DEFAULT_BUILD_GROUP),
                builder_workdir: get("SLIPWAY_BUILDER_WORKDIR", DEFAULT_BUILDER_WORKDIR),
                runtime_bin_dir: RUNTIME_BIN_DIR.to_string(),
                cert_package: CERT_PACKAGE.to_string(),
            },
        }
    }

    /// Reject settings that would break the build contracts.
    pub fn validate(&self) -> Result<(), BuildError> {
        let b = &self.build;
        let required = [
            ("SLIPWAY_BUILDER_IMAGE", &b.builder_image),
            ("SLIPWAY_RUNTIME_IMAGE", &b.runtime_image),
            ("SLIPWAY_TARGET_TRIPLE", &b.target_triple),
            ("SLIPWAY_BUILD_USER", &b.build_user),
            ("SLIPWAY_BUILD_GROUP", &b.build_group),
            ("SLIPWAY_BUILDER_WORKDIR", &b.builder_workdir),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(BuildError::Config(format!("{} must not be empty", key)));
            }
        }

        // Build artifacts must never be root-owned.
        for (key, value) in [
            ("SLIPWAY_BUILD_USER", &b.build_user),
            ("SLIPWAY_BUILD_GROUP", &b.build_group),
        ] {
            if value == "root" || value == "0" {
                return Err(BuildError::Config(format!(
                    "{} is '{}'; the build must run as a non-root identity",
                    key, value
                )));
            }
        }

        if !b.builder_workdir.starts_with('/') {
            return Err(BuildError::Config(format!(
                "SLIPWAY_BUILDER_WORKDIR must be absolute, got '{}'",
                b.builder_workdir
            )));
        }

        if let Some(engine) = &self.engine {
            engine
                .parse::<EngineKind>()
                .map_err(|e| BuildError::Config(e.to_string()))?;
        }

        self.check_output_dir(&self.base_dir)
    }

    /// Reject an output dir that is `protected` or one of its ancestors.
    ///
    /// `slipway clean` deletes the output dir wholesale, so it must never
    /// hold the working directory or the source tree.
    pub fn check_output_dir(&self, protected: &Path) -> Result<(), BuildError> {
        // A directory that does not exist yet cannot contain anything.
        let (Ok(output), Ok(protected)) = (self.output_dir.canonicalize(), protected.canonicalize())
        else {
            return Ok(());
        };
        if protected.starts_with(&output) {
            return Err(BuildError::Config(format!(
                "SLIPWAY_OUTPUT_DIR ({}) contains {}; it must be a dedicated directory",
                self.output_dir.display(),
                protected.display()
            )));
        }
        Ok(())
    }

    /// Print configuration for `slipway show config`.
    pub fn print(&self) {
        println!("Configuration:");
        println!(
            "  SLIPWAY_ENGINE: {}",
            self.engine.as_deref().unwrap_or("(auto: docker, podman)")
        );
        println!(
            "  SLIPWAY_IMAGE_NAME: {}",
            self.image_name.as_deref().unwrap_or("(artifact name)")
        );
        println!("  SLIPWAY_OUTPUT_DIR: {}", self.output_dir.display());
        println!("  SLIPWAY_BUILDER_IMAGE: {}", self.build.builder_image);
        println!("  SLIPWAY_RUNTIME_IMAGE: {}", self.build.runtime_image);
        println!("  SLIPWAY_TARGET_TRIPLE: {}", self.build.target_triple);
        println!("  SLIPWAY_BUILD_USER: {}", self.build.build_user);
        println!("  SLIPWAY_BUILD_GROUP: {}", self.build.build_group);
        println!("  SLIPWAY_BUILDER_WORKDIR: {}", self.build.builder_workdir);
        println!("  Runtime bin dir: {}", self.build.runtime_bin_dir);
        println!("  Certificate package: {}", self.build.cert_package);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(Path::new("/work"), &HashMap::new());
        assert_eq!(config.build, BuildConfig::default());
        assert_eq!(config.output_dir, PathBuf::from("/work/output"));
        assert!(config.engine.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_output_dir_joined_to_base() {
        let config = Config::from_vars(
            Path::new("/work"),
            &vars(&[("SLIPWAY_OUTPUT_DIR", "build/out")]),
        );
        assert_eq!(config.output_dir, PathBuf::from("/work/build/out"));

        let config = Config::from_vars(
            Path::new("/work"),
            &vars(&[("SLIPWAY_OUTPUT_DIR", "/var/slipway")]),
        );
        assert_eq!(config.output_dir, PathBuf::from("/var/slipway"));
    }

    #[test]
    fn test_root_build_user_rejected() {
        for (key, value) in [
            ("SLIPWAY_BUILD_USER", "root"),
            ("SLIPWAY_BUILD_USER", "0"),
            ("SLIPWAY_BUILD_GROUP", "root"),
        ] {
            let config = Config::from_vars(Path::new("/work"), &vars(&[(key, value)]));
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("non-root"), "{}", err);
        }
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let config = Config::from_vars(Path::new("/work"), &vars(&[("SLIPWAY_ENGINE", "lxc")]));
        assert!(config.validate().is_err());

        let config =
            Config::from_vars(Path::new("/work"), &vars(&[("SLIPWAY_ENGINE", "podman")]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relative_workdir_rejected() {
        let config = Config::from_vars(
            Path::new("/work"),
            &vars(&[("SLIPWAY_BUILDER_WORKDIR", "src")]),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_dir_must_not_contain_base_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().join("project");
        std::fs::create_dir_all(base.join("output")).unwrap();

        for value in [".", "..", "./", ""] {
            let config = Config::from_vars(&base, &vars(&[("SLIPWAY_OUTPUT_DIR", value)]));
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("dedicated"), "{}: {}", value, err);
        }

        let config = Config::from_vars(&base, &HashMap::new());
        assert!(config.validate().is_ok());
        // Not created yet, so it cannot contain anything.
        let config = Config::from_vars(&base, &vars(&[("SLIPWAY_OUTPUT_DIR", "fresh/out")]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_output_dir_must_not_contain_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("out/source");
        std::fs::create_dir_all(&source).unwrap();
        let config = Config::from_vars(dir.path(), &vars(&[("SLIPWAY_OUTPUT_DIR", "out")]));

        assert!(config.validate().is_ok());
        assert!(config.check_output_dir(&source).is_err());
        assert!(config.check_output_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_artifact_paths() {
        let build = BuildConfig::default();
        assert_eq!(
            build.artifact_rel_path("server"),
            "target/x86_64-unknown-linux-musl/release/server"
        );
        assert_eq!(
            build.builder_artifact_path("server"),
            "/home/rust/src/target/x86_64-unknown-linux-musl/release/server"
        );
        assert_eq!(build.runtime_artifact_path("server"), "/usr/local/bin/server");
        assert_eq!(build.chown(), "rust:rust");
    }
}
