//! Source tree validation.
//!
//! A source tree is accepted only if its `Cargo.toml` parses, declares a
//! package, and resolves to exactly one binary target. Everything here
//! runs before any stage, so a bad tree never reaches the engine.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

pub const MANIFEST_FILE: &str = "Cargo.toml";
pub const LOCKFILE: &str = "Cargo.lock";

#[derive(Debug, Deserialize)]
struct RawManifest {
    package: Option<RawPackage>,
    #[serde(default)]
    bin: Vec<RawBin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawPackage {
    name: String,
    autobins: Option<bool>,
    default_run: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBin {
    name: Option<String>,
    path: Option<String>,
}

/// A validated source tree with its resolved artifact.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    pub package: String,
    /// Binary the build produces.
    pub artifact: String,
    /// Every binary target the package declares, sorted.
    pub binaries: Vec<String>,
    pub has_lockfile: bool,
}

impl SourceTree {
    /// Validate `root` and resolve the artifact, optionally by explicit name.
    pub fn load(root: &Path, bin: Option<&str>) -> Result<Self, BuildError> {
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(BuildError::MissingManifest(root.to_path_buf()));
        }

        let content = fs::read_to_string(&manifest_path).map_err(|e| {
            BuildError::InvalidManifest {
                path: manifest_path.clone(),
                message: e.to_string(),
            }
        })?;
        let raw: RawManifest =
            toml::from_str(&content).map_err(|e| BuildError::InvalidManifest {
                path: manifest_path.clone(),
                message: e.to_string(),
            })?;

        let package = raw
            .package
            .ok_or_else(|| BuildError::VirtualManifest(manifest_path.clone()))?;
        check_name(&manifest_path, &package.name)?;

        let binaries = discover_binaries(root, &manifest_path, &package, &raw.bin)?;
        let artifact = select_binary(&package, &binaries, bin)?;

        Ok(Self {
            root: root.to_path_buf(),
            package: package.name,
            artifact,
            binaries,
            has_lockfile: root.join(LOCKFILE).is_file(),
        })
    }

    /// True when cargo needs `--bin` to build only the artifact.
    pub fn needs_bin_flag(&self) -> bool {
        self.binaries.len() > 1
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }
}

/// Binary target names follow cargo's rules; they also become file names.
fn check_name(manifest: &Path, name: &str) -> Result<(), BuildError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BuildError::InvalidManifest {
            path: manifest.to_path_buf(),
            message: format!("invalid target name '{}'", name),
        })
    }
}

/// Collect explicit `[[bin]]` targets plus cargo's auto-discovered ones.
fn discover_binaries(
    root: &Path,
    manifest: &Path,
    package: &RawPackage,
    explicit: &[RawBin],
) -> Result<Vec<String>, BuildError> {
    let mut names = Vec::new();
    let mut claimed_paths = Vec::new();

    for bin in explicit {
        let name = bin.name.as_deref().ok_or_else(|| BuildError::InvalidManifest {
            path: manifest.to_path_buf(),
            message: "[[bin]] entry without a name".to_string(),
        })?;
        check_name(manifest, name)?;
        if let Some(path) = &bin.path {
            claimed_paths.push(PathBuf::from(path));
        }
        names.push(name.to_string());
    }

    if package.autobins.unwrap_or(true) {
        let main_rs = PathBuf::from("src/main.rs");
        if root.join(&main_rs).is_file() && !claimed_paths.contains(&main_rs) {
            names.push(package.name.clone());
        }

        let bin_dir = root.join("src/bin");
        if let Ok(entries) = fs::read_dir(&bin_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                let name = if path.is_file() && path.extension().is_some_and(|e| e == "rs") {
                    if claimed_paths.contains(&rel) {
                        continue;
                    }
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else if path.join("main.rs").is_file() {
                    if claimed_paths.contains(&rel.join("main.rs")) {
                        continue;
                    }
                    path.file_name().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                };
                if let Some(name) = name {
                    check_name(manifest, &name)?;
                    names.push(name);
                }
            }
        }
    }

    names.sort();
    names.dedup();
    Ok(names)
}

fn select_binary(
    package: &RawPackage,
    binaries: &[String],
    requested: Option<&str>,
) -> Result<String, BuildError> {
    if let Some(name) = requested {
        if binaries.iter().any(|b| b == name) {
            return Ok(name.to_string());
        }
        return Err(BuildError::UnknownBinary {
            name: name.to_string(),
            available: if binaries.is_empty() {
                "none".to_string()
            } else {
                binaries.join(", ")
            },
        });
    }

    match binaries {
        [] => Err(BuildError::NoBinary(package.name.clone())),
        [only] => Ok(only.clone()),
        many => match &package.default_run {
            Some(default) if many.contains(default) => Ok(default.clone()),
            _ => Err(BuildError::AmbiguousBinary(many.join(", "))),
        },
    }
}
