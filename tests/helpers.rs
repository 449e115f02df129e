//! Shared test utilities for slipway tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use slipway::config::Config;

/// Manifest for a package with a single `server` binary.
pub const SERVER_MANIFEST: &str = r#"[package]
name = "server"
version = "0.1.0"
edition = "2021"

[dependencies]
"#;

/// Test environment with a source tree and an output directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock source tree (build input)
    pub source: PathBuf,
    /// Base directory (working directory simulation)
    pub base_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();
        let source = base_dir.join("source");
        fs::create_dir_all(&source).expect("Failed to create source dir");

        Self {
            _temp_dir: temp_dir,
            source,
            base_dir,
        }
    }

    /// Config with defaults, output under the temp dir.
    pub fn config(&self) -> Config {
        self.config_with(&[])
    }

    pub fn config_with(&self, pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(&self.base_dir, &vars)
    }
}

/// Create a source tree with `SERVER_MANIFEST` and a main.rs.
pub fn create_server_tree(root: &Path) {
    write_file(&root.join("Cargo.toml"), SERVER_MANIFEST);
    write_file(
        &root.join("src/main.rs"),
        "fn main() {\n    println!(\"serving\");\n}\n",
    );
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "Expected file at {}", path.display());
}

pub fn assert_not_exists(path: &Path) {
    assert!(!path.exists(), "Expected nothing at {}", path.display());
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}
