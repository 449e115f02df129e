//! Build failure taxonomy.
//!
//! Every failure is fatal. Commands carry these through `anyhow` so the
//! operator sees the full chain, and the process exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a source tree into an image.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no Cargo.toml found in {0}")]
    MissingManifest(PathBuf),

    #[error("invalid manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("{0} is a virtual manifest (no [package] section); point --source at a package")]
    VirtualManifest(PathBuf),

    #[error("package '{0}' has no binary target")]
    NoBinary(String),

    #[error("package declares several binaries ({0}); pick one with --bin")]
    AmbiguousBinary(String),

    #[error("no binary named '{name}' (available: {available})")]
    UnknownBinary { name: String, available: String },

    #[error("compile stage failed (exit code {code})")]
    Compile { code: i32 },

    #[error("package stage failed (exit code {code})")]
    Package { code: i32 },

    #[error("artifact not found at {0}")]
    ArtifactMissing(String),

    #[error("image {tag} runs {actual:?} by default, expected {expected:?}")]
    CommandMismatch {
        tag: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("runtime image {0} contains compiler toolchain files")]
    ToolchainInRuntime(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
