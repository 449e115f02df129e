//! Rebuild detection and build receipts.
//!
//! A receipt (`<output>/<target>.json`) is written after every successful
//! build. A later build of the same target is skipped when the staged
//! context digest matches the receipt and the image still exists.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::recipe::BuildTarget;

/// Record of a successful build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub target: String,
    pub tag: String,
    pub engine: String,
    pub source_digest: String,
    pub artifact: String,
    /// Artifact path inside the builder stage.
    pub builder_path: String,
    /// Artifact path inside the runtime image (minimal-image only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_path: Option<String>,
    /// Default process, verified against the built image.
    pub command: Vec<String>,
    /// Seconds since the Unix epoch.
    pub built_at: u64,
    pub duration_secs: f64,
}

pub fn receipt_path(output_dir: &Path, target: BuildTarget) -> PathBuf {
    output_dir.join(format!("{}.json", target.stage_name()))
}

/// Read the receipt for `target`. Returns None if missing or unreadable.
pub fn read_receipt(output_dir: &Path, target: BuildTarget) -> Option<Receipt> {
    let path = receipt_path(output_dir, target);
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str(&s).map_err(anyhow::Error::from));
    match parsed {
        Ok(receipt) => Some(receipt),
        Err(e) => {
            eprintln!(
                "  [WARN] Ignoring unreadable receipt {}: {} (will rebuild)",
                path.display(),
                e
            );
            None
        }
    }
}

pub fn write_receipt(output_dir: &Path, target: BuildTarget, receipt: &Receipt) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = receipt_path(output_dir, target);
    let json = serde_json::to_string_pretty(receipt)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn remove_receipt(output_dir: &Path, target: BuildTarget) -> Result<()> {
    let path = receipt_path(output_dir, target);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Check if `target` must be rebuilt.
///
/// Returns true if there is no receipt, the tag or digest changed, or the
/// image is gone. `image_exists` is only consulted when everything else
/// matches.
pub fn needs_rebuild(
    output_dir: &Path,
    target: BuildTarget,
    tag: &str,
    digest: &str,
    image_exists: impl FnOnce(&str) -> bool,
) -> bool {
    match read_receipt(output_dir, target) {
        Some(receipt) => {
            receipt.source_digest != digest || receipt.tag != tag || !image_exists(tag)
        }
        None => true,
    }
}
