//! Build output cleaning.

use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::engine::Engine;
use crate::rebuild;
use crate::recipe::BuildTarget;

/// Remove staged contexts and receipts.
pub fn clean_outputs(output_dir: &Path) -> Result<()> {
    if output_dir.exists() {
        println!("Removing {}...", output_dir.display());
        fs::remove_dir_all(output_dir)?;
        println!("Clean complete.");
    } else {
        println!("Nothing to clean.");
    }
    Ok(())
}

/// Remove every image recorded in a receipt, then its receipt.
///
/// Images that are already gone only produce a warning.
pub fn clean_images(engine: &Engine, output_dir: &Path) -> Result<()> {
    let mut removed = 0;

    for target in BuildTarget::ALL {
        let Some(receipt) = rebuild::read_receipt(output_dir, target) else {
            continue;
        };
        if engine.image_exists(&receipt.tag) {
            println!("Removing image {}...", receipt.tag);
            engine.remove_image(&receipt.tag)?;
            removed += 1;
        } else {
            eprintln!("  [WARN] Image {} no longer exists", receipt.tag);
        }
        rebuild::remove_receipt(output_dir, target)?;
    }

    if removed == 0 {
        println!("No images to remove.");
    }
    Ok(())
}
