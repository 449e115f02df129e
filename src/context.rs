//! Build context staging.
//!
//! Copies the source tree into a fresh `context/` directory under the output dir,
//! writes the Dockerfile next to it, and digests everything that was
//! staged. Each build starts from a clean context.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cache::ContextHasher;
use crate::source::{SourceTree, LOCKFILE, MANIFEST_FILE};

pub const DOCKERFILE: &str = "Dockerfile";
pub const DOCKERIGNORE: &str = ".dockerignore";
/// Name of the staged context inside the output dir.
pub const CONTEXT_DIR: &str = "context";

/// Files the recipe depends on; staged even when `.dockerignore` lists them.
const ALWAYS_STAGED: &[&str] = &[MANIFEST_FILE, LOCKFILE];

/// Top-level entries never copied into the context.
const ALWAYS_EXCLUDED: &[&str] = &["target", ".git"];

/// A staged build context.
#[derive(Debug, Clone)]
pub struct StagedContext {
    pub dir: PathBuf,
    pub dockerfile: PathBuf,
    /// SHA256 over every staged file and the Dockerfile.
    pub digest: String,
    pub file_count: usize,
}

/// Exclusion rules for one source tree.
#[derive(Debug, Default)]
pub struct Excludes {
    prefixes: Vec<String>,
}

impl Excludes {
    /// Built-in exclusions plus plain entries from a top-level `.dockerignore`.
    ///
    /// Glob patterns are not supported and are skipped with a warning.
    pub fn for_source(root: &Path) -> Result<Self> {
        let mut prefixes: Vec<String> = ALWAYS_EXCLUDED.iter().map(|s| s.to_string()).collect();

        let ignore = root.join(DOCKERIGNORE);
        if ignore.is_file() {
            let content = fs::read_to_string(&ignore)
                .with_context(|| format!("Failed to read {}", ignore.display()))?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if line.contains(['*', '?', '[', '!']) {
                    eprintln!("  [WARN] Ignoring unsupported {} pattern: {}", DOCKERIGNORE, line);
                    continue;
                }
                let entry = line.trim_start_matches("./").trim_matches('/');
                if ALWAYS_STAGED.contains(&entry) {
                    eprintln!("  [WARN] {} lists {}; it is staged anyway", DOCKERIGNORE, entry);
                    continue;
                }
                if !entry.is_empty() {
                    prefixes.push(entry.to_string());
                }
            }
        }

        Ok(Self { prefixes })
    }

    /// Exclude one more path, relative to the source root.
    pub fn exclude(&mut self, rel: &str) {
        self.prefixes.push(rel.to_string());
    }

    /// Whether a path relative to the source root is excluded.
    pub fn is_excluded(&self, rel: &str) -> bool {
        self.prefixes.iter().any(|p| {
            rel == p || (rel.starts_with(p.as_str()) && rel[p.len()..].starts_with('/'))
        })
    }
}

/// Relative path with forward slashes, as used in digests and exclusions.
fn rel_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Staged context location for `output_dir`.
pub fn context_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(CONTEXT_DIR)
}

/// Stage `source` into `<output_dir>/context`, replacing whatever was there.
pub fn stage(source: &SourceTree, output_dir: &Path, dockerfile: &str) -> Result<StagedContext> {
    let dest = context_dir(output_dir);
    if dest.exists() {
        fs::remove_dir_all(&dest)
            .with_context(|| format!("Failed to clear {}", dest.display()))?;
    }
    fs::create_dir_all(&dest).with_context(|| format!("Failed to create {}", dest.display()))?;

    let root = &source.root;
    let mut excludes = Excludes::for_source(root)?;
    // Neither the context nor the receipts next to it belong in the build.
    if let (Ok(root_canon), Ok(output_canon)) = (root.canonicalize(), output_dir.canonicalize()) {
        if let Ok(inside) = output_canon.strip_prefix(&root_canon) {
            if !inside.as_os_str().is_empty() {
                excludes.exclude(&rel_string(inside));
            }
        }
    }

    let mut hasher = ContextHasher::new();
    let mut file_count = 0;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let Ok(rel) = e.path().strip_prefix(root) else {
                return false;
            };
            if rel.as_os_str().is_empty() {
                return true;
            }
            !excludes.is_excluded(&rel_string(rel))
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let rel = entry.path().strip_prefix(root)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let rel_str = rel_string(rel);
        if rel_str == DOCKERFILE {
            // Replaced by the generated recipe below.
            continue;
        }
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            copy_symlink(&link, &target)?;
            hasher.add_entry(&rel_str, link.to_string_lossy().as_bytes());
            file_count += 1;
        } else if file_type.is_file() {
            let content = fs::read(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            fs::write(&target, &content)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            let perms = entry.metadata()?.permissions();
            fs::set_permissions(&target, perms)?;
            hasher.add_entry(&rel_str, &content);
            file_count += 1;
        }
    }

    let dockerfile_path = dest.join(DOCKERFILE);
    fs::write(&dockerfile_path, dockerfile)
        .with_context(|| format!("Failed to write {}", dockerfile_path.display()))?;
    hasher.add_entry(DOCKERFILE, dockerfile.as_bytes());

    tracing::debug!(
        "staged {} files from {} into {}",
        file_count,
        root.display(),
        dest.display()
    );

    Ok(StagedContext {
        dir: dest,
        dockerfile: dockerfile_path,
        digest: hasher.finish(),
        file_count,
    })
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target)
        .with_context(|| format!("Failed to create symlink {}", target.display()))
}

#[cfg(not(unix))]
fn copy_symlink(_link: &Path, target: &Path) -> Result<()> {
    anyhow::bail!("Symlinks are not supported in build contexts: {}", target.display())
}
