//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build a named image target
//! - `compile` - Run the compile stage on the host
//! - `render` - Print or write the Dockerfile
//! - `run` - Run a built image's default process
//! - `show` - Display information
//! - `preflight` - Run preflight checks
//! - `clean` - Remove outputs and images

pub mod build;
pub mod clean;
pub mod compile;
mod preflight;
pub mod render;
mod run;
pub mod show;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use compile::cmd_compile;
pub use preflight::cmd_preflight;
pub use render::cmd_render;
pub use run::cmd_run;
pub use show::cmd_show;

use anyhow::Result;

use crate::config::Config;
use crate::engine::{Engine, EngineKind};
use crate::recipe::BuildTarget;

/// Locate the configured engine, or the first one on PATH.
pub fn detect_engine(config: &Config) -> Result<Engine> {
    let preferred = config
        .engine
        .as_deref()
        .map(str::parse::<EngineKind>)
        .transpose()?;
    Engine::detect(preferred)
}

/// Default tag for `target`: `<image name or artifact>:<dev|latest>`.
pub fn default_tag(config: &Config, artifact: &str, target: BuildTarget) -> String {
    let repo = config.image_name.as_deref().unwrap_or(artifact);
    format!("{}:{}", repo, target.default_tag())
}

/// Tag for the compile image behind a `minimal-image` build: the same
/// repository as `tag`, tagged `dev`.
pub fn compile_tag(tag: &str) -> String {
    // A colon before the last '/' belongs to a registry port.
    let repo = match tag.rfind(':') {
        Some(idx) if !tag[idx..].contains('/') => &tag[..idx],
        _ => tag,
    };
    format!("{}:{}", repo, BuildTarget::Dev.default_tag())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    #[test]
    fn test_default_tag() {
        let mut config = Config::from_vars(Path::new("/work"), &HashMap::new());
        assert_eq!(default_tag(&config, "server", BuildTarget::Dev), "server:dev");
        assert_eq!(
            default_tag(&config, "server", BuildTarget::Minimal),
            "server:latest"
        );

        config.image_name = Some("registry.local/advice".to_string());
        assert_eq!(
            default_tag(&config, "server", BuildTarget::Minimal),
            "registry.local/advice:latest"
        );
    }

    #[test]
    fn test_compile_tag_follows_repository() {
        assert_eq!(compile_tag("server:latest"), "server:dev");
        assert_eq!(compile_tag("advice:v2"), "advice:dev");
        assert_eq!(compile_tag("advice"), "advice:dev");
        assert_eq!(
            compile_tag("localhost:5000/team/advice:1.0"),
            "localhost:5000/team/advice:dev"
        );
        assert_eq!(
            compile_tag("localhost:5000/advice"),
            "localhost:5000/advice:dev"
        );
    }
}
