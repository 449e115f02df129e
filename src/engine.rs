//! Container engine invocation.
//!
//! Docker and Podman share the CLI surface slipway needs (`build --target`,
//! `image inspect`, `run`, `image rm`), so one wrapper drives both.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::str::FromStr;

use crate::process::{Cmd, CommandResult};
use crate::recipe::BuildTarget;

/// Image label carrying the staged context digest.
pub const DIGEST_LABEL: &str = "dev.slipway.source-digest";
/// Image label carrying the build target name.
pub const TARGET_LABEL: &str = "dev.slipway.target";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Docker,
    Podman,
}

impl EngineKind {
    /// Detection order when nothing is configured.
    pub const SEARCH_ORDER: [EngineKind; 2] = [EngineKind::Docker, EngineKind::Podman];

    pub fn program(self) -> &'static str {
        match self {
            EngineKind::Docker => "docker",
            EngineKind::Podman => "podman",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(EngineKind::Docker),
            "podman" => Ok(EngineKind::Podman),
            other => anyhow::bail!("unknown container engine '{}' (expected docker or podman)", other),
        }
    }
}

/// One `build` invocation.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub context: &'a Path,
    pub dockerfile: &'a Path,
    pub target: BuildTarget,
    pub tag: &'a str,
    pub labels: Vec<(String, String)>,
}

impl BuildRequest<'_> {
    /// Engine arguments for this request (after the program name).
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--file".to_string(),
            self.dockerfile.to_string_lossy().into_owned(),
            "--target".to_string(),
            self.target.stage_name().to_string(),
            "--tag".to_string(),
            self.tag.to_string(),
        ];
        for (key, value) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.context.to_string_lossy().into_owned());
        args
    }
}

/// A located container engine.
#[derive(Debug, Clone)]
pub struct Engine {
    pub kind: EngineKind,
    pub program: PathBuf,
}

impl Engine {
    /// Find the engine on PATH: the preferred one, or the first available.
    pub fn detect(preferred: Option<EngineKind>) -> Result<Self> {
        let candidates: Vec<EngineKind> = match preferred {
            Some(kind) => vec![kind],
            None => EngineKind::SEARCH_ORDER.to_vec(),
        };

        for kind in &candidates {
            if let Ok(program) = which::which(kind.program()) {
                tracing::debug!("using {} at {}", kind, program.display());
                return Ok(Self {
                    kind: *kind,
                    program,
                });
            }
        }

        let names: Vec<&str> = candidates.iter().map(|k| k.program()).collect();
        anyhow::bail!(
            "No container engine found on PATH (looked for: {})",
            names.join(", ")
        )
    }

    fn cmd(&self) -> Cmd {
        Cmd::new(self.program.to_string_lossy())
    }

    /// Run a build with output streamed to the terminal.
    ///
    /// Returns the exit status rather than failing, so the caller can
    /// attribute the failure to the right stage.
    pub fn build(&self, request: &BuildRequest<'_>) -> Result<ExitStatus> {
        self.cmd().args(request.args()).allow_fail().run_interactive()
    }

    pub fn image_exists(&self, tag: &str) -> bool {
        self.cmd()
            .args(["image", "inspect", tag])
            .allow_fail()
            .run()
            .map(|r| r.success())
            .unwrap_or(false)
    }

    /// The image's default command (`Config.Cmd`).
    pub fn image_command(&self, tag: &str) -> Result<Vec<String>> {
        let result = self
            .cmd()
            .args(["image", "inspect", "--format", "{{json .Config.Cmd}}", tag])
            .error_msg(format!("Failed to inspect image {}", tag))
            .run()?;
        parse_command_json(result.stdout_trimmed())
            .with_context(|| format!("Unexpected Config.Cmd for {}", tag))
    }

    /// Run a shell snippet inside a throwaway container of `tag`.
    pub fn probe(&self, tag: &str, script: &str) -> Result<CommandResult> {
        self.cmd()
            .args(["run", "--rm", "--entrypoint", "/bin/sh", tag, "-c", script])
            .allow_fail()
            .run()
    }

    /// Run the image's default process with no arguments.
    pub fn run(&self, tag: &str) -> Result<ExitStatus> {
        self.cmd()
            .args(["run", "--rm", tag])
            .allow_fail()
            .run_interactive()
    }

    pub fn remove_image(&self, tag: &str) -> Result<()> {
        self.cmd()
            .args(["image", "rm", tag])
            .error_msg(format!("Failed to remove image {}", tag))
            .run()?;
        Ok(())
    }

    /// Server version, which also proves the daemon/service is reachable.
    pub fn server_version(&self) -> Result<String> {
        let format = match self.kind {
            EngineKind::Docker => "{{.Server.Version}}",
            EngineKind::Podman => "{{.Version}}",
        };
        let result = self
            .cmd()
            .args(["version", "--format", format])
            .error_msg(format!("{} is installed but not reachable", self.kind))
            .run()?;
        Ok(result.stdout_trimmed().to_string())
    }
}

/// Parse `{{json .Config.Cmd}}` output. `null` means no default command.
pub fn parse_command_json(raw: &str) -> Result<Vec<String>> {
    let parsed: Option<Vec<String>> =
        serde_json::from_str(raw).with_context(|| format!("not a JSON string array: {}", raw))?;
    Ok(parsed.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!("docker".parse::<EngineKind>().unwrap(), EngineKind::Docker);
        assert_eq!(" Podman ".parse::<EngineKind>().unwrap(), EngineKind::Podman);
        assert!("nerdctl".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_build_args() {
        let request = BuildRequest {
            context: Path::new("/out/context"),
            dockerfile: Path::new("/out/context/Dockerfile"),
            target: BuildTarget::Minimal,
            tag: "server:latest",
            labels: vec![(DIGEST_LABEL.to_string(), "abc".to_string())],
        };
        assert_eq!(
            request.args(),
            vec![
                "build",
                "--file",
                "/out/context/Dockerfile",
                "--target",
                "minimal-image",
                "--tag",
                "server:latest",
                "--label",
                "dev.slipway.source-digest=abc",
                "/out/context",
            ]
        );
    }

    #[test]
    fn test_parse_command_json() {
        assert_eq!(
            parse_command_json(r#"["/usr/local/bin/server"]"#).unwrap(),
            vec!["/usr/local/bin/server"]
        );
        assert!(parse_command_json("null").unwrap().is_empty());
        assert!(parse_command_json("<no value>").is_err());
    }
}
