//! Two-stage image recipe.
//!
//! The recipe is modelled as stages of typed instructions and rendered to a
//! Dockerfile. Each stage is a named build target:
//!
//! - `dev-image`: builder image that compiles the static release artifact
//!   and runs it by default.
//! - `minimal-image`: runtime base plus certificates plus the artifact,
//!   copied from `dev-image`. It never compiles anything itself.

use std::fmt;
use std::str::FromStr;

use crate::config::BuildConfig;
use crate::source::SourceTree;

/// RUSTFLAGS forcing a statically linked C runtime.
pub const STATIC_RUSTFLAGS: &str = "-C target-feature=+crt-static";

/// Selectable build target. Each maps to a stage of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildTarget {
    /// Compile stage only.
    Dev,
    /// Compile stage followed by the package stage.
    Minimal,
}

impl BuildTarget {
    pub const ALL: [BuildTarget; 2] = [BuildTarget::Dev, BuildTarget::Minimal];

    /// Stage name, also used as the engine's `--target`.
    pub fn stage_name(self) -> &'static str {
        match self {
            BuildTarget::Dev => "dev-image",
            BuildTarget::Minimal => "minimal-image",
        }
    }

    /// Default image tag suffix.
    pub fn default_tag(self) -> &'static str {
        match self {
            BuildTarget::Dev => "dev",
            BuildTarget::Minimal => "latest",
        }
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage_name())
    }
}

impl FromStr for BuildTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev-image" | "dev" => Ok(BuildTarget::Dev),
            "minimal-image" | "minimal" => Ok(BuildTarget::Minimal),
            other => Err(format!(
                "unknown build target '{}' (expected dev-image or minimal-image)",
                other
            )),
        }
    }
}

/// A single Dockerfile instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    From { image: String, stage: String },
    User(String),
    Workdir(String),
    Env { key: String, value: String },
    Copy {
        from: Option<String>,
        chown: Option<String>,
        src: String,
        dest: String,
    },
    Run(String),
    /// Exec-form command so the artifact is the container's main process.
    Cmd(Vec<String>),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::From { image, stage } => write!(f, "FROM {} AS {}", image, stage),
            Instruction::User(user) => write!(f, "USER {}", user),
            Instruction::Workdir(dir) => write!(f, "WORKDIR {}", dir),
            Instruction::Env { key, value } => write!(f, "ENV {}={}", key, quote(value)),
            Instruction::Copy {
                from,
                chown,
                src,
                dest,
            } => {
                f.write_str("COPY")?;
                if let Some(from) = from {
                    write!(f, " --from={}", from)?;
                }
                if let Some(chown) = chown {
                    write!(f, " --chown={}", chown)?;
                }
                write!(f, " {} {}", src, dest)
            }
            Instruction::Run(cmd) => write!(f, "RUN {}", cmd),
            Instruction::Cmd(argv) => {
                let parts: Vec<String> = argv.iter().map(|a| quote(a)).collect();
                write!(f, "CMD [{}]", parts.join(", "))
            }
        }
    }
}

/// JSON-style double quoting, valid for both ENV values and exec-form arrays.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub target: BuildTarget,
    pub instructions: Vec<Instruction>,
}

impl Stage {
    /// The stage's default command, if any.
    pub fn command(&self) -> Option<&[String]> {
        self.instructions.iter().rev().find_map(|i| match i {
            Instruction::Cmd(argv) => Some(argv.as_slice()),
            _ => None,
        })
    }
}

/// Where the artifact lives in each stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath {
    pub name: String,
    pub target_triple: String,
    /// Relative to the builder working directory.
    pub relative: String,
    pub builder: String,
    pub runtime: String,
}

impl ArtifactPath {
    pub fn new(build: &BuildConfig, name: &str) -> Self {
        Self {
            name: name.to_string(),
            target_triple: build.target_triple.clone(),
            relative: build.artifact_rel_path(name),
            builder: build.builder_artifact_path(name),
            runtime: build.runtime_artifact_path(name),
        }
    }

    /// Default command for an image built to `target`: the artifact, no arguments.
    pub fn command(&self, target: BuildTarget) -> Vec<String> {
        match target {
            BuildTarget::Dev => vec![format!("./{}", self.relative)],
            BuildTarget::Minimal => vec![self.runtime.clone()],
        }
    }
}

/// `cargo build` arguments for the compile stage, shared with host builds.
pub fn cargo_build_args(build: &BuildConfig, source: &SourceTree) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--release".to_string(),
        "--target".to_string(),
        build.target_triple.clone(),
    ];
    if source.has_lockfile {
        args.push("--locked".to_string());
    }
    if source.needs_bin_flag() {
        args.push("--bin".to_string());
        args.push(source.artifact.clone());
    }
    args
}

/// Shell command installing the certificate bundle on the runtime base.
pub fn cert_install_command(runtime_image: &str, package: &str) -> String {
    let base = runtime_image
        .rsplit('/')
        .next()
        .unwrap_or(runtime_image)
        .split([':', '@'])
        .next()
        .unwrap_or_default();
    match base {
        "debian" | "ubuntu" => format!(
            "apt-get update && apt-get install -y --no-install-recommends {} && rm -rf /var/lib/apt/lists/*",
            package
        ),
        _ => format!("apk --no-cache add {}", package),
    }
}

/// The complete two-stage recipe for one source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub artifact: ArtifactPath,
    pub stages: Vec<Stage>,
}

impl Recipe {
    pub fn new(build: &BuildConfig, source: &SourceTree) -> Self {
        let artifact = ArtifactPath::new(build, &source.artifact);

        let mut cargo = vec!["cargo".to_string()];
        cargo.extend(cargo_build_args(build, source));

        let compile = Stage {
            target: BuildTarget::Dev,
            instructions: vec![
                Instruction::From {
                    image: build.builder_image.clone(),
                    stage: BuildTarget::Dev.stage_name().to_string(),
                },
                Instruction::User(build.build_user.clone()),
                Instruction::Workdir(build.builder_workdir.clone()),
                Instruction::Env {
                    key: "RUSTFLAGS".to_string(),
                    value: STATIC_RUSTFLAGS.to_string(),
                },
                Instruction::Copy {
                    from: None,
                    chown: Some(build.chown()),
                    src: ".".to_string(),
                    dest: "./".to_string(),
                },
                Instruction::Run(cargo.join(" ")),
                Instruction::Cmd(artifact.command(BuildTarget::Dev)),
            ],
        };

        let package = Stage {
            target: BuildTarget::Minimal,
            instructions: vec![
                Instruction::From {
                    image: build.runtime_image.clone(),
                    stage: BuildTarget::Minimal.stage_name().to_string(),
                },
                Instruction::Run(cert_install_command(
                    &build.runtime_image,
                    &build.cert_package,
                )),
                Instruction::Copy {
                    from: Some(BuildTarget::Dev.stage_name().to_string()),
                    chown: None,
                    src: artifact.builder.clone(),
                    dest: artifact.runtime.clone(),
                },
                Instruction::Cmd(artifact.command(BuildTarget::Minimal)),
            ],
        };

        Self {
            artifact,
            stages: vec![compile, package],
        }
    }

    pub fn stage(&self, target: BuildTarget) -> Option<&Stage> {
        self.stages.iter().find(|s| s.target == target)
    }

    /// Render as a Dockerfile.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# Generated by slipway. Build targets: ");
        let names: Vec<&str> = self.stages.iter().map(|s| s.target.stage_name()).collect();
        out.push_str(&names.join(", "));
        out.push('\n');

        for stage in &self.stages {
            out.push('\n');
            for instruction in &stage.instructions {
                out.push_str(&instruction.to_string());
                out.push('\n');
            }
        }
        out
    }
}
