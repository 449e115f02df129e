//! Slipway - two-stage container image builder.
//!
//! Compiles a statically-linked release binary inside a builder image
//! (`dev-image`) and optionally copies it into a minimal runtime image
//! (`minimal-image`).

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use slipway::commands::{self, build::BuildOptions, show::ShowTarget};
use slipway::config::Config;
use slipway::recipe::BuildTarget;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(version, about = "Two-stage container image builder for static Rust servers")]
#[command(
    after_help = "QUICK START:\n  slipway preflight               Check engine and source tree\n  slipway build minimal-image     Build the minimal runtime image\n  slipway build dev-image         Build the builder image only\n  slipway run minimal-image       Run the built server"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Source tree selection shared by most commands.
#[derive(clap::Args)]
struct SourceArgs {
    /// Source tree containing Cargo.toml (default: current directory)
    #[arg(short, long, default_value = ".")]
    source: PathBuf,

    /// Binary to build when the package declares several
    #[arg(long)]
    bin: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetArg {
    /// Builder image; runs the artifact from the build tree
    DevImage,
    /// Runtime image with only the artifact and CA certificates
    MinimalImage,
}

impl From<TargetArg> for BuildTarget {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::DevImage => BuildTarget::Dev,
            TargetArg::MinimalImage => BuildTarget::Minimal,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Docker,
    Podman,
}

impl EngineArg {
    fn as_str(self) -> &'static str {
        match self {
            EngineArg::Docker => "docker",
            EngineArg::Podman => "podman",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image target
    Build {
        /// Which image to build
        #[arg(value_enum)]
        target: TargetArg,

        #[command(flatten)]
        source: SourceArgs,

        /// Image tag (default: <name>:dev or <name>:latest).
        /// minimal-image also tags its compile stage as <repository>:dev
        #[arg(short, long)]
        tag: Option<String>,

        /// Container engine (default: SLIPWAY_ENGINE, then docker, then podman)
        #[arg(long, value_enum)]
        engine: Option<EngineArg>,

        /// Rebuild even if the image is up to date
        #[arg(long)]
        force: bool,

        /// Skip post-build image verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Compile the artifact on the host (no container)
    Compile {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print the generated Dockerfile
    Render {
        #[command(flatten)]
        source: SourceArgs,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a built image's default process
    Run {
        #[arg(value_enum)]
        target: TargetArg,

        /// Image tag (default: from the last build)
        #[arg(short, long)]
        tag: Option<String>,

        #[arg(long, value_enum)]
        engine: Option<EngineArg>,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowCommand,
    },

    /// Run preflight checks
    Preflight {
        #[command(flatten)]
        source: SourceArgs,

        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Remove staged contexts and build receipts
    Clean {
        /// Also remove the built images
        #[arg(long)]
        images: bool,
    },
}

#[derive(Subcommand)]
enum ShowCommand {
    /// Show current configuration
    Config,
    /// Show where the artifact is placed in each image
    Artifact {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Show build status per target
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let base_dir = std::env::current_dir()?;
    let mut config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Build {
            target,
            source,
            tag,
            engine,
            force,
            no_verify,
        } => {
            if let Some(engine) = engine {
                config.engine = Some(engine.as_str().to_string());
            }
            let opts = BuildOptions {
                target: target.into(),
                source: source.source,
                bin: source.bin,
                tag,
                force,
                verify: !no_verify,
            };
            commands::cmd_build(&config, &opts)?;
        }

        Commands::Compile { source } => {
            commands::cmd_compile(&config, &source.source, source.bin.as_deref())?;
        }

        Commands::Render { source, output } => {
            commands::cmd_render(
                &config,
                &source.source,
                source.bin.as_deref(),
                output.as_deref(),
            )?;
        }

        Commands::Run {
            target,
            tag,
            engine,
        } => {
            if let Some(engine) = engine {
                config.engine = Some(engine.as_str().to_string());
            }
            commands::cmd_run(&config, target.into(), tag)?;
        }

        Commands::Show { what } => match what {
            ShowCommand::Config => {
                commands::cmd_show(&config, ShowTarget::Config, &base_dir, None)?;
            }
            ShowCommand::Artifact { source } => {
                commands::cmd_show(
                    &config,
                    ShowTarget::Artifact,
                    &source.source,
                    source.bin.as_deref(),
                )?;
            }
            ShowCommand::Status => {
                commands::cmd_show(&config, ShowTarget::Status, &base_dir, None)?;
            }
        },

        Commands::Preflight { source, strict } => {
            commands::cmd_preflight(&config, &source.source, source.bin.as_deref(), strict)?;
        }

        Commands::Clean { images } => {
            commands::cmd_clean(&config, images)?;
        }
    }

    Ok(())
}
