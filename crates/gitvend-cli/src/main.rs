mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "gitvend", about = "Build a minimal, relocatable, reproducible Git bundle")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, fetch, compile, finish, verify, and publish a bundle
    Build {
        /// Configuration file (default: ./gitvend.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Build this tag instead of the latest stable release
        #[arg(long)]
        tag: Option<String>,
        /// Working directory to use instead of a throwaway temp directory
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Where to publish the bundle (default: dist/git-<version>)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Parallel make jobs (default: available parallelism)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Assume the host toolchain is already installed
        #[arg(long)]
        skip_host_deps: bool,
    },
    /// Print the latest stable upstream tag
    Resolve {
        /// Configuration file (default: ./gitvend.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check an existing bundle's version and clone over HTTPS
    Verify {
        /// Bundle root (the directory holding the `git` launcher)
        bundle: PathBuf,
        /// Configuration file (default: ./gitvend.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Expected tag (default: the latest stable release)
        #[arg(long)]
        tag: Option<String>,
    },
}

/// A token that fires on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupted, cancelling");
                trigger.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Commands::Build {
            config,
            tag,
            work_dir,
            output,
            jobs,
            skip_host_deps,
        } => {
            let args = commands::BuildArgs {
                config,
                tag,
                work_dir,
                output,
                jobs,
                skip_host_deps,
            };
            commands::build(args, &cancel).await?
        }
        Commands::Resolve { config } => commands::resolve(config.as_deref(), &cancel).await?,
        Commands::Verify {
            bundle,
            config,
            tag,
        } => commands::verify(&bundle, config.as_deref(), tag.as_deref(), &cancel).await?,
    }

    Ok(())
}
