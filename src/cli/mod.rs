//! Command line surface. Each command loads and validates configuration
//! before it touches the browser.

use clap::{Parser, Subcommand};
use engage_core::CoreError;
use std::path::PathBuf;
use std::process::ExitCode;

pub mod auth;
pub mod browse;
pub mod context;
pub mod init;
pub mod run;

use context::Overrides;

#[derive(Parser, Debug)]
#[command(name = "engagerunner")]
#[command(about = "Likes and hearts comments on your own posts, one scenario at a time")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: $ENGAGERUNNER_CONFIG or ./config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger file recording processed comments
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Chrome remote debugging port
    #[arg(long, global = true)]
    pub cdp_port: Option<u16>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example configuration file
    Init {
        /// Where to write it (default: the configuration path)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
    /// List posts from the profile's content source
    ListPosts {
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(short, long)]
        max: Option<usize>,
    },
    /// Print the comments of one post
    Read {
        url: String,
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(short, long)]
        max: Option<usize>,
    },
    /// Execute a scenario
    Run {
        #[arg(short, long)]
        scenario: String,
        #[arg(short, long)]
        profile: Option<String>,
        /// Report what would be done without acting or recording anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Open Chrome on the profile so you can sign in
    Auth {
        #[arg(short, long)]
        profile: Option<String>,
    },
}

pub async fn run(cli: Cli) -> Result<ExitCode, CoreError> {
    let Cli {
        config,
        state_file,
        cdp_port,
        command,
        ..
    } = cli;
    let overrides = Overrides {
        config,
        state_file,
        cdp_port,
    };

    match command {
        Commands::Init { output, force } => init::run(&overrides, output, force),
        Commands::ListPosts { profile, max } => {
            browse::list_posts(&overrides, profile.as_deref(), max).await
        }
        Commands::Read { url, profile, max } => {
            browse::read(&overrides, &url, profile.as_deref(), max).await
        }
        Commands::Run {
            scenario,
            profile,
            dry_run,
        } => run::run(&overrides, &scenario, profile.as_deref(), dry_run).await,
        Commands::Auth { profile } => auth::run(&overrides, profile.as_deref()).await,
    }
}
