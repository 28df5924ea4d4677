mod client;
mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pacer",
    about = "Persistent paced-action scheduler with auto-pause and auto-resume",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .pacer/ or .git/)
    #[arg(long, global = true, env = "PACER_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Address of a running `pacer run` (default: http://127.0.0.1:<server.port>)
    #[arg(long, global = true, env = "PACER_URL")]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .pacer/config.yaml
    Init,

    /// Run the scheduler and its HTTP control surface
    Run {
        /// Port to listen on (default: server.port from config; 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,

        /// Keep state in memory only; nothing survives the process
        #[arg(long)]
        ephemeral: bool,

        /// Don't fetch the remote word list
        #[arg(long)]
        no_refresh: bool,

        /// Seed for payload selection and delays
        #[arg(long, hide = true)]
        seed: Option<u64>,
    },

    /// Show the running scheduler's status
    Status,

    /// Pause until resumed
    Pause,

    /// Resume now (keeps the repetition count)
    Resume,

    /// Pause if running, resume if paused
    Toggle,

    /// Change the auto-pause settings (blank or 0 disables)
    Set {
        /// Auto-pause after this many repetitions
        #[arg(long, value_name = "N")]
        pause_after: Option<String>,

        /// Auto-resume this many minutes after an auto-pause
        #[arg(long, value_name = "MINUTES")]
        resume_after: Option<String>,
    },

    /// Dump the persisted scheduler record (works while stopped)
    State,

    /// Fetch and print the remote word list once
    Words {
        /// Override words.url from config
        #[arg(long)]
        from: Option<String>,
    },

    /// Inspect and validate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root_path = cli.root.as_deref();
    let root = root::resolve_root(root_path);
    let url = cli.url.as_deref();

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Run {
            port,
            ephemeral,
            no_refresh,
            seed,
        } => cmd::run::run(
            &root,
            cmd::run::RunOptions {
                port,
                ephemeral,
                no_refresh,
                seed,
            },
        ),
        Commands::Status => cmd::control::status(&root, url, cli.json),
        Commands::Pause => cmd::control::pause(&root, url, cli.json),
        Commands::Resume => cmd::control::resume(&root, url, cli.json),
        Commands::Toggle => cmd::control::toggle(&root, url, cli.json),
        Commands::Set {
            pause_after,
            resume_after,
        } => cmd::control::set(
            &root,
            url,
            pause_after.as_deref(),
            resume_after.as_deref(),
            cli.json,
        ),
        Commands::State => cmd::state::run(&root, cli.json),
        Commands::Words { from } => cmd::words::run(&root, from.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
