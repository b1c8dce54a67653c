use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod host;

#[derive(Parser)]
#[command(name = "nterrupt", version, about = "Nterrupt app blocker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block control
    Block {
        #[command(subcommand)]
        action: commands::block::BlockAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the blocker daemon, reading control lines from stdin
    Run,
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("NTERRUPT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Block { action } => commands::block::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Run => commands::run::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
