//! Parley CLI - Command-line tools for the Parley chat SDK.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

/// Parley - Chat event tooling
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded event stream through a client
    Replay {
        /// JSON-lines file with one event frame per line
        file: PathBuf,
        /// Id of the connected user
        #[arg(short, long)]
        user: Option<String>,
        /// Channels to watch before replaying (type:id)
        #[arg(short, long)]
        watch: Vec<String>,
        /// Client configuration file (JSON or YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the known event kinds
    Kinds,

    /// Show version information
    Version,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    /// Human-readable output
    Pretty,
    /// One JSON object per line
    Json,
}

fn init_logging(verbose: u8, format: LogFormat) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("parley={level},parley_realtime={level}").into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let result = match cli.command {
        Commands::Replay {
            file,
            user,
            watch,
            config,
            json,
        } => commands::replay(&commands::ReplayOptions {
            file,
            user,
            watch,
            config,
            json,
        }),
        Commands::Kinds => {
            commands::kinds();
            Ok(())
        }
        Commands::Version => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
