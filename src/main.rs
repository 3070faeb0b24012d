use clap::{Parser, Subcommand};
use logsink::cli::run::RunOptions;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logsink")]
#[command(about = "Ship flattened log records to a columnar store in batches", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read newline-delimited records and deliver them to the output plugin
    Run {
        /// Input file (defaults to stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Records per flush
        #[arg(long, default_value_t = 256)]
        chunk_records: usize,

        /// Attempts per chunk when the plugin asks for a retry
        #[arg(long, default_value_t = 5)]
        max_retries: u32,

        /// Keep rows in memory instead of writing them to the store
        #[arg(long)]
        dry_run: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logsink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = logsink::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run {
            input,
            chunk_records,
            max_retries,
            dry_run,
        }) => {
            let options = RunOptions {
                input,
                chunk_records,
                max_retries,
                dry_run,
            };
            logsink::cli::run::run(config_path, options).await?;
        }
        None => {
            logsink::cli::run::run(config_path, RunOptions::default()).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                logsink::cli::config::init(stdout)?;
            }
        },
    }

    Ok(())
}
