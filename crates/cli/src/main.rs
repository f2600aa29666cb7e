mod commands;
mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Airtable-backed forms with webhook-synchronized responses.
#[derive(Parser)]
#[command(
    name = "formsync",
    version,
    about = "Airtable-backed forms with webhook-synchronized responses"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress error output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// JSON file of users, forms and responses to preload
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Show which questions a set of answers makes visible
    Visibility {
        /// Path to the form JSON file
        form: PathBuf,
        /// Path to the answers JSON file
        #[arg(long)]
        answers: PathBuf,
    },

    /// Apply recorded webhook payloads to seed data offline
    Replay {
        /// Path to the seed JSON file
        seed: PathBuf,
        /// Id of the form the payloads belong to
        #[arg(long)]
        form: String,
        /// Path to a JSON array of payloads, or a fetched payload page
        #[arg(long)]
        payloads: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start tokio runtime: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Serve { port, seed } => {
            let config = Config::from_env();
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(serve::start_server(port, seed.as_deref(), config))
                .map_err(|e| format!("server error: {}", e))
        }
        Commands::Visibility { form, answers } => {
            commands::visibility::cmd_visibility(&form, &answers, cli.output)
        }
        Commands::Replay {
            seed,
            form,
            payloads,
        } => {
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(commands::replay::cmd_replay(
                &seed, &form, &payloads, cli.output,
            ))
        }
    };

    if let Err(msg) = result {
        report_error(&msg, cli.output, cli.quiet);
        process::exit(1);
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
