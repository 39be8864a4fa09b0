mod classify;
mod config;
mod migrate;
mod serve;
mod store;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::config::LureConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Phishing-simulation result tracking.
#[derive(Parser)]
#[command(name = "lure", version, about = "Phishing-simulation result tracking")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Configuration file (defaults to ./lure.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking server and admin API
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
        /// Data file to load at startup and write on shutdown
        #[arg(long)]
        data: Option<PathBuf>,
        /// TLS certificate file (PEM format). Requires the `tls` feature.
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// TLS private key file (PEM format). Requires the `tls` feature.
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Check whether a hit would be classified as a gateway or prescanner
    Classify {
        /// Source IP of the hit
        #[arg(long, default_value = "")]
        ip: String,
        /// User-Agent of the hit
        #[arg(long, default_value = "")]
        user_agent: String,
    },

    /// Add the is_screened event column to a data file written by an older release
    Migrate {
        /// Path to the JSON data file (rewritten in place)
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let Cli {
        output,
        quiet,
        config,
        command,
    } = cli;
    let config_path = config.as_deref();

    match command {
        Commands::Serve {
            port,
            data,
            tls_cert,
            tls_key,
        } => {
            // Both TLS flags or neither
            if tls_cert.is_some() != tls_key.is_some() {
                eprintln!("error: --tls-cert and --tls-key must both be provided");
                process::exit(1);
            }
            let mut config = load_config(config_path, output, quiet);
            if let Some(port) = port {
                config.server.port = port;
            }
            if data.is_some() {
                config.storage.data_file = data;
            }
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config, tls_cert, tls_key)) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
        Commands::Classify { ip, user_agent } => {
            let config = load_config(config_path, output, quiet);
            classify::cmd_classify(&config, &ip, &user_agent, output, quiet);
        }
        Commands::Migrate { file } => {
            migrate::cmd_migrate(&file, output, quiet);
        }
    }
}

/// Load `--config` or `lure.toml`, exiting on error. Only the commands that
/// read configuration call this.
fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> LureConfig {
    match LureConfig::load(path) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the defaults.
fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Print an error to stderr in the selected output format.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
