use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use mcp_link::ServeConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-link", version, about = "Calculator tool gateway with an SSE transport")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Host to listen on
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// OpenAPI document served at /openapi.yaml
    #[arg(long, default_value = "openapi.yaml")]
    spec_file: PathBuf,

    /// Seconds allowed for draining after SIGINT / SIGTERM
    #[arg(long, default_value_t = 5)]
    shutdown_timeout: u64,
}

impl From<ServeArgs> for ServeConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            spec_file: args.spec_file,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => mcp_link::serve(args.into()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
