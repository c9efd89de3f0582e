use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use topoverify::config::{Config, LogFormat, LoggingConfig};
use topoverify::verify::Check;

#[derive(Parser)]
#[command(
    name = "topoverify",
    about = "Discover and verify an emulated mobile network topology",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults: $TOPOVERIFY_CONFIG, ./topoverify.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON output for machine parsing
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List every component with its address and interfaces
    Details,

    /// Ping each slice's user-plane function from every UE tunnel
    Latency,

    /// Measure throughput between every UE and its user-plane functions
    Bandwidth,

    /// Verify the path of every UE slice with captures on each hop
    Routing,
}

impl From<Commands> for Check {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Details => Check::Details,
            Commands::Latency => Check::Latency,
            Commands::Bandwidth => Check::Bandwidth,
            Commands::Routing => Check::Routing,
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    // stdout is reserved for results
    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    // The configured subscriber depends on the config, so loading logs
    // through a plain stderr one.
    let bootstrap = tracing_subscriber::fmt().with_writer(std::io::stderr).finish();
    let config = tracing::subscriber::with_default(bootstrap, || {
        Config::load_or_default(cli.config.as_deref())
    })?;
    init_tracing(&config.logging);

    let check = Check::from(command);
    let grace = config.capture.stop_grace() + config.capture.drain_timeout();

    let rows = tokio::select! {
        rows = topoverify::run(config, check) => rows?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, stopping captures");
            // Dropped sessions stop their captures in the background.
            tokio::time::sleep(grace).await;
            std::process::exit(130);
        }
    };

    if cli.json {
        println!("{}", rows.json()?);
    } else {
        println!("\n=== {} ===", check);
        print!("{}", rows.table());
    }

    Ok(())
}
