//! subman
//!
//! Registers this host with a subscription-entitlement server and keeps the
//! repository definitions derived from its entitlements up to date.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use subman_cli::register_cmd::{self, RegisterArgs};
use subman_cli::{HttpsConnector, Session, SessionSettings, info_cmd};
use subman_core::config::load_config;
use subman_core::tracing_init::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "subman", version, about = "Subscription management client")]
struct Cli {
    /// Configuration file (default: $SUBMAN_CONFIG or /etc/rhsm/rhsm.conf)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register this system with the entitlement server
    Register(RegisterArgs),
    /// Unregister this system and remove its certificates
    Unregister,
    /// Fetch entitlement certificates again and regenerate repositories
    Refresh,
    /// Show compliance status
    Status,
    /// Show the identity of this system
    Identity,
    /// Show client and server versions
    Version,
    /// Show the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("subman=info", cli.log_json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(mut cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "Starting subman");

    if matches!(cli.command, Commands::Config) {
        return info_cmd::config(&config);
    }

    // Bad credential combinations are reported before any TLS setup.
    let registration = match &mut cli.command {
        Commands::Register(args) => Some(std::mem::take(args).validate()?),
        _ => None,
    };

    let connector = HttpsConnector::from_config(&config)?;
    let mut session = Session::open(connector, SessionSettings::from_config(&config))?;

    match cli.command {
        Commands::Register(_) => {
            if let Some(registration) = registration {
                register_cmd::register(&mut session, registration).await?;
            }
        }
        Commands::Unregister => register_cmd::unregister(&mut session).await?,
        Commands::Refresh => register_cmd::refresh(&mut session).await?,
        Commands::Status => info_cmd::status(&session).await?,
        Commands::Identity => info_cmd::identity(&session).await?,
        Commands::Version => info_cmd::version(&session).await?,
        Commands::Config => info_cmd::config(&config)?,
    }
    Ok(())
}
