//! Freightdesk CLI - User/order identity reconciliation.
//!
//! # Usage
//!
//! ```bash
//! # Report mismatched keys, duplicate emails and dangling order references
//! fd-cli detect
//! fd-cli detect --json
//!
//! # Move users stored under the wrong key (asks before each repair)
//! fd-cli fix-mismatches
//!
//! # Merge users sharing an email
//! fd-cli fix-duplicates
//!
//! # Repoint orders between two existing users
//! fd-cli repoint --from user_123 --to kT3pQ9vX2mL8nR4sW6yZ1aB5cD7e
//!
//! # Show the signed-in operator
//! fd-cli whoami
//! ```
//!
//! Fix runs assume exclusive write access to the users and orders
//! collections. Do not run two at once, and do not run one while the app is
//! creating accounts.
//!
//! # Environment Variables
//!
//! See `freightdesk_reconcile::config`. `RUST_LOG` overrides the default
//! log filter, `LOG_FORMAT=json` switches to structured logs.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use freightdesk_reconcile::ReconcileConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod terminal;

#[derive(Parser)]
#[command(name = "fd-cli")]
#[command(author, version, about = "Freightdesk identity reconciliation tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for inconsistencies without changing anything
    Detect {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move users whose storage key differs from their auth identifier
    FixMismatches {
        /// Approve every repair without prompting
        #[arg(short, long)]
        yes: bool,
    },
    /// Merge users that share a normalized email
    FixDuplicates {
        /// Approve every repair without prompting (ambiguous groups are skipped)
        #[arg(short, long)]
        yes: bool,
    },
    /// Repoint every order of one user to another existing user
    Repoint {
        /// User key the orders currently reference
        #[arg(long)]
        from: String,

        /// User key the orders should reference
        #[arg(long)]
        to: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Find user records by email
    Lookup {
        /// Email address (matched exactly and normalized)
        #[arg(short, long)]
        email: String,
    },
    /// Show the signed-in operator
    Whoami,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ReconcileConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "freightdesk_reconcile=info,fd_cli=info".into());

    // Logs go to stderr so reports on stdout stay pipeable
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    // reqwest and sentry enable different rustls backends; pick one
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let config = ReconcileConfig::from_env();

    let sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing(config.as_ref().is_ok_and(|c| c.json_logs));

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        // process::exit skips destructors, flush pending events first
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ReconcileConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Detect { json } => commands::detect::run(config, json).await?,
        Commands::FixMismatches { yes } => commands::fix::mismatches(config, yes).await?,
        Commands::FixDuplicates { yes } => commands::fix::duplicates(config, yes).await?,
        Commands::Repoint { from, to, yes } => {
            commands::repoint::run(config, &from, &to, yes).await?;
        }
        Commands::Lookup { email } => commands::lookup::run(config, &email).await?,
        Commands::Whoami => commands::whoami::run(config).await?,
    }
    Ok(())
}
