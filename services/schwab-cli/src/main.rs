//! Schwab API CLI
//!
//! Operator entry point for the client library:
//! 1. Loads config and app credentials
//! 2. Seeds the token file from an authorization redirect (`--authorize`)
//! 3. Runs the client in its scope, keeping tokens fresh until SIGINT/SIGTERM

mod config;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use schwab_auth::{TokenStore, TokenStoreOptions};
use schwab_client::{ApiResponse, Client};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Command line flags
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<String>,
    /// Redirect URL or bare authorization code
    authorize: Option<String>,
    /// Print the Prometheus exposition on exit
    metrics: bool,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = Args::default();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    parsed.config = Some(iter.next().context("--config needs a path")?.clone());
                }
                "--authorize" => {
                    parsed.authorize = Some(
                        iter.next()
                            .context("--authorize needs the redirect URL or code")?
                            .clone(),
                    );
                }
                "--metrics" => parsed.metrics = true,
                other => anyhow::bail!("unknown argument: {other}"),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON output with LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let args = Args::parse(&args)?;
    info!("starting schwab-cli");

    let prometheus = metrics::install_recorder()?;

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let app = config.credentials()?;

    info!(
        base_url = %config.client.base_url,
        tokens = %config.tokens.path.display(),
        shared_transport = config.client.use_shared_transport,
        "configuration loaded"
    );

    let options = TokenStoreOptions::default();
    let tokens_path = config.tokens.path.clone();
    let store = match args.authorize.as_deref() {
        Some(redirect) => {
            let code = schwab_auth::parse_callback_code(redirect)?;
            TokenStore::authorize(
                tokens_path,
                app,
                &code,
                &config.app.callback_url,
                options,
            )
            .await
            .context("authorization code exchange failed")?
        }
        None => match TokenStore::load(tokens_path, app.clone(), options).await {
            Ok(store) => store,
            Err(schwab_auth::Error::NotFound(msg)) => {
                let url = schwab_auth::authorization_url(
                    schwab_auth::AUTHORIZE_ENDPOINT,
                    app.key.expose(),
                    &config.app.callback_url,
                )?;
                eprintln!("No tokens yet. Open this URL, sign in, then rerun with --authorize <redirect URL>:");
                eprintln!("{url}");
                anyhow::bail!("{msg}");
            }
            Err(e) => return Err(e).context("failed to load tokens"),
        },
    };

    let client = Client::new(config.client_config(), Arc::new(store))?;
    client.scoped(run).await??;

    if args.metrics {
        print!("{}", prometheus.render());
    }
    info!("schwab-cli stopped");
    Ok(())
}

/// Verify the session with one call, then hold the scope open until shutdown.
async fn run(client: Client) -> Result<()> {
    let response = client
        .account_linked()
        .await
        .context("account lookup failed")?;
    log_accounts(&response);

    shutdown_signal().await;
    Ok(())
}

fn log_accounts(response: &ApiResponse) {
    if !response.is_success() {
        warn!(status = response.status.as_u16(), "account lookup rejected");
        return;
    }
    let accounts = response
        .json()
        .and_then(|v| v.as_array())
        .map_or(0, Vec::len);
    info!(accounts, "linked accounts loaded");
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
