//! # patchgate
//!
//! HTTP service that applies authorized, format-preserving YAML patches to
//! configured git repositories.
//!
//! ## Usage
//!
//! ```text
//! patchgate --config config.yaml --address 0.0.0.0:8080
//! ```
//!
//! Every flag can also be set through its `PATCHGATE_*` environment
//! variable. Logs go to stderr; `RUST_LOG` overrides the default filter.

use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use patchgate_gateway::{router, AppState, AuthenticationProvider, Config};
use patchgate_policy::{Authorizer, PolicyBundle, RulePolicy};
use patchgate_submit::{CliGit, GitRepository, Pipeline};
use patchgate_workspace::Executor;

/// Timeout for fetching signing keys from the identity provider.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Patch YAML files in git repositories over HTTP.
#[derive(Debug, Parser)]
#[command(name = "patchgate", version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "PATCHGATE_ADDRESS", default_value = "0.0.0.0:8080")]
    address: SocketAddr,

    /// Service configuration file.
    #[arg(short, long, env = "PATCHGATE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Policy bundle file. The built-in bundle is used when omitted.
    #[arg(long, env = "PATCHGATE_POLICY")]
    policy: Option<PathBuf>,

    /// Log at debug level, including authorization inputs.
    #[arg(short, long, env = "PATCHGATE_VERBOSE")]
    verbose: bool,

    #[arg(long, env = "PATCHGATE_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.with_ansi(std::io::stderr().is_terminal()).init(),
    }
}

fn load_policy(path: Option<&Path>) -> Result<PolicyBundle> {
    match path {
        Some(path) => PolicyBundle::from_file(path)
            .with_context(|| format!("loading policy bundle {}", path.display())),
        None => Ok(PolicyBundle::default()),
    }
}

async fn build_state(cli: &Cli) -> Result<AppState> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let bundle = load_policy(cli.policy.as_deref())?;
    let policy = RulePolicy::from_bundle(&bundle).context("compiling policy bundle")?;

    let client = reqwest::Client::builder()
        .timeout(DISCOVERY_TIMEOUT)
        .build()
        .context("building HTTP client")?;
    let authentication =
        AuthenticationProvider::from_config(&config.authentication_provider, client)
            .await
            .context("setting up authentication provider")?;

    let git: Arc<dyn GitRepository> = Arc::new(CliGit::default());
    let executor = Executor::new(bundle.allowed_extensions.iter().cloned());

    Ok(AppState {
        config: Arc::new(config),
        authentication: Arc::new(authentication),
        authorizer: Authorizer::new(policy),
        pipeline: Arc::new(Pipeline::new(git, executor)),
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            tracing::warn!("could not register signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let state = build_state(&cli).await?;
    tracing::info!(
        repositories = state.config.repositories.len(),
        provider = state.authentication.name(),
        "configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(cli.address)
        .await
        .with_context(|| format!("binding {}", cli.address))?;
    tracing::info!(address = %cli.address, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("serving HTTP")?;

    tracing::info!("shut down");
    Ok(())
}
