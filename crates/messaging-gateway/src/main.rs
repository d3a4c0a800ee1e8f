mod api;
mod cli;
mod state;

use std::sync::Arc;

use clap::Parser;
use messaging_domain::config::{ConfigSeverity, RuntimeConfig};
use messaging_runtime::Instance;
use sha2::{Digest, Sha256};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    match args.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path) = cli::load_config()?;
            run_server(config).await
        }
        Some(Command::Doctor) => {
            let (config, path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &path)?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, path) = cli::load_config()?;
            if !cli::config::validate(&config, &path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("messaging-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,messaging_runtime=debug")),
        )
        .json()
        .init();
}

async fn run_server(config: RuntimeConfig) -> anyhow::Result<()> {
    tracing::info!("messaging-gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let server = config.server.clone();
    let instance = Arc::new(Instance::builder().config(config).build());
    tracing::info!(instance_id = %instance.id, "instance ready");

    let webhook_token_hash = match std::env::var(&server.webhook_token_env) {
        Ok(token) if !token.is_empty() => {
            tracing::info!(env_var = %server.webhook_token_env, "webhook bearer-token auth enabled");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %server.webhook_token_env,
                "webhook bearer-token auth DISABLED"
            );
            None
        }
    };

    let state = AppState { instance: instance.clone(), webhook_token_hash };
    let app = api::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding to {addr}: {e}"))?;
    tracing::info!(addr = %addr, "messaging-gateway listening");

    let shutdown_instance = instance.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining");
            let report = shutdown_instance.shutdown().await;
            tracing::info!(
                outbound_drained = report.outbound_drained,
                dead_lettered = report.dead_lettered_on_shutdown,
                "shutdown sequence complete"
            );
        })
        .await
        .map_err(|e| anyhow::anyhow!("axum server error: {e}"))?;

    Ok(())
}
