//! consul-sync - headless daemon
//!
//! Registers the local service with the Consul agent, keeps the registration
//! alive across agent restarts and resolves access points from the catalog.

#![allow(clippy::print_stdout, reason = "CLI tool outputs to stdout")]

use anyhow::Result;
use clap::Parser;
use consul_sync_core::agent::HttpConnector;
use consul_sync_core::api::ApiCache;
use consul_sync_core::events::EventBus;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = consul_sync_core::load_config(&cli.config)?;
    if cli.production {
        config.production = true;
    }
    if let Some(host) = cli.host_hostname.clone() {
        config.host_hostname = Some(host);
    }
    if cli.use_default_service_socket {
        config.use_default_service_socket = true;
    }

    let events = EventBus::new();
    let apis = ApiCache::new(Arc::new(HttpConnector::new()), events.clone());
    let api = apis.get(&config).await?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            commands::run(&config, api, events, cli.register_type, cli.no_register).await
        },
        Commands::Register => commands::register(&api, cli.register_type).await,
        Commands::Deregister { id } => commands::deregister(&api, id.as_deref()).await,
        Commands::AccessPoints => commands::access_points(&config, &api, events).await,
    }
}
