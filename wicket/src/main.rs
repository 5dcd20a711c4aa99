// Copyright 2026 The Wicket Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use wicket::auth::MetadataProvider;
use wicket::config::{Cli, Config};
use wicket::server::{build_router, AppState};
use wicket::tools::{MockWeatherHandler, ToolRegistry};
use wicket::upstream::WsConnector;

use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::from_cli(&cli) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        mode = %config.mode,
        target = %config.target_host,
        "wicket starting"
    );

    let mut tools = ToolRegistry::new();
    tools.register("get_weather", Arc::new(MockWeatherHandler));
    tracing::info!(tools = tools.len(), "tool registry built");

    let state = AppState {
        config: config.clone(),
        credentials: Arc::new(MetadataProvider::new()),
        connector: Arc::new(WsConnector),
        tools: Arc::new(tools),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "wicket listening");

    axum::serve(listener, build_router(state))
        .await
        .expect("server error");
}
