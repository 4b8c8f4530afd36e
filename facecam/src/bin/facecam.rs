//! Face detection web server.
//!
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use env_logger::{Env, TimestampPrecision};
use facecam::{
    config::Args, endpoints::AppState, meter::spawn_meter_logger, router::build_app,
    spa::SpaBundle,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let config = Args::parse().into_config()?;
    log::debug!("Configuration: {config:?}");

    let state = Arc::new(AppState::from_config(&config)?);
    let bundle = SpaBundle::detect(&config.static_dir);
    let app = build_app(state, bundle);

    spawn_meter_logger();

    // Serve HTTP server
    let server = axum::Server::try_bind(&config.addr)?.serve(app.into_make_service());
    log::info!("Server is running on port {}", server.local_addr().port());
    server.await?;

    Ok(())
}
