// src/main.rs
mod api;
mod auth;
mod config;
mod db;
mod error;
mod models;
mod orders;
mod portfolio;
mod quote;
mod views;

use crate::api::AppState;
use crate::auth::SessionKeys;
use crate::config::Config;
use crate::quote::IexClient;
use env_logger::{Builder, Env};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match db::init(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    info!("Connected to database...");

    let state = AppState {
        pool,
        quotes: Arc::new(IexClient::new(&config.quote_api_url, &config.api_key)),
        sessions: SessionKeys::new(config.session_secret.clone(), config.session_ttl),
    };

    info!("Starting the stock trader application...");
    let api = api::routes(state);

    info!("Server running on http://{}", config.listen_addr);
    warp::serve(api).run(config.listen_addr).await;
}
