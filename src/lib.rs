//! Library root for `beebot`.
//!
//! Beebot is a Slack bot that keeps score of emoji reactions:
//! - Records every reaction one user gives another in a counter store
//! - Answers `showme` commands with leaderboards of given and received reactions
//! - Stays connected by reconnecting with a linear backoff
//!
//! The bot integrates with Slack for chat and name lookups, and SurrealDB for
//! storage. The architecture is built around extensible traits that allow for
//! different implementations of each service.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the beebot runtime:
/// - Initializes the crypto provider
/// - Opens the counter store, creating it (or recreating it with `reset_db`)
/// - Creates the runtime context with store, directory, and chat clients
/// - Runs the connection supervisor until a fatal error
pub async fn start(config: Config, reset_db: bool) -> Void {
    info!("Starting beebot ...");

    // Start the crypto provider.
    crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("A crypto provider was already installed."))?;

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config, reset_db).await?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
