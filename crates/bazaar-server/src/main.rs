//! # bazaar-server
//!
//! HTTP service for the Bazaar catalog.
//!
//! This binary provides:
//! - **Token authority** issuing signed, short-lived bearer tokens
//! - **Access gate** checking credentials and role capabilities per route
//! - **Review engine** keeping product ratings consistent with their reviews
//! - **Catalog read path** for categories, products and reviews

mod api;
mod auth;
mod config;
mod error;

use std::sync::Arc;

use anyhow::Context;
use bazaar_shared::constants::APP_NAME;
use bazaar_shared::password::{Argon2Verifier, PasswordVerifier};
use bazaar_shared::{RoleFlags, TokenAuthority};
use bazaar_store::{DbPool, NewUser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::auth::AccessGate;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,bazaar_server=debug,bazaar_store=debug")
            }),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env()?;
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let tokens = match &config.token_signing_key {
        Some(seed) => TokenAuthority::from_secret_bytes(seed),
        None => {
            warn!("TOKEN_SIGNING_KEY not set, using an ephemeral key; tokens die with the process");
            TokenAuthority::ephemeral()
        }
    };
    info!(authority = ?tokens, "Token authority ready");

    let verifier: Arc<dyn PasswordVerifier> = Arc::new(Argon2Verifier::default());
    let gate = AccessGate::new(tokens, Arc::clone(&verifier), config.token_ttl)?;

    let pool = DbPool::open(&config.database_path, config.db_timeout, config.pool_size)
        .with_context(|| format!("opening database at {}", config.database_path.display()))?;

    if let Some((username, password)) = &config.bootstrap_admin {
        bootstrap_admin(&pool, verifier.as_ref(), username, password)?;
    }

    let http_addr = config.http_addr;
    let app_state = AppState {
        pool,
        gate,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Create the configured admin account unless the username is taken.
fn bootstrap_admin(
    pool: &Arc<DbPool>,
    verifier: &dyn PasswordVerifier,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let db = pool.get()?;
    if db.find_user_by_username(username)?.is_some() {
        info!(%username, "Bootstrap admin already present");
        return Ok(());
    }

    let id = db.create_user(&NewUser {
        first_name: "Admin".into(),
        last_name: String::new(),
        username: username.to_string(),
        email: format!("{username}@localhost"),
        password_verifier: verifier.hash(password)?,
        roles: RoleFlags::admin(),
    })?;
    info!(user_id = id, %username, "Bootstrap admin created");
    Ok(())
}
