use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::{env, fs};

use thiserror::Error;
use tracing::{info, warn};

use crate::tickets::issuance::DEFAULT_MAX_ATTEMPTS;
use crate::tickets::signing::{TicketSigner, WeakSecret};

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::SecurityHeaders;

const DEFAULT_PORT: &str = "3001";
const DEFAULT_DB_MAX_CONNECTIONS: &str = "5";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read {path}: {source}")]
    SecretFile {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    WeakSecret(#[from] WeakSecret),
}

/// Process-wide settings, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub port: u16,
    pub max_issue_attempts: u32,
    pub signer: Arc<TicketSigner>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if database_url.is_none() {
            warn!("DATABASE_URL not set, tickets will be kept in memory only");
        }

        let max_issue_attempts: u32 = parse_or(
            &lookup,
            "TICKET_MAX_ATTEMPTS",
            &DEFAULT_MAX_ATTEMPTS.to_string(),
        )?;
        if max_issue_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "TICKET_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url,
            db_max_connections: parse_or(
                &lookup,
                "DB_MAX_CONNECTIONS",
                DEFAULT_DB_MAX_CONNECTIONS,
            )?,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            max_issue_attempts,
            signer: Arc::new(load_signer(&lookup)?),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

// The inline variable wins over the file so local runs need no secret mount.
fn load_signer<F>(lookup: &F) -> Result<TicketSigner, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(secret) = lookup("TICKET_HMAC_SECRET") {
        return Ok(TicketSigner::new(secret.trim())?);
    }

    let path = lookup("TICKET_HMAC_SECRET_FILE").ok_or(ConfigError::Missing(
        "TICKET_HMAC_SECRET or TICKET_HMAC_SECRET_FILE",
    ))?;
    let secret = fs::read_to_string(&path).map_err(|source| ConfigError::SecretFile {
        path: path.clone(),
        source,
    })?;
    info!("Loaded ticket signing secret from {path}");
    Ok(TicketSigner::new(secret.trim())?)
}
