use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// Server settings, read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path = std::env::var("CHATTER_DB_PATH").unwrap_or_else(|_| "chatter.db".into());
        let host = std::env::var("CHATTER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("CHATTER_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("CHATTER_PORT must be a port number")?;
        let token_ttl_hours: i64 = std::env::var("CHATTER_TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .context("CHATTER_TOKEN_TTL_HOURS must be an integer")?;
        if token_ttl_hours <= 0 {
            anyhow::bail!("CHATTER_TOKEN_TTL_HOURS must be positive");
        }

        Ok(Self {
            db_path: PathBuf::from(db_path),
            host,
            port,
            token_ttl_hours,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}
