//! Service configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::store::StoreOptions;

#[derive(Debug, Clone)]
pub struct Config {
    /// `BIND_ADDR` (default: 0.0.0.0:3000)
    pub bind_addr: SocketAddr,
    /// `STORE_LATENCY_MS` and `STORE_TIMEOUT_MS`
    pub store: StoreOptions,
    /// `QUERY_DEPTH_LIMIT` (default: 5)
    pub depth_limit: usize,
    /// `SEED_DEMO_DATA` (default: false)
    pub seed_demo_data: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = StoreOptions::default();
        let latency_ms = parse(&lookup, "STORE_LATENCY_MS", defaults.latency.as_millis() as u64)?;
        let timeout_ms = parse(&lookup, "STORE_TIMEOUT_MS", defaults.timeout.as_millis() as u64)?;

        Ok(Self {
            bind_addr: parse(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            store: StoreOptions {
                latency: Duration::from_millis(latency_ms),
                timeout: Duration::from_millis(timeout_ms),
            },
            depth_limit: parse(&lookup, "QUERY_DEPTH_LIMIT", 5)?,
            seed_demo_data: parse(&lookup, "SEED_DEMO_DATA", false)?,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {name}: `{value}`")),
        None => Ok(default),
    }
}
