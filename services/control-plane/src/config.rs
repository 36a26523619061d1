use std::net::SocketAddr;

use anyhow::Result;

use crate::store::DEFAULT_RETAINED_EVENTS;

pub const ENV_LISTEN_ADDR: &str = "SORTIE_LISTEN_ADDR";
pub const ENV_LOG_LEVEL: &str = "SORTIE_LOG_LEVEL";
pub const ENV_RETAINED_EVENTS: &str = "SORTIE_RETAINED_EVENTS";

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub retained_events: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var(ENV_LISTEN_ADDR)
            .unwrap_or_else(|_| "127.0.0.1:6443".to_string())
            .parse()?;

        let log_level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string());

        let retained_events = match std::env::var(ENV_RETAINED_EVENTS) {
            Ok(raw) => raw.parse()?,
            Err(_) => DEFAULT_RETAINED_EVENTS,
        };

        Ok(Self {
            listen_addr,
            log_level,
            retained_events,
        })
    }
}
