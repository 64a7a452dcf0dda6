use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Server configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind, from `SERVER_HOST`.
    pub host: IpAddr,
    /// Port to bind, from `SERVER_PORT`.
    pub port: u16,
    /// Live-socket ceiling, from `MAX_CONNECTIONS`.
    pub max_connections: usize,
    /// Default turn timeout in seconds, from `TURN_TIMEOUT_SECS`. Lobbies
    /// carry their own value; this one seeds the reconnect grace for
    /// sessions that are in no game.
    pub turn_timeout_secs: u64,
    /// Log filter directive, from `LOG_LEVEL`.
    pub log_level: Option<String>,
    /// Snapshot location, from `DATABASE_URL`. Unset disables snapshots.
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            host: parsed("SERVER_HOST").unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: parsed("SERVER_PORT").unwrap_or(8080),
            max_connections: parsed("MAX_CONNECTIONS").unwrap_or(1024),
            turn_timeout_secs: parsed("TURN_TIMEOUT_SECS").unwrap_or(30),
            log_level: env::var("LOG_LEVEL").ok(),
            database_url: env::var("DATABASE_URL").ok(),
        }
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Reconnect grace for sessions outside any game: four turn timeouts.
    pub fn default_reconnect_grace(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs * 4)
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
