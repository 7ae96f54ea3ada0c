//! Environment-variable configuration. There is no config file and no
//! CLI surface — matches `valence_network`'s `NetworkSettings`, a plain
//! struct with documented defaults, except sourced from the environment
//! instead of builder methods since flags and config files are out of scope.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

const DEFAULT_PORT: u16 = 8888;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 5000;

/// Periodic-ticker intervals. These are not environment-configurable;
/// only the idle timeout threshold is.
pub const IDLE_REAP_INTERVAL: Duration = Duration::from_secs(10);
pub const LOBBY_PING_INTERVAL: Duration = Duration::from_millis(300);
pub const BATTLE_PING_INTERVAL: Duration = Duration::from_millis(33);
pub const BATTLE_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// The 2-second delay absorbed before sending a new client its greeting, to
/// avoid paying for a snapshot send to a port scanner that disconnects
/// immediately.
pub const GREETING_DELAY: Duration = Duration::from_secs(2);

/// Server configuration, parsed once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// The address the server binds to. Always `0.0.0.0`, with the port
    /// taken from `PORT`.
    ///
    /// # Default value
    ///
    /// `0.0.0.0:8888`
    pub bind_addr: SocketAddr,

    /// How long a connection may go without inbound bytes before the idle
    /// reaper disconnects it.
    ///
    /// # Default value
    ///
    /// `5000` ms
    pub idle_timeout: Duration,
}

impl Config {
    /// Parses configuration from the process environment. Malformed values
    /// fall back to the documented default rather than failing startup —
    /// there is no supported way to signal a config error back to an
    /// operator beyond the log, so a best-effort default keeps the server
    /// running.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let idle_timeout_ms = std::env::var("IDLE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_MS);

        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)),
            idle_timeout: Duration::from_millis(idle_timeout_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_port_8888_and_five_second_idle_timeout() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.idle_timeout, Duration::from_millis(5000));
    }
}
