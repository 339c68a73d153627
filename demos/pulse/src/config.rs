//! Environment configuration for the demo binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use pulse_protocol::client::AuthPolicy;
use pulse_protocol::core::constants::{
    DEFAULT_MULTICAST_ADDR, DEFAULT_TCP_ADDR, DEFAULT_UDP_ADDR, HEARTBEAT_INTERVAL,
};
use pulse_protocol::server::{PulseServerBuilder, ServerConfig};
use pulse_protocol::transport::ProtocolKind;
use thiserror::Error;

/// Invalid environment value.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable could not be parsed.
    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// What the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// All three listeners until Ctrl-C.
    Server,
    /// One client session.
    Client,
    /// One server plus four clients, end to end.
    Demo,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Mode::Server),
            "client" => Ok(Mode::Client),
            "demo" => Ok(Mode::Demo),
            other => Err(format!("unknown mode {:?} (expected server, client or demo)", other)),
        }
    }
}

/// Everything the binary reads from the environment.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub mode: Mode,
    pub server: ServerConfig,
    pub protocol: ProtocolKind,
    pub server_addr: String,
    pub username: String,
    pub password: String,
    pub heartbeat_interval: Duration,
    /// `None` runs heartbeats until the session fails.
    pub ticks: Option<u32>,
    pub auth_policy: AuthPolicy,
    pub log_level: String,
}

impl DemoConfig {
    /// Read `PULSE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, which maps a variable to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = parse_or(&lookup, "PULSE_MODE", Mode::Demo)?;

        let mut builder = PulseServerBuilder::new();
        if let Some(addr) = parse_opt::<SocketAddr, _>(&lookup, "PULSE_TCP_ADDR")? {
            builder = builder.tcp_addr(addr);
        }
        if let Some(addr) = parse_opt::<SocketAddr, _>(&lookup, "PULSE_UDP_ADDR")? {
            builder = builder.udp_addr(addr);
        }
        if let Some(addr) = parse_opt::<SocketAddr, _>(&lookup, "PULSE_MULTICAST_ADDR")? {
            if !addr.ip().is_multicast() {
                return Err(ConfigError::Invalid {
                    var: "PULSE_MULTICAST_ADDR",
                    value: addr.to_string(),
                    reason: "not a multicast group".into(),
                });
            }
            builder = builder.multicast_addr(addr);
        }
        let server = builder.build();

        let protocol = parse_or(&lookup, "PULSE_PROTOCOL", ProtocolKind::Tcp)?;
        let server_addr = lookup("PULSE_SERVER_ADDR")
            .unwrap_or_else(|| default_target(&server, protocol).to_string());

        let heartbeat_interval = match parse_opt::<u64, _>(&lookup, "PULSE_HEARTBEAT_SECS")? {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    var: "PULSE_HEARTBEAT_SECS",
                    value: "0".into(),
                    reason: "interval must be positive".into(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => HEARTBEAT_INTERVAL,
        };

        let auth_policy = match lookup("PULSE_AUTH_POLICY") {
            None => AuthPolicy::default(),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "strict" => AuthPolicy::Strict,
                "lenient" => AuthPolicy::Lenient,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "PULSE_AUTH_POLICY",
                        value,
                        reason: "expected strict or lenient".into(),
                    });
                }
            },
        };

        Ok(Self {
            mode,
            server,
            protocol,
            server_addr,
            username: lookup("PULSE_USERNAME").unwrap_or_else(|| "alice".into()),
            password: lookup("PULSE_PASSWORD").unwrap_or_else(|| "secret".into()),
            heartbeat_interval,
            ticks: parse_opt(&lookup, "PULSE_TICKS")?,
            auth_policy,
            log_level: lookup("PULSE_LOG_LEVEL").unwrap_or_else(|| "info".into()),
        })
    }
}

/// Where a client of `protocol` should send, given the server's bind addresses.
///
/// Wildcard bind addresses are reached through loopback.
pub fn default_target(server: &ServerConfig, protocol: ProtocolKind) -> SocketAddr {
    match protocol {
        ProtocolKind::Tcp => reachable(server.tcp_addr.unwrap_or(DEFAULT_TCP_ADDR)),
        ProtocolKind::UdpUnicast => reachable(server.udp_addr.unwrap_or(DEFAULT_UDP_ADDR)),
        ProtocolKind::UdpMulticast => server.multicast_addr.unwrap_or(DEFAULT_MULTICAST_ADDR),
    }
}

/// Replace a wildcard IP with loopback.
pub fn reachable(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
    } else {
        addr
    }
}

fn parse_opt<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_or<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(lookup, var)?.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<DemoConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DemoConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.mode, Mode::Demo);
        assert_eq!(config.protocol, ProtocolKind::Tcp);
        assert_eq!(config.server_addr, "127.0.0.1:9000");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(7));
        assert_eq!(config.ticks, None);
        assert_eq!(config.auth_policy, AuthPolicy::Strict);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_client_overrides() {
        let config = load(&[
            ("PULSE_MODE", "client"),
            ("PULSE_PROTOCOL", "udp-unicast"),
            ("PULSE_UDP_ADDR", "0.0.0.0:9101"),
            ("PULSE_USERNAME", "bob"),
            ("PULSE_TICKS", "3"),
            ("PULSE_HEARTBEAT_SECS", "1"),
            ("PULSE_AUTH_POLICY", "Lenient"),
        ])
        .unwrap();

        assert_eq!(config.mode, Mode::Client);
        assert_eq!(config.protocol, ProtocolKind::UdpUnicast);
        assert_eq!(config.server_addr, "127.0.0.1:9101");
        assert_eq!(config.username, "bob");
        assert_eq!(config.ticks, Some(3));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.auth_policy, AuthPolicy::Lenient);
    }

    #[test]
    fn test_multicast_target_is_the_group() {
        let config = load(&[("PULSE_PROTOCOL", "udp-multicast")]).unwrap();
        assert_eq!(config.server_addr, "224.0.0.1:9002");
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("PULSE_MODE", "proxy")]).is_err());
        assert!(load(&[("PULSE_PROTOCOL", "sctp")]).is_err());
        assert!(load(&[("PULSE_TCP_ADDR", "nowhere")]).is_err());
        assert!(load(&[("PULSE_MULTICAST_ADDR", "10.0.0.1:9002")]).is_err());
        assert!(load(&[("PULSE_HEARTBEAT_SECS", "0")]).is_err());
        assert!(load(&[("PULSE_TICKS", "-1")]).is_err());
        assert!(load(&[("PULSE_AUTH_POLICY", "maybe")]).is_err());
    }

    #[test]
    fn test_error_names_the_variable() {
        let err = load(&[("PULSE_TICKS", "many")]).unwrap_err();
        assert!(err.to_string().starts_with("PULSE_TICKS="));
    }
}
