//! # Server Endpoints
//!
//! Electrum server strings have the form `host:port:t` (plain TCP) or
//! `host:port:s` (TLS).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::EndpointParseError;

/// Transport requested for a server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Plain TCP (`t`).
    #[serde(rename = "t")]
    Tcp,
    /// TLS over TCP (`s`).
    #[serde(rename = "s")]
    Tls,
}

impl TransportKind {
    fn letter(self) -> char {
        match self {
            TransportKind::Tcp => 't',
            TransportKind::Tls => 's',
        }
    }
}

/// One configured server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Hostname or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Transport.
    pub transport: TransportKind,
}

impl ServerEndpoint {
    /// Plain TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            transport: TransportKind::Tcp,
        }
    }

    /// `host:port`, used as the log and event key.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address(), self.transport.letter())
    }
}

impl FromStr for ServerEndpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (rest, transport) = match s.rsplit_once(':') {
            Some((rest, "t")) => (rest, TransportKind::Tcp),
            Some((rest, "s")) => (rest, TransportKind::Tls),
            Some((_, other)) if other.parse::<u16>().is_err() => {
                return Err(EndpointParseError::UnknownTransport(other.to_string()))
            }
            // No suffix: plain TCP.
            _ => (s, TransportKind::Tcp),
        };

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointParseError::InvalidPort(port.to_string()))?;

        Ok(Self {
            host: host.to_string(),
            port,
            transport,
        })
    }
}
