//! # Outbound Ports
//!
//! How the coordinator obtains sessions.

use async_trait::async_trait;
use spv_03_server_session::{ConnectError, HealthScore, ServerEndpoint, ServerSession, SessionConfig};

/// Opens sessions. The production connector dials TCP; tests substitute an
/// in-memory one.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect and complete the handshake, carrying `health` over from any
    /// earlier connection to the same endpoint.
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        config: &SessionConfig,
        health: HealthScore,
    ) -> Result<ServerSession, ConnectError>;
}

/// Connector over real sockets.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl SessionConnector for TcpConnector {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        config: &SessionConfig,
        health: HealthScore,
    ) -> Result<ServerSession, ConnectError> {
        ServerSession::open_with_health(endpoint.clone(), config, health).await
    }
}
