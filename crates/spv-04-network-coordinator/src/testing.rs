//! In-memory connector for pool tests.
//!
//! Maps endpoints to [`MockElectrumServer`]s and opens sessions over duplex
//! pipes, so whole pool scenarios run without sockets.

use async_trait::async_trait;
use parking_lot::Mutex;
use spv_03_server_session::testing::MockElectrumServer;
use spv_03_server_session::{ConnectError, HealthScore, ServerEndpoint, ServerSession, SessionConfig};
use std::collections::HashMap;
use std::io;

use crate::ports::SessionConnector;

/// Connector backed by mock servers. Unknown endpoints refuse.
#[derive(Default)]
pub struct MockConnector {
    servers: Mutex<HashMap<String, MockElectrumServer>>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl MockConnector {
    /// Empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `endpoint` from `server`.
    pub fn add(&self, endpoint: &ServerEndpoint, server: MockElectrumServer) {
        self.servers.lock().insert(endpoint.address(), server);
    }

    /// Stop serving `endpoint`; later attempts are refused.
    pub fn remove(&self, endpoint: &ServerEndpoint) {
        self.servers.lock().remove(&endpoint.address());
    }

    /// Connect attempts made to `endpoint`.
    pub fn attempts(&self, endpoint: &ServerEndpoint) -> usize {
        self.attempts
            .lock()
            .get(&endpoint.address())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        config: &SessionConfig,
        health: HealthScore,
    ) -> Result<ServerSession, ConnectError> {
        *self.attempts.lock().entry(endpoint.address()).or_default() += 1;
        let server = self.servers.lock().get(&endpoint.address()).cloned();
        let Some(server) = server else {
            return Err(ConnectError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "no mock server",
            )));
        };
        let stream = server.connect_duplex();
        ServerSession::from_stream(endpoint.clone(), config, health, stream).await
    }
}
