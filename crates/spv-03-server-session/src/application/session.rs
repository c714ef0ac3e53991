//! # Server Session
//!
//! One live connection to one Electrum server.
//!
//! ```text
//!   request() ──► outbound mpsc ──► writer task ──► socket
//!       ▲                                             │
//!       │ oneshot (by id)                             ▼
//!   pending map ◄──────────── reader task ◄──── lines from server
//!                                  │
//!                                  └──► notifications (broadcast)
//! ```
//!
//! Responses are matched by JSON-RPC id, never by arrival order, so any
//! number of requests may be in flight at once.

use parking_lot::Mutex;
use serde_json::Value;
use shared_types::{BlockHeader, Hash256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::subscription::NotificationStream;
use crate::adapters::{read_frame, write_frame, FrameError};
use crate::config::SessionConfig;
use crate::domain::protocol::{parse_header, parse_headers, parse_merkle, parse_status, parse_tip, parse_version};
use crate::domain::{
    parse_line, ClaimedTip, ConnectError, HealthScore, LatencyEstimate, MerkleResponse, Method,
    Notification, Penalty, RpcError, ServerEndpoint, ServerMessage, SessionState, Topic,
    TransportKind,
};

type Pending = HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

/// Handle to a live session. Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct ServerSession {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: ServerEndpoint,
    config: SessionConfig,
    next_id: AtomicU64,
    pending: Mutex<Pending>,
    outbound: mpsc::Sender<String>,
    /// Taken on close so every stream ends.
    notifications: Mutex<Option<broadcast::Sender<Notification>>>,
    /// Connecting / Ready / Closed. Degraded is derived from `health`.
    lifecycle: watch::Sender<SessionState>,
    tip: Mutex<Option<ClaimedTip>>,
    health: Mutex<HealthScore>,
    latency: Mutex<LatencyEstimate>,
    server_version: Mutex<Option<(String, String)>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServerSession {
    /// Connect over TCP and negotiate the protocol version.
    pub async fn open(endpoint: ServerEndpoint, config: &SessionConfig) -> Result<Self, ConnectError> {
        let health = HealthScore::new(config.health.clone());
        Self::open_with_health(endpoint, config, health).await
    }

    /// Like [`open`](Self::open), carrying over a score from an earlier
    /// connection to the same server.
    pub async fn open_with_health(
        endpoint: ServerEndpoint,
        config: &SessionConfig,
        health: HealthScore,
    ) -> Result<Self, ConnectError> {
        if endpoint.transport == TransportKind::Tls {
            return Err(ConnectError::UnsupportedTransport(endpoint.to_string()));
        }

        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| ConnectError::Timeout)??;
        stream.set_nodelay(true)?;

        Self::from_stream(endpoint, config, health, stream).await
    }

    /// Run a session over an already-connected byte stream.
    pub async fn from_stream<S>(
        endpoint: ServerEndpoint,
        config: &SessionConfig,
        health: HealthScore,
        stream: S,
    ) -> Result<Self, ConnectError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_queue.max(1));
        let (notifications, _) = broadcast::channel(config.notification_buffer.max(1));
        let (lifecycle, _) = watch::channel(SessionState::Connecting);

        let inner = Arc::new(Inner {
            endpoint,
            config: config.clone(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
            notifications: Mutex::new(Some(notifications)),
            lifecycle,
            tip: Mutex::new(None),
            health: Mutex::new(health),
            latency: Mutex::new(LatencyEstimate::new(config.latency_alpha)),
            server_version: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        let read_task = tokio::spawn(read_loop(inner.clone(), reader));
        let write_task = tokio::spawn(write_loop(inner.clone(), writer, outbound_rx));
        inner.tasks.lock().extend([read_task, write_task]);

        let session = Self { inner };
        if let Err(e) = session.handshake().await {
            session.close();
            return Err(ConnectError::Handshake(e));
        }

        let pinger = session.clone();
        let ping_task = tokio::spawn(async move { pinger.ping_loop().await });
        session.inner.tasks.lock().push(ping_task);

        Ok(session)
    }

    async fn handshake(&self) -> Result<(), RpcError> {
        let method = Method::ServerVersion {
            client_name: self.inner.config.client_name.clone(),
            protocol_version: self.inner.config.protocol_version.clone(),
        };
        let reply = self.request(method, self.inner.config.request_timeout).await?;
        let (software, protocol) = parse_version(&reply).map_err(|e| self.protocol_violation(e))?;

        info!(
            endpoint = %self.inner.endpoint,
            server = %software,
            protocol = %protocol,
            "Session ready"
        );
        *self.inner.server_version.lock() = Some((software, protocol));
        self.inner.lifecycle.send_replace(SessionState::Ready);
        Ok(())
    }

    async fn ping_loop(&self) {
        let interval = self.inner.config.ping_interval;
        loop {
            tokio::time::sleep(interval).await;
            if self.is_closed() {
                return;
            }
            if let Err(e) = self.ping(self.inner.config.request_timeout).await {
                debug!(endpoint = %self.inner.endpoint, error = %e, "Keep-alive failed");
            }
        }
    }

    /// Send one request and wait for its response.
    ///
    /// A timeout cancels only this request. It is retried with a fresh id up
    /// to `max_retries` times; every request the engine issues is an
    /// idempotent read.
    pub async fn request(&self, method: Method, timeout: Duration) -> Result<Value, RpcError> {
        let attempts = self.inner.config.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request_once(&method, timeout).await {
                Err(RpcError::Timeout { method: name }) if attempt < attempts => {
                    debug!(endpoint = %self.inner.endpoint, method = name, attempt, "Retrying after timeout");
                }
                other => return other,
            }
        }
    }

    async fn request_once(&self, method: &Method, timeout: Duration) -> Result<Value, RpcError> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);
        // Closed between the check and the insert: nobody would answer.
        if self.is_closed() {
            self.inner.pending.lock().remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        let started = Instant::now();
        let line = method.request_line(id);
        let exchange = async {
            self.inner
                .outbound
                .send(line)
                .await
                .map_err(|_| RpcError::ConnectionClosed)?;
            rx.await.map_err(|_| RpcError::ConnectionClosed)?
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(value)) => {
                self.inner.latency.lock().observe(started.elapsed());
                self.inner.health.lock().record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.inner.pending.lock().remove(&id);
                Err(e)
            }
            Err(_) => {
                self.inner.pending.lock().remove(&id);
                self.penalize(Penalty::Timeout);
                Err(RpcError::Timeout {
                    method: method.name(),
                })
            }
        }
    }

    /// Start a subscription.
    ///
    /// The server's immediate reply (current tip or current status) is
    /// delivered as the first notification. Delivery is at-least-once;
    /// consumers must tolerate duplicates.
    pub async fn subscribe(&self, topic: Topic) -> Result<NotificationStream, RpcError> {
        // Subscribe to the channel first so nothing between the request and
        // the stream is lost.
        let receiver = self
            .inner
            .notifications
            .lock()
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or(RpcError::ConnectionClosed)?;
        let reply = self
            .request(topic.subscribe_method(), self.inner.config.request_timeout)
            .await?;

        let initial = match &topic {
            Topic::Headers => Notification::HeadersTip(
                parse_tip(&reply).map_err(|e| self.protocol_violation(e))?,
            ),
            Topic::ScriptHash(script_hash) => Notification::ScriptHashStatus {
                script_hash: script_hash.clone(),
                status: parse_status(&reply).map_err(|e| self.protocol_violation(e))?,
            },
        };
        self.inner.dispatch(initial);

        Ok(NotificationStream::new(receiver, topic))
    }

    /// `server.ping`
    pub async fn ping(&self, timeout: Duration) -> Result<(), RpcError> {
        self.request(Method::Ping, timeout).await.map(|_| ())
    }

    /// `blockchain.block.header`
    pub async fn block_header(&self, height: u64, timeout: Duration) -> Result<BlockHeader, RpcError> {
        let reply = self.request(Method::BlockHeader { height }, timeout).await?;
        parse_header(&reply).map_err(|e| self.protocol_violation(e))
    }

    /// `blockchain.block.headers`
    pub async fn block_headers(
        &self,
        start_height: u64,
        count: u32,
        timeout: Duration,
    ) -> Result<Vec<BlockHeader>, RpcError> {
        let reply = self
            .request(
                Method::BlockHeaders {
                    start_height,
                    count,
                },
                timeout,
            )
            .await?;
        let headers = parse_headers(&reply).map_err(|e| self.protocol_violation(e))?;
        if headers.len() > count as usize {
            return Err(self.protocol_violation(RpcError::Malformed(format!(
                "asked for {count} headers, got {}",
                headers.len()
            ))));
        }
        Ok(headers)
    }

    /// `blockchain.transaction.get_merkle`
    pub async fn get_merkle(
        &self,
        tx_id: Hash256,
        height: u64,
        timeout: Duration,
    ) -> Result<MerkleResponse, RpcError> {
        let reply = self.request(Method::GetMerkle { tx_id, height }, timeout).await?;
        parse_merkle(&reply).map_err(|e| self.protocol_violation(e))
    }

    /// Server this session talks to.
    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.inner.endpoint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        let base = *self.inner.lifecycle.borrow();
        if base != SessionState::Ready {
            return base;
        }
        let mut health = self.inner.health.lock();
        health.refresh(Instant::now());
        if health.is_degraded() {
            SessionState::Degraded
        } else {
            SessionState::Ready
        }
    }

    /// True once the connection is gone.
    pub fn is_closed(&self) -> bool {
        *self.inner.lifecycle.borrow() == SessionState::Closed
    }

    /// Resolves when the session closes.
    pub async fn closed(&self) {
        let mut rx = self.inner.lifecycle.subscribe();
        // Err only if the sender is gone, which also means closed.
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }

    /// Last tip the server announced.
    pub fn claimed_tip(&self) -> Option<ClaimedTip> {
        *self.inner.tip.lock()
    }

    /// Snapshot of the health score.
    pub fn health(&self) -> HealthScore {
        let mut health = self.inner.health.lock();
        health.refresh(Instant::now());
        health.clone()
    }

    /// Current suspicion.
    pub fn suspicion(&self) -> u32 {
        self.inner.health.lock().suspicion()
    }

    /// Round-trip estimate.
    pub fn latency(&self) -> Option<Duration> {
        self.inner.latency.lock().get()
    }

    /// `(server_software, protocol_version)` from the handshake.
    pub fn server_version(&self) -> Option<(String, String)> {
        self.inner.server_version.lock().clone()
    }

    /// Requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Raise suspicion.
    pub fn penalize(&self, penalty: Penalty) {
        self.inner.health.lock().record_failure(penalty, Instant::now());
    }

    /// Mark the server as having made an unverifiable claim.
    pub fn mark_liar(&self) {
        self.inner.health.lock().mark_liar(Instant::now());
    }

    /// Close the connection. Pending requests fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.inner.close("closed locally");
    }

    fn protocol_violation(&self, error: RpcError) -> RpcError {
        warn!(endpoint = %self.inner.endpoint, %error, "Protocol violation");
        self.penalize(Penalty::Malformed);
        self.inner.close("protocol violation");
        error
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("endpoint", &self.inner.endpoint.to_string())
            .field("state", &self.state())
            .finish()
    }
}

impl Inner {
    fn complete(&self, id: u64, result: Result<Value, RpcError>) {
        match self.pending.lock().remove(&id) {
            Some(tx) => {
                let _ = tx.send(result);
            }
            // Late reply to a request that already timed out.
            None => debug!(endpoint = %self.endpoint, id, "Response for unknown id"),
        }
    }

    fn dispatch(&self, notification: Notification) {
        if let Notification::HeadersTip(tip) = &notification {
            debug!(endpoint = %self.endpoint, height = tip.height, hash = %tip.hash, "Tip announced");
            *self.tip.lock() = Some(*tip);
        }
        if let Some(sender) = self.notifications.lock().as_ref() {
            // No subscribers is fine.
            let _ = sender.send(notification);
        }
    }

    fn close(&self, reason: &str) {
        let previous = self.lifecycle.send_replace(SessionState::Closed);
        if previous == SessionState::Closed {
            return;
        }

        self.notifications.lock().take();
        let pending: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(RpcError::ConnectionClosed));
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!(endpoint = %self.endpoint, reason, "Session closed");
    }
}

async fn read_loop<R>(inner: Arc<Inner>, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let limit = inner.config.max_line_bytes;

    loop {
        match read_frame(&mut reader, &mut buf, limit).await {
            Ok(true) => {}
            Ok(false) => {
                inner.close("server closed the connection");
                return;
            }
            Err(FrameError::TooLong { limit }) => {
                warn!(endpoint = %inner.endpoint, limit, "Oversized line");
                inner.health.lock().record_failure(Penalty::Malformed, Instant::now());
                inner.close("oversized line");
                return;
            }
            Err(FrameError::Io(e)) => {
                debug!(endpoint = %inner.endpoint, error = %e, "Read failed");
                inner.close("read error");
                return;
            }
        }

        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match parse_line(&buf) {
            Ok(ServerMessage::Response { id, result }) => inner.complete(id, result),
            Ok(ServerMessage::Notification(notification)) => inner.dispatch(notification),
            Err(error) => {
                warn!(endpoint = %inner.endpoint, %error, "Malformed message");
                inner.health.lock().record_failure(Penalty::Malformed, Instant::now());
                inner.close("malformed message");
                return;
            }
        }
    }
}

async fn write_loop<W>(inner: Arc<Inner>, mut writer: W, mut outbound: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &line).await {
            debug!(endpoint = %inner.endpoint, error = %e, "Write failed");
            inner.close("write error");
            return;
        }
    }
}
