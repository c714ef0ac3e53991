//! In-process Electrum server for tests.
//!
//! Serves a header chain, merkle branches and script statuses over either an
//! in-memory duplex pipe or a loopback TCP listener. Every knob a test needs
//! to simulate a slow, silent, lying or vanishing server is a method here.

use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_types::{BlockHeader, Hash256};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::domain::MerkleResponse;

/// Largest `blockchain.block.headers` chunk the mock serves.
pub const MOCK_MAX_CHUNK: u32 = 2016;

#[derive(Clone, Debug)]
enum Control {
    Tip { height: u64, header: BlockHeader },
    Status { script_hash: String, status: Option<String> },
    Raw(String),
    Disconnect,
}

#[derive(Default)]
struct MockState {
    headers: Vec<BlockHeader>,
    claimed_tip: Option<(u64, BlockHeader)>,
    merkle: HashMap<Hash256, MerkleResponse>,
    statuses: HashMap<String, Option<String>>,
    ignored: HashSet<String>,
    reverse_replies: usize,
    delay: Option<Duration>,
    offline: bool,
    connections: Vec<mpsc::UnboundedSender<Control>>,
    requests: HashMap<String, usize>,
}

impl MockState {
    fn tip(&self) -> Option<(u64, BlockHeader)> {
        self.claimed_tip.or_else(|| {
            self.headers
                .last()
                .map(|header| (self.headers.len() as u64 - 1, *header))
        })
    }

    fn broadcast(&mut self, control: Control) {
        self.connections.retain(|tx| tx.send(control.clone()).is_ok());
    }
}

/// Scriptable Electrum server. Clones share state.
#[derive(Clone, Default)]
pub struct MockElectrumServer {
    state: Arc<Mutex<MockState>>,
}

impl MockElectrumServer {
    /// Server whose chain is `headers`, with `headers[0]` at height 0.
    pub fn new(headers: Vec<BlockHeader>) -> Self {
        let server = Self::default();
        server.state.lock().headers = headers;
        server
    }

    /// Client end of a fresh in-memory connection.
    pub fn connect_duplex(&self) -> tokio::io::DuplexStream {
        let (client, server) = tokio::io::duplex(1 << 20);
        if self.state.lock().offline {
            drop(server);
        } else {
            tokio::spawn(serve(self.state.clone(), server));
        }
        client
    }

    /// Listen on a loopback port.
    pub async fn spawn_tcp(&self) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if state.lock().offline {
                    drop(stream);
                    continue;
                }
                tokio::spawn(serve(state.clone(), stream));
            }
        });
        Ok(addr)
    }

    /// Extend the chain by one header and announce it.
    pub fn push_header(&self, header: BlockHeader) {
        let mut state = self.state.lock();
        state.headers.push(header);
        let height = state.headers.len() as u64 - 1;
        if state.claimed_tip.is_none() {
            state.broadcast(Control::Tip { height, header });
        }
    }

    /// Replace the whole chain (a reorg on the server side) and announce the
    /// new tip.
    pub fn set_chain(&self, headers: Vec<BlockHeader>) {
        let mut state = self.state.lock();
        state.headers = headers;
        if let Some((height, header)) = state.tip() {
            state.broadcast(Control::Tip { height, header });
        }
    }

    /// Announce a tip that need not match the served chain.
    pub fn claim_tip(&self, height: u64, header: BlockHeader) {
        let mut state = self.state.lock();
        state.claimed_tip = Some((height, header));
        state.broadcast(Control::Tip { height, header });
    }

    /// Answer `get_merkle` for `tx_id`.
    pub fn set_merkle(&self, tx_id: Hash256, response: MerkleResponse) {
        self.state.lock().merkle.insert(tx_id, response);
    }

    /// Change a script status and notify subscribers.
    pub fn set_script_status(&self, script_hash: &str, status: Option<String>) {
        let mut state = self.state.lock();
        state.statuses.insert(script_hash.to_string(), status.clone());
        state.broadcast(Control::Status {
            script_hash: script_hash.to_string(),
            status,
        });
    }

    /// Never answer `method`.
    pub fn ignore_method(&self, method: &str) {
        self.state.lock().ignored.insert(method.to_string());
    }

    /// Answer `method` again.
    pub fn answer_method(&self, method: &str) {
        self.state.lock().ignored.remove(method);
    }

    /// Hold replies until `n` are queued, then send them newest first.
    pub fn set_reverse_replies(&self, n: usize) {
        self.state.lock().reverse_replies = n;
    }

    /// Sleep before every reply.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Write a raw line to every connection.
    pub fn send_raw(&self, line: &str) {
        self.state.lock().broadcast(Control::Raw(line.to_string()));
    }

    /// Drop every open connection.
    pub fn disconnect_all(&self) {
        let mut state = self.state.lock();
        state.broadcast(Control::Disconnect);
        state.connections.clear();
    }

    /// Refuse (or accept again) new connections. Going offline also drops
    /// the open ones.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
        if offline {
            self.disconnect_all();
        }
    }

    /// Requests received for `method`, answered or not.
    pub fn requests_for(&self, method: &str) -> usize {
        self.state.lock().requests.get(method).copied().unwrap_or(0)
    }

    /// Requests received in total.
    pub fn requests_served(&self) -> usize {
        self.state.lock().requests.values().sum()
    }

    /// Open connections.
    pub fn connection_count(&self) -> usize {
        let mut state = self.state.lock();
        state.connections.retain(|tx| !tx.is_closed());
        state.connections.len()
    }
}

#[derive(Default)]
struct Connection {
    headers_subscribed: bool,
    scripts: HashSet<String>,
    held: Vec<String>,
}

async fn serve<S>(state: Arc<Mutex<MockState>>, stream: S)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let (tx, mut control) = mpsc::unbounded_channel();
    state.lock().connections.push(tx);
    let mut conn = Connection::default();

    loop {
        let outgoing = tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let (reply, delay) = handle_request(&state, &mut conn, &line);
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    reply
                }
                _ => return,
            },
            control = control.recv() => match control {
                Some(Control::Tip { height, header }) if conn.headers_subscribed => {
                    vec![notification(
                        "blockchain.headers.subscribe",
                        json!([{ "height": height, "hex": header.to_hex() }]),
                    )]
                }
                Some(Control::Status { script_hash, status }) if conn.scripts.contains(&script_hash) => {
                    vec![notification(
                        "blockchain.scripthash.subscribe",
                        json!([script_hash, status]),
                    )]
                }
                Some(Control::Raw(line)) => vec![line],
                Some(Control::Disconnect) | None => return,
                Some(_) => Vec::new(),
            },
        };

        for line in outgoing {
            if writer.write_all(line.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
            {
                return;
            }
        }
        if writer.flush().await.is_err() {
            return;
        }
    }
}

/// Lines to send in reply to one request line, plus an optional delay.
fn handle_request(
    state: &Mutex<MockState>,
    conn: &mut Connection,
    line: &str,
) -> (Vec<String>, Option<Duration>) {
    let Ok(request) = serde_json::from_str::<Value>(line) else {
        return (Vec::new(), None);
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = request.get("params").cloned().unwrap_or_else(|| json!([]));

    let mut state = state.lock();
    *state.requests.entry(method.clone()).or_default() += 1;
    if state.ignored.contains(&method) {
        return (Vec::new(), None);
    }

    let result = answer(&mut state, conn, &method, &params);
    let reply = match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(message) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": 1, "message": message },
        }),
    }
    .to_string();

    let delay = state.delay;
    if state.reverse_replies > 1 {
        conn.held.push(reply);
        if conn.held.len() < state.reverse_replies {
            return (Vec::new(), delay);
        }
        let mut held = std::mem::take(&mut conn.held);
        held.reverse();
        return (held, delay);
    }
    (vec![reply], delay)
}

fn answer(
    state: &mut MockState,
    conn: &mut Connection,
    method: &str,
    params: &Value,
) -> Result<Value, String> {
    let height_param = |index: usize| {
        params
            .get(index)
            .and_then(Value::as_u64)
            .ok_or_else(|| format!("bad param {index}"))
    };

    match method {
        "server.version" => Ok(json!(["MockElectrum 1.0", "1.4"])),
        "server.ping" => Ok(Value::Null),
        "blockchain.headers.subscribe" => {
            conn.headers_subscribed = true;
            let (height, header) = state.tip().ok_or("no headers")?;
            Ok(json!({ "height": height, "hex": header.to_hex() }))
        }
        "blockchain.block.header" => {
            let height = height_param(0)?;
            state
                .headers
                .get(height as usize)
                .map(|header| json!(header.to_hex()))
                .ok_or_else(|| format!("height {height} out of range"))
        }
        "blockchain.block.headers" => {
            let start = height_param(0)? as usize;
            let count = height_param(1)?.min(u64::from(MOCK_MAX_CHUNK)) as usize;
            let end = (start + count).min(state.headers.len());
            let slice = state.headers.get(start..end).unwrap_or(&[]);
            let hex: String = slice.iter().map(BlockHeader::to_hex).collect();
            Ok(json!({ "count": slice.len(), "hex": hex, "max": MOCK_MAX_CHUNK }))
        }
        "blockchain.transaction.get_merkle" => {
            let tx_id = params
                .get(0)
                .and_then(Value::as_str)
                .and_then(|s| Hash256::from_hex(s).ok())
                .ok_or("bad tx hash")?;
            let merkle = state.merkle.get(&tx_id).ok_or("tx not found")?;
            let branch: Vec<String> = merkle.branch.iter().map(Hash256::to_hex).collect();
            Ok(json!({
                "block_height": merkle.block_height,
                "merkle": branch,
                "pos": merkle.position,
            }))
        }
        "blockchain.scripthash.subscribe" => {
            let script_hash = params
                .get(0)
                .and_then(Value::as_str)
                .ok_or("bad script hash")?
                .to_string();
            conn.scripts.insert(script_hash.clone());
            Ok(json!(state.statuses.get(&script_hash).cloned().flatten()))
        }
        other => Err(format!("unknown method {other}")),
    }
}

fn notification(method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "method": method, "params": params }).to_string()
}
