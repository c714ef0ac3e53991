//! # Electrum Protocol Messages
//!
//! JSON-RPC 2.0, one JSON object per line. Everything the client sends is a
//! [`Method`]; everything the server sends parses into a [`ServerMessage`].
//! Anything else is a protocol violation.

use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{BlockHeader, Hash256};

use super::errors::RpcError;

/// Requests the client issues.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Method {
    /// `server.version [client_name, protocol_version]`
    ServerVersion {
        /// Client identification.
        client_name: String,
        /// Requested protocol version.
        protocol_version: String,
    },
    /// `server.ping []`
    Ping,
    /// `blockchain.headers.subscribe []`
    HeadersSubscribe,
    /// `blockchain.block.header [height]`
    BlockHeader {
        /// Height to fetch.
        height: u64,
    },
    /// `blockchain.block.headers [start_height, count]`
    BlockHeaders {
        /// First height.
        start_height: u64,
        /// Number of headers.
        count: u32,
    },
    /// `blockchain.transaction.get_merkle [tx_hash, height]`
    GetMerkle {
        /// Transaction id.
        tx_id: Hash256,
        /// Block height.
        height: u64,
    },
    /// `blockchain.scripthash.subscribe [scripthash]`
    ScriptHashSubscribe {
        /// Electrum script hash (hex).
        script_hash: String,
    },
}

impl Method {
    /// JSON-RPC method name.
    pub fn name(&self) -> &'static str {
        match self {
            Method::ServerVersion { .. } => "server.version",
            Method::Ping => "server.ping",
            Method::HeadersSubscribe => "blockchain.headers.subscribe",
            Method::BlockHeader { .. } => "blockchain.block.header",
            Method::BlockHeaders { .. } => "blockchain.block.headers",
            Method::GetMerkle { .. } => "blockchain.transaction.get_merkle",
            Method::ScriptHashSubscribe { .. } => "blockchain.scripthash.subscribe",
        }
    }

    /// Positional parameters.
    pub fn params(&self) -> Value {
        match self {
            Method::ServerVersion {
                client_name,
                protocol_version,
            } => json!([client_name, protocol_version]),
            Method::Ping | Method::HeadersSubscribe => json!([]),
            Method::BlockHeader { height } => json!([height]),
            Method::BlockHeaders {
                start_height,
                count,
            } => json!([start_height, count]),
            Method::GetMerkle { tx_id, height } => json!([tx_id.to_hex(), height]),
            Method::ScriptHashSubscribe { script_hash } => json!([script_hash]),
        }
    }

    /// Serialized request object (without the trailing newline).
    pub fn request_line(&self, id: u64) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": self.name(),
            "params": self.params(),
        })
        .to_string()
    }
}

/// Subscription topics.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// New chain tips.
    Headers,
    /// Status changes of one script hash.
    ScriptHash(String),
}

impl Topic {
    /// Request that starts the subscription.
    pub fn subscribe_method(&self) -> Method {
        match self {
            Topic::Headers => Method::HeadersSubscribe,
            Topic::ScriptHash(script_hash) => Method::ScriptHashSubscribe {
                script_hash: script_hash.clone(),
            },
        }
    }

    /// True if the notification belongs to this topic.
    pub fn matches(&self, notification: &Notification) -> bool {
        match (self, notification) {
            (Topic::Headers, Notification::HeadersTip(_)) => true,
            (Topic::ScriptHash(wanted), Notification::ScriptHashStatus { script_hash, .. }) => {
                wanted == script_hash
            }
            _ => false,
        }
    }
}

/// A server's claim about its best chain.
///
/// Nothing about it is trusted until the header has been accepted by the
/// chain store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimedTip {
    /// Claimed height.
    pub height: u64,
    /// Claimed tip header.
    pub header: BlockHeader,
    /// Hash of `header`.
    pub hash: Hash256,
}

/// Server-initiated messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// `blockchain.headers.subscribe`
    HeadersTip(ClaimedTip),
    /// `blockchain.scripthash.subscribe`
    ScriptHashStatus {
        /// Script hash (hex).
        script_hash: String,
        /// Status hash, `None` for an unused script.
        status: Option<String>,
    },
}

/// Anything a server may send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    /// Reply to request `id`.
    Response {
        /// Request id.
        id: u64,
        /// Result or server error.
        result: Result<Value, RpcError>,
    },
    /// Subscription notification.
    Notification(Notification),
}

/// `blockchain.transaction.get_merkle` reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleResponse {
    /// Height the server places the transaction at.
    pub block_height: u64,
    /// Sibling hashes, leaf to root, internal byte order.
    pub branch: Vec<Hash256>,
    /// Leaf index.
    pub position: u64,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

fn malformed(what: impl Into<String>) -> RpcError {
    RpcError::Malformed(what.into())
}

/// Parse one line from the server.
pub fn parse_line(line: &[u8]) -> Result<ServerMessage, RpcError> {
    let raw: RawMessage =
        serde_json::from_slice(line).map_err(|e| malformed(format!("invalid JSON: {e}")))?;

    if let Some(id) = raw.id {
        let id = id
            .as_u64()
            .ok_or_else(|| malformed(format!("non-integer id {id}")))?;
        let result = match raw.error {
            Some(error) => Err(RpcError::Server {
                code: error.code,
                message: error.message,
            }),
            None => Ok(raw.result),
        };
        return Ok(ServerMessage::Response { id, result });
    }

    let method = raw
        .method
        .ok_or_else(|| malformed("message is neither response nor notification"))?;
    let notification = match method.as_str() {
        "blockchain.headers.subscribe" => {
            let tip = raw
                .params
                .get(0)
                .ok_or_else(|| malformed("headers notification without params"))?;
            Notification::HeadersTip(parse_tip(tip)?)
        }
        "blockchain.scripthash.subscribe" => {
            let script_hash = raw
                .params
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("scripthash notification without script hash"))?
                .to_string();
            let status = parse_status(raw.params.get(1).unwrap_or(&Value::Null))?;
            Notification::ScriptHashStatus {
                script_hash,
                status,
            }
        }
        other => return Err(malformed(format!("unexpected notification {other}"))),
    };
    Ok(ServerMessage::Notification(notification))
}

/// `{"height": h, "hex": "<80-byte header>"}`
pub fn parse_tip(value: &Value) -> Result<ClaimedTip, RpcError> {
    let height = value
        .get("height")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("tip without height"))?;
    let hex = value
        .get("hex")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("tip without hex"))?;
    let header = BlockHeader::from_hex(hex).map_err(|e| malformed(format!("tip header: {e}")))?;
    Ok(ClaimedTip {
        height,
        header,
        hash: header.hash(),
    })
}

/// Hex string of one header.
pub fn parse_header(value: &Value) -> Result<BlockHeader, RpcError> {
    let hex = value
        .as_str()
        .ok_or_else(|| malformed("header is not a string"))?;
    BlockHeader::from_hex(hex).map_err(|e| malformed(format!("header: {e}")))
}

/// `{"count": n, "hex": "<n * 80 bytes>", "max": m}`
pub fn parse_headers(value: &Value) -> Result<Vec<BlockHeader>, RpcError> {
    let count = value
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("headers without count"))?;
    let hex = value
        .get("hex")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("headers without hex"))?;
    let headers =
        BlockHeader::decode_batch_hex(hex).map_err(|e| malformed(format!("headers: {e}")))?;
    if headers.len() as u64 != count {
        return Err(malformed(format!(
            "headers count {count} but {} decoded",
            headers.len()
        )));
    }
    Ok(headers)
}

/// `{"block_height": h, "merkle": [hex...], "pos": p}`
pub fn parse_merkle(value: &Value) -> Result<MerkleResponse, RpcError> {
    let block_height = value
        .get("block_height")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("merkle without block_height"))?;
    let position = value
        .get("pos")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("merkle without pos"))?;
    let branch = value
        .get("merkle")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("merkle without branch"))?
        .iter()
        .map(|node| {
            node.as_str()
                .ok_or_else(|| malformed("merkle node is not a string"))
                .and_then(|s| Hash256::from_hex(s).map_err(|e| malformed(format!("merkle node: {e}"))))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MerkleResponse {
        block_height,
        branch,
        position,
    })
}

/// `[server_software, protocol_version]`
pub fn parse_version(value: &Value) -> Result<(String, String), RpcError> {
    let pair = value
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| malformed("version reply is not a pair"))?;
    match (pair[0].as_str(), pair[1].as_str()) {
        (Some(software), Some(protocol)) => Ok((software.to_string(), protocol.to_string())),
        _ => Err(malformed("version reply items are not strings")),
    }
}

/// Status hash or `null`.
pub fn parse_status(value: &Value) -> Result<Option<String>, RpcError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(malformed("status is neither string nor null")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";

    #[test]
    fn test_request_line() {
        let line = Method::BlockHeaders {
            start_height: 10,
            count: 5,
        }
        .request_line(7);
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "blockchain.block.headers");
        assert_eq!(value["params"], json!([10, 5]));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_get_merkle_uses_display_hex() {
        let tx_id = Hash256::from_hex(
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
        )
        .unwrap();
        let params = Method::GetMerkle { tx_id, height: 0 }.params();
        assert_eq!(
            params[0],
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn test_parse_response() {
        let msg = parse_line(br#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Response {
                id: 3,
                result: Ok(Value::Null)
            }
        );
    }

    #[test]
    fn test_parse_error_response() {
        let msg =
            parse_line(br#"{"jsonrpc":"2.0","id":4,"error":{"code":1,"message":"nope"}}"#).unwrap();
        assert!(matches!(
            msg,
            ServerMessage::Response {
                id: 4,
                result: Err(RpcError::Server { code: 1, .. })
            }
        ));
    }

    #[test]
    fn test_parse_headers_notification() {
        let line = format!(
            r#"{{"jsonrpc":"2.0","method":"blockchain.headers.subscribe","params":[{{"height":0,"hex":"{GENESIS_HEX}"}}]}}"#
        );
        let msg = parse_line(line.as_bytes()).unwrap();
        match msg {
            ServerMessage::Notification(Notification::HeadersTip(tip)) => {
                assert_eq!(tip.height, 0);
                assert_eq!(
                    tip.hash.to_hex(),
                    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_scripthash_notification() {
        let msg = parse_line(
            br#"{"jsonrpc":"2.0","method":"blockchain.scripthash.subscribe","params":["ab12","cd34"]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Notification(Notification::ScriptHashStatus {
                script_hash: "ab12".into(),
                status: Some("cd34".into())
            })
        );
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(parse_line(b"not json").is_err());
        assert!(parse_line(br#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(parse_line(br#"{"id":"abc","result":1}"#).is_err());
        assert!(parse_line(br#"{"method":"server.banner","params":[]}"#).is_err());
        assert!(parse_line(
            br#"{"method":"blockchain.headers.subscribe","params":[{"height":1,"hex":"00"}]}"#
        )
        .is_err());
    }

    #[test]
    fn test_parse_headers_count_mismatch() {
        let value = json!({"count": 2, "hex": GENESIS_HEX, "max": 2016});
        assert!(parse_headers(&value).is_err());
        let value = json!({"count": 1, "hex": GENESIS_HEX, "max": 2016});
        assert_eq!(parse_headers(&value).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_merkle() {
        let value = json!({
            "block_height": 5,
            "merkle": ["4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"],
            "pos": 1
        });
        let merkle = parse_merkle(&value).unwrap();
        assert_eq!(merkle.block_height, 5);
        assert_eq!(merkle.position, 1);
        assert_eq!(merkle.branch.len(), 1);
    }

    #[test]
    fn test_parse_version() {
        let (software, protocol) = parse_version(&json!(["ElectrumX 1.16", "1.4"])).unwrap();
        assert_eq!(software, "ElectrumX 1.16");
        assert_eq!(protocol, "1.4");
        assert!(parse_version(&json!("1.4")).is_err());
    }

    #[test]
    fn test_topic_matching() {
        let status = Notification::ScriptHashStatus {
            script_hash: "aa".into(),
            status: None,
        };
        assert!(Topic::ScriptHash("aa".into()).matches(&status));
        assert!(!Topic::ScriptHash("bb".into()).matches(&status));
        assert!(!Topic::Headers.matches(&status));
    }
}
