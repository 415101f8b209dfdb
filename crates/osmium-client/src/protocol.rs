//! JSON-RPC 2.0 message types and LSP base-protocol framing

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::error::{ClientError, Result};
use crate::types::SessionIdentity;

/// JSON-RPC 2.0 request ID
pub type RequestId = u64;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request ID
    pub id: RequestId,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Response result (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Response error (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Response ID (matches request ID)
    pub id: RequestId,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 notification (request without ID)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Notification method name
    pub method: String,
    /// Notification parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request with the given ID
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

impl JsonRpcNotification {
    /// Create a notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Classification of an incoming server message
#[derive(Debug)]
pub enum IncomingMessage {
    /// A response to a request this client issued
    Response(JsonRpcResponse),
    /// A server-initiated notification
    Notification(JsonRpcNotification),
    /// A server-to-client request (carries both method and ID)
    Request(JsonRpcRequest),
}

/// Classify and decode one raw server message
pub fn parse_incoming(text: &str) -> Result<IncomingMessage> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ClientError::Protocol(format!("failed to parse server message: {}", e)))?;

    let has_id = value.get("id").is_some();
    let has_method = value.get("method").is_some();

    let decoded = if has_method && has_id {
        serde_json::from_value(value).map(IncomingMessage::Request)
    } else if has_method {
        serde_json::from_value(value).map(IncomingMessage::Notification)
    } else {
        serde_json::from_value(value).map(IncomingMessage::Response)
    };

    decoded.map_err(|e| ClientError::Protocol(format!("malformed server message: {}", e)))
}

/// Write one framed message (`Content-Length` header plus payload)
pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. Returns `None` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            // EOF between messages is a normal close
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(ClientError::Protocol(
                "server channel closed mid-header".to_string(),
            ));
        }

        let line = line.trim_end();
        if line.is_empty() {
            break;
        }

        if let Some(rest) = line.strip_prefix("Content-Length:") {
            let length = rest.trim().parse::<usize>().map_err(|_| {
                ClientError::Protocol(format!("invalid Content-Length header: {}", rest.trim()))
            })?;
            content_length = Some(length);
        }
        // Other headers (Content-Type) are ignored
    }

    let length = content_length
        .ok_or_else(|| ClientError::Protocol("missing Content-Length header".to_string()))?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    String::from_utf8(payload)
        .map(Some)
        .map_err(|e| ClientError::Protocol(format!("message payload is not UTF-8: {}", e)))
}

/// Parameters for the `initialize` request
pub fn initialize_params(identity: &SessionIdentity, root_uri: Option<&Url>) -> Value {
    json!({
        "processId": std::process::id(),
        "clientInfo": {
            "name": identity.name,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "rootUri": root_uri.map(|u| u.to_string()),
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "didSave": true,
                }
            },
            "workspace": {
                "didChangeWatchedFiles": {
                    "dynamicRegistration": false,
                }
            }
        },
    })
}

/// Parameters for a `textDocument/didOpen` notification
pub fn did_open_params(uri: &Url, language_id: &str, version: i32, text: &str) -> Value {
    json!({
        "textDocument": {
            "uri": uri.to_string(),
            "languageId": language_id,
            "version": version,
            "text": text,
        }
    })
}

/// Parameters for a `workspace/didChangeWatchedFiles` notification.
///
/// Every change is reported with the `Changed` type; the servers re-read the
/// config file regardless of the precise change kind.
pub fn did_change_watched_files_params(uris: &[Url]) -> Value {
    let changes: Vec<Value> = uris
        .iter()
        .map(|uri| json!({ "uri": uri.to_string(), "type": 2 }))
        .collect();
    json!({ "changes": changes })
}
