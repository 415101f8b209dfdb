//! Protocol client connection and handshake

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};
use crate::protocol::{
    self, IncomingMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
};
use crate::types::SessionIdentity;

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Result<Value>>>>>;

/// One session's protocol connection to its server.
///
/// Owns the writer half and a background reader task that correlates
/// responses to pending requests. Requests are not subject to any timeout;
/// a hung server holds its caller until the connection is closed.
pub struct SessionConnection {
    session_id: String,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    reader_task: JoinHandle<()>,
}

impl SessionConnection {
    /// Create a connection over the given channel halves and start the
    /// background reader
    pub fn new(
        session_id: &str,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_task = tokio::spawn(read_loop(
            session_id.to_string(),
            reader,
            pending.clone(),
        ));

        Self {
            session_id: session_id.to_string(),
            writer: Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            reader_task,
        }
    }

    /// Send a request and wait for the server's response
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ClientError::Protocol(format!("failed to encode request: {}", e)))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.send(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        debug!(session = %self.session_id, method = method, id = id, "request sent");

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Protocol(
                "connection closed before response arrived".to_string(),
            )),
        }
    }

    /// Send a notification (no response expected)
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let payload = serde_json::to_vec(&notification)
            .map_err(|e| ClientError::Protocol(format!("failed to encode notification: {}", e)))?;
        self.send(&payload).await?;
        debug!(session = %self.session_id, method = method, "notification sent");
        Ok(())
    }

    async fn send(&self, payload: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        protocol::write_message(&mut *writer, payload).await
    }

    /// Tear the connection down: stop the reader and fail all pending
    /// requests
    pub async fn close(&self) {
        self.reader_task.abort();
        self.pending.lock().await.clear();
        debug!(session = %self.session_id, "connection closed");
    }
}

async fn read_loop(
    session_id: String,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    pending: PendingMap,
) {
    let mut reader = BufReader::new(reader);

    loop {
        match protocol::read_message(&mut reader).await {
            Ok(Some(text)) => handle_message(&session_id, &text, &pending).await,
            Ok(None) => {
                debug!(session = %session_id, "server closed the channel");
                break;
            }
            Err(e) => {
                warn!(session = %session_id, error = %e, "failed to read server message");
                break;
            }
        }
    }

    // Dropping the senders wakes every waiter with a closed-connection error
    pending.lock().await.clear();
}

async fn handle_message(session_id: &str, text: &str, pending: &PendingMap) {
    match protocol::parse_incoming(text) {
        Ok(IncomingMessage::Response(response)) => {
            let sender = pending.lock().await.remove(&response.id);
            match sender {
                Some(sender) => {
                    let result = match response.error {
                        Some(error) => Err(ClientError::Protocol(format!(
                            "server error {}: {}",
                            error.code, error.message
                        ))),
                        None => Ok(response.result.unwrap_or(Value::Null)),
                    };
                    let _ = sender.send(result);
                }
                None => {
                    warn!(
                        session = %session_id,
                        id = response.id,
                        "response for unknown request id"
                    );
                }
            }
        }
        Ok(IncomingMessage::Notification(notification)) => {
            // Server-pushed content (diagnostics, log messages) is consumed
            // by the host, not the orchestrator
            debug!(
                session = %session_id,
                method = %notification.method,
                "server notification received"
            );
        }
        Ok(IncomingMessage::Request(request)) => {
            debug!(
                session = %session_id,
                method = %request.method,
                id = request.id,
                "ignoring server-to-client request"
            );
        }
        Err(e) => {
            warn!(session = %session_id, error = %e, "unparseable server message");
        }
    }
}

/// Run the session handshake: `initialize` request then `initialized`
/// notification
pub async fn handshake(
    connection: &SessionConnection,
    identity: &SessionIdentity,
    root_uri: Option<&Url>,
) -> Result<()> {
    let result = connection
        .request(
            "initialize",
            Some(protocol::initialize_params(identity, root_uri)),
        )
        .await
        .map_err(|e| ClientError::Handshake(format!("initialize failed: {}", e)))?;

    debug!(
        session = %identity.id,
        has_capabilities = result.get("capabilities").is_some(),
        "initialize response received"
    );

    connection.notify("initialized", Some(json!({}))).await?;
    Ok(())
}
