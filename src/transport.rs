//! External collaborator seams (§6): peer messaging, resource I/O, and
//! agency directory lookups. The dispatcher and protocol state machines
//! depend only on these traits, never on a concrete socket or database —
//! the same separation `net/peer.rs` draws between a `Peer`'s state and
//! the `mpsc` channel it's driven through.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::PpcResult;
use crate::protocol::framing::FramedMessage;

/// Sends/receives framed messages to/from a named peer agency. A real
/// deployment backs this with an HTTP or gRPC client to the peer's node;
/// tests back it with `InMemoryTransport`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, peer_id: &str, msg: FramedMessage) -> PpcResult<()>;

    /// Blocks until a message addressed to `task_id` on `peer_id` arrives.
    async fn recv(&self, peer_id: &str, task_id: &str) -> PpcResult<FramedMessage>;
}

/// Resolves a logical agency id to whatever the deployment needs to reach
/// it (URL, node id). Refreshed periodically per `EngineConfig::agency_refresh_ms`.
#[async_trait]
pub trait AgencyDirectory: Send + Sync {
    async fn resolve(&self, agency_id: &str) -> PpcResult<String>;
}

/// A task's configured input source, abstracted over file / database /
/// in-memory origins (§3 `ResourceDescriptor`).
pub trait RecordReader: Send {
    /// Yields `(id, record)` pairs. PIR candidate loaders additionally
    /// filter by the hashed search prefix before this is called.
    fn read_all(&mut self) -> PpcResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

pub trait RecordWriter: Send {
    fn write_result(&mut self, result: &[u8]) -> PpcResult<()>;
}

/// An in-process `Transport` for integration tests: two task handles share
/// one `HashMap<(peer_id, task_id), VecDeque<FramedMessage>>`-backed
/// mailbox so a test can drive both sides of a protocol without a socket.
type Mailbox = tokio::sync::mpsc::UnboundedSender<FramedMessage>;
type Inbox = Arc<tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<FramedMessage>>>;

pub struct InMemoryTransport {
    mailboxes: Mutex<HashMap<(String, String), Mailbox>>,
    inboxes: Mutex<HashMap<(String, String), Inbox>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            inboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the receive side for `(peer_id, task_id)` so a later
    /// `send` addressed there has somewhere to land. Must be called once
    /// per logical endpoint before any peer sends to it.
    pub fn register(&self, peer_id: &str, task_id: &str) {
        let key = (peer_id.to_string(), task_id.to_string());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.mailboxes.lock().unwrap().insert(key.clone(), tx);
        self.inboxes
            .lock()
            .unwrap()
            .insert(key, Arc::new(tokio::sync::Mutex::new(rx)));
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, peer_id: &str, msg: FramedMessage) -> PpcResult<()> {
        let task_id = msg.task_id_str()?.to_string();
        let key = (peer_id.to_string(), task_id);
        let sender = {
            let guard = self.mailboxes.lock().unwrap();
            guard.get(&key).cloned()
        };
        match sender {
            Some(tx) => tx
                .send(msg)
                .map_err(|_| crate::error::PpcError::SendFailure("peer mailbox closed".into())),
            None => Err(crate::error::PpcError::SendFailure(format!(
                "no registered endpoint for peer {:?}",
                key
            ))),
        }
    }

    async fn recv(&self, peer_id: &str, task_id: &str) -> PpcResult<FramedMessage> {
        let key = (peer_id.to_string(), task_id.to_string());
        let inbox = {
            let guard = self.inboxes.lock().unwrap();
            guard.get(&key).cloned()
        };
        let inbox = inbox.ok_or_else(|| {
            crate::error::PpcError::SendFailure(format!("no registered endpoint for peer {:?}", key))
        })?;
        let mut rx = inbox.lock().await;
        rx.recv()
            .await
            .ok_or_else(|| crate::error::PpcError::SendFailure("peer mailbox closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::framing::{AlgorithmId, MessageType, TaskType};

    #[tokio::test]
    async fn send_then_recv_delivers_in_order() {
        let transport = InMemoryTransport::new();
        transport.register("receiver-side", "task-1");

        let msg = FramedMessage::new(
            TaskType::Psi,
            AlgorithmId::EcdhPsi,
            MessageType::HandshakeRequest,
            0,
            "task-1",
            "sender-side",
            b"",
            vec![9, 9],
        )
        .unwrap();
        transport.send("receiver-side", msg).await.unwrap();

        let received = transport.recv("receiver-side", "task-1").await.unwrap();
        assert_eq!(received.payload.0, vec![9, 9]);
    }

    #[tokio::test]
    async fn send_to_unregistered_peer_errors() {
        let transport = InMemoryTransport::new();
        let msg = FramedMessage::new(
            TaskType::Psi,
            AlgorithmId::EcdhPsi,
            MessageType::PingPeer,
            0,
            "task-x",
            "sender-side",
            b"",
            vec![],
        )
        .unwrap();
        assert!(transport.send("nobody", msg).await.is_err());
    }
}
