//! ECDH-PSI state machine (C9), §4.9.
//!
//! Client (set X) and server (set Y) each hold a secret exponent on the
//! agreed curve. Round shape: handshake, client streams `H(X)^x`, server
//! streams back `(H(X)^x)^y`, server streams `H(Y)^y`, client raises it to
//! `Y'' = (H(Y)^y)^x` locally, then both equality-compare over a hash set.
//! Out-of-order batches on any one stream are buffered by sequence number
//! and drained only when the next-expected sequence arrives (§4.9
//! "Ordering").

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::ecc::{CurveType, EcGroup, EcScalar};
use crate::crypto::hash::{hash, HashType};
use crate::error::{PpcError, PpcResult};
use crate::protocol::framing::{AlgorithmId, FramedMessage, MessageType, TaskType};
use crate::transport::Transport;

pub const DEFAULT_BATCH_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EcdhPsiParams {
    pub curve: CurveType,
    pub hash: HashType,
    pub batch_size: usize,
    pub sync_results_back: bool,
}

impl Default for EcdhPsiParams {
    fn default() -> Self {
        Self {
            curve: CurveType::P256,
            hash: HashType::Sha256,
            batch_size: DEFAULT_BATCH_SIZE,
            sync_results_back: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HandshakeParams {
    curve: CurveType,
}

/// One direction's batch of raised points, keyed by a monotonically
/// increasing round sequence so the receiving side can reorder.
#[derive(Debug, Serialize, Deserialize)]
struct RaisedBatch {
    points: Vec<Vec<u8>>,
    is_final: bool,
}

/// Buffers batches that arrive out of order, releasing them to the caller
/// strictly in sequence order as gaps are filled (§4.9 "Ordering").
struct SequenceBuffer<T> {
    next_expected: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> SequenceBuffer<T> {
    fn new() -> Self {
        Self {
            next_expected: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Inserts `item` at `seq`, then drains every now-contiguous item
    /// starting at `next_expected`.
    fn push(&mut self, seq: u64, item: T) -> Vec<T> {
        self.pending.insert(seq, item);
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_expected) {
            ready.push(item);
            self.next_expected += 1;
        }
        ready
    }
}

fn hash_items(group: &EcGroup, items: &[Vec<u8>]) -> PpcResult<Vec<crate::crypto::ecc::EcPoint>> {
    items.iter().map(|item| group.hash_to_curve(item)).collect()
}

fn raise_batch(
    group: &EcGroup,
    scalar: &EcScalar,
    points: &[crate::crypto::ecc::EcPoint],
) -> PpcResult<Vec<Vec<u8>>> {
    points
        .iter()
        .map(|p| group.point_mul(p, scalar).map(|q| q.to_bytes()))
        .collect()
}

fn truncated_hashes(hash_ty: HashType, points: &[Vec<u8>]) -> PpcResult<HashSet<Vec<u8>>> {
    points.iter().map(|p| hash(hash_ty, p)).collect()
}

async fn send(
    transport: &dyn Transport,
    peer_id: &str,
    task_id: &str,
    sender_id: &str,
    message_type: MessageType,
    seq: u64,
    payload: Vec<u8>,
) -> PpcResult<()> {
    let msg = FramedMessage::new(
        TaskType::Psi,
        AlgorithmId::EcdhPsi,
        message_type,
        seq,
        task_id,
        sender_id,
        &[],
        payload,
    )?;
    transport.send(peer_id, msg).await
}

/// Runs the client side (holder of set `X`). Returns the discovered
/// intersection when `sync_results_back` is set, otherwise an empty set
/// (the server holds the authoritative result in that mode).
pub async fn run_client(
    transport: Arc<dyn Transport>,
    task_id: &str,
    peer_id: &str,
    self_id: &str,
    params: EcdhPsiParams,
    items: &[Vec<u8>],
) -> PpcResult<HashSet<Vec<u8>>> {
    let group = EcGroup::new(params.curve);
    let x_k = group.random_scalar();

    send(
        transport.as_ref(),
        peer_id,
        task_id,
        self_id,
        MessageType::HandshakeRequest,
        0,
        crate::protocol::bounded::to_bytes(&HandshakeParams { curve: params.curve })?,
    )
    .await?;
    let ack = transport.recv(self_id, task_id).await?;
    if !matches!(ack.message_type, MessageType::HandshakeResponse) {
        return Err(PpcError::UndefinedCommand(
            "expected HandshakeResponse".into(),
        ));
    }

    // Round 2: stream H(X)^x to the server in sequenced batches.
    let mut seq = 0u64;
    for (batch_no, chunk) in items.chunks(params.batch_size).enumerate() {
        let hashed = hash_items(&group, chunk)?;
        let raised = raise_batch(&group, &x_k, &hashed)?;
        let is_final = (batch_no + 1) * params.batch_size >= items.len();
        send(
            transport.as_ref(),
            peer_id,
            task_id,
            self_id,
            MessageType::HashBatch,
            seq,
            crate::protocol::bounded::to_bytes(&RaisedBatch {
                points: raised,
                is_final,
            })?,
        )
        .await?;
        seq += 1;
    }

    // Round 3: receive X'' = (X')^y back from the server, in order.
    let mut x_double_prime = Vec::with_capacity(items.len());
    let mut buf = SequenceBuffer::new();
    loop {
        let msg = transport.recv(self_id, task_id).await?;
        if !matches!(msg.message_type, MessageType::HashBatch) || !msg.response {
            continue;
        }
        let batch: RaisedBatch = crate::protocol::bounded::from_bytes(&msg.payload)?;
        let is_final = batch.is_final;
        for ready in buf.push(msg.seq, batch) {
            x_double_prime.extend(ready.points);
        }
        if is_final && buf.pending.is_empty() {
            break;
        }
    }

    // Round 4: receive Y' = H(Y)^y, raise locally to Y'' = (Y')^x.
    let mut y_prime = Vec::new();
    let mut buf = SequenceBuffer::new();
    loop {
        let msg = transport.recv(self_id, task_id).await?;
        if !matches!(msg.message_type, MessageType::OprfEvaluateResponse) {
            continue;
        }
        let batch: RaisedBatch = crate::protocol::bounded::from_bytes(&msg.payload)?;
        let is_final = batch.is_final;
        for ready in buf.push(msg.seq, batch) {
            y_prime.extend(ready.points);
        }
        if is_final && buf.pending.is_empty() {
            break;
        }
    }
    let y_points: Vec<crate::crypto::ecc::EcPoint> = y_prime
        .iter()
        .map(|b| group.point_from_bytes(b))
        .collect::<PpcResult<_>>()?;
    let y_double_prime = raise_batch(&group, &x_k, &y_points)?;

    // Round 5: intersect by equality of truncated hashes.
    let x_hashes = truncated_hashes(params.hash, &x_double_prime)?;
    let y_hashes = truncated_hashes(params.hash, &y_double_prime)?;
    let matched: HashSet<Vec<u8>> = x_hashes.intersection(&y_hashes).cloned().collect();

    // Recover original X items whose hash landed in the intersection.
    let mut result = HashSet::new();
    for (item, point_bytes) in items.iter().zip(x_double_prime.iter()) {
        if matched.contains(&hash(params.hash, point_bytes)?) {
            result.insert(item.clone());
        }
    }
    Ok(result)
}

/// Runs the server side (holder of set `Y`).
pub async fn run_server(
    transport: Arc<dyn Transport>,
    task_id: &str,
    peer_id: &str,
    self_id: &str,
    params: EcdhPsiParams,
    items: &[Vec<u8>],
) -> PpcResult<()> {
    let group = EcGroup::new(params.curve);
    let y_k = group.random_scalar();

    let handshake = transport.recv(self_id, task_id).await?;
    if !matches!(handshake.message_type, MessageType::HandshakeRequest) {
        return Err(PpcError::UndefinedCommand(
            "expected HandshakeRequest".into(),
        ));
    }
    let client_params: HandshakeParams = crate::protocol::bounded::from_bytes(&handshake.payload)?;
    if client_params.curve != params.curve {
        send(
            transport.as_ref(),
            peer_id,
            task_id,
            self_id,
            MessageType::ErrorNotification,
            0,
            b"curve mismatch".to_vec(),
        )
        .await?;
        return Err(PpcError::UnsupportedCurveType(format!(
            "{:?}",
            client_params.curve
        )));
    }
    send(
        transport.as_ref(),
        peer_id,
        task_id,
        self_id,
        MessageType::HandshakeResponse,
        0,
        vec![],
    )
    .await?;

    // Round 2/3: receive X' batches, raise to X'', stream back.
    let mut buf = SequenceBuffer::new();
    let mut resp_seq = 0u64;
    loop {
        let msg = transport.recv(self_id, task_id).await?;
        if !matches!(msg.message_type, MessageType::HashBatch) || msg.response {
            continue;
        }
        let batch: RaisedBatch = crate::protocol::bounded::from_bytes(&msg.payload)?;
        let is_final = batch.is_final;
        let seq = msg.seq;
        for ready in buf.push(seq, batch) {
            let points: Vec<crate::crypto::ecc::EcPoint> = ready
                .points
                .iter()
                .map(|b| group.point_from_bytes(b))
                .collect::<PpcResult<_>>()?;
            let raised = raise_batch(&group, &y_k, &points)?;
            let mut out = FramedMessage::new(
                TaskType::Psi,
                AlgorithmId::EcdhPsi,
                MessageType::HashBatch,
                resp_seq,
                task_id,
                self_id,
                &[],
                crate::protocol::bounded::to_bytes(&RaisedBatch {
                    points: raised,
                    is_final: ready.is_final,
                })?,
            )?;
            out.response = true;
            transport.send(peer_id, out).await?;
            resp_seq += 1;
        }
        if is_final && buf.pending.is_empty() {
            break;
        }
    }

    // Round 4: stream Y' = H(Y)^y to the client.
    let mut seq = 0u64;
    for (batch_no, chunk) in items.chunks(params.batch_size).enumerate() {
        let hashed = hash_items(&group, chunk)?;
        let raised = raise_batch(&group, &y_k, &hashed)?;
        let is_final = (batch_no + 1) * params.batch_size >= items.len();
        send(
            transport.as_ref(),
            peer_id,
            task_id,
            self_id,
            MessageType::OprfEvaluateResponse,
            seq,
            crate::protocol::bounded::to_bytes(&RaisedBatch {
                points: raised,
                is_final,
            })?,
        )
        .await?;
        seq += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    #[tokio::test]
    async fn intersection_matches_expected_scenario() {
        let mem = Arc::new(InMemoryTransport::new());
        mem.register("server", "task-1");
        mem.register("client", "task-1");
        let transport: Arc<dyn Transport> = mem;

        let params = EcdhPsiParams::default();
        let x: Vec<Vec<u8>> = ["apple", "banana", "cherry", "date"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();
        let y: Vec<Vec<u8>> = ["banana", "date", "elder", "fig"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        let client_transport = Arc::clone(&transport);
        let server_transport = Arc::clone(&transport);
        let client_params = params;
        let server_params = params;

        let (client_result, server_result) = tokio::join!(
            run_client(
                client_transport,
                "task-1",
                "server",
                "client",
                client_params,
                &x
            ),
            run_server(
                server_transport,
                "task-1",
                "client",
                "server",
                server_params,
                &y
            )
        );

        server_result.unwrap();
        let intersection = client_result.unwrap();
        let expected: HashSet<Vec<u8>> = ["banana", "date"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();
        assert_eq!(intersection, expected);
    }

    #[test]
    fn sequence_buffer_reorders_out_of_order_batches() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new();
        assert!(buf.push(1, 10).is_empty());
        assert!(buf.push(2, 20).is_empty());
        assert_eq!(buf.push(0, 0), vec![0, 10, 20]);
    }
}
