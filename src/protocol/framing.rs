//! Framing (C13): length-delimited, tagged-payload wire messages.
//!
//! Grounded on `net/message.rs`'s tagged `Message` enum (`command()` /
//! `max_size_for_command()` pattern) generalized from a blockchain gossip
//! protocol to the PSI/PIR message set of §6, and on `net/serde_safe.rs`'s
//! `BoundedVec`/`BoundedBytes` for defense-in-depth against a peer's length
//! prefix. Message-type numeric ids are part of the wire contract and MUST
//! NOT be renumbered.

use serde::{Deserialize, Serialize};

use crate::error::{PpcError, PpcResult};
use crate::protocol::bounded::{to_bytes, BoundedBytes, BoundedVec};

pub const MAX_TASK_ID_LEN: usize = 64;
pub const MAX_AGENCY_ID_LEN: usize = 128;
pub const MAX_NODE_BYTES_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    Psi,
    Pir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmId {
    EcdhPsi,
    Cm2020Psi,
    OtPir,
}

/// Stable numeric identifiers (§6) — shared across peers, never renamed
/// away from their wire value even if the Rust variant is renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum MessageType {
    ErrorNotification = 0,
    PingPeer = 1,
    HandshakeRequest = 2,
    HandshakeResponse = 3,
    SizeAnnounceSender = 4,
    SizeAnnounceReceiver = 5,
    OtPointA = 6,
    OtPointsB = 7,
    MatrixChunk = 8,
    NextRound = 9,
    HashBatch = 10,
    ResultCount = 11,
    ResultIndices = 12,
    OprfBlindRequest = 13,
    OprfEvaluateResponse = 14,
    PsiParamsRequest = 15,
    PsiParamsResponse = 16,
    PirHello = 17,
    PirResults = 18,
    /// Per-chunk acknowledgement used only under `lowBandwidth` (§5):
    /// the receiver awaits one of these before sending its next MATRIX_CHUNK,
    /// turning the default fire-and-forget stream into a synchronous one.
    ChunkAck = 19,
}

pub const FRAME_VERSION: u8 = 1;

/// A header-plus-payload record (§3 "Framed message"). `{task_id,
/// algorithm_id}` together select a state machine instance; `seq` orders
/// packets within one message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramedMessage {
    pub version: u8,
    pub task_type: TaskType,
    pub algorithm_id: AlgorithmId,
    pub message_type: MessageType,
    pub seq: u64,
    pub task_id: BoundedBytes<MAX_TASK_ID_LEN>,
    pub sender_id: BoundedBytes<MAX_AGENCY_ID_LEN>,
    pub sender_node: BoundedBytes<MAX_NODE_BYTES_LEN>,
    pub uuid: Option<[u8; 16]>,
    pub response: bool,
    pub payload: BoundedBytes<{ crate::protocol::bounded::MAX_CHUNK_BYTES }>,
}

impl FramedMessage {
    pub fn new(
        task_type: TaskType,
        algorithm_id: AlgorithmId,
        message_type: MessageType,
        seq: u64,
        task_id: &str,
        sender_id: &str,
        sender_node: &[u8],
        payload: Vec<u8>,
    ) -> PpcResult<Self> {
        Ok(Self {
            version: FRAME_VERSION,
            task_type,
            algorithm_id,
            message_type,
            seq,
            task_id: BoundedBytes::new(task_id.as_bytes().to_vec())
                .ok_or_else(|| PpcError::DataFormatError("task id too long".into()))?,
            sender_id: BoundedBytes::new(sender_id.as_bytes().to_vec())
                .ok_or_else(|| PpcError::DataFormatError("sender id too long".into()))?,
            sender_node: BoundedBytes::new(sender_node.to_vec())
                .ok_or_else(|| PpcError::DataFormatError("sender node bytes too long".into()))?,
            uuid: None,
            response: false,
            payload: BoundedBytes::new(payload)
                .ok_or_else(|| PpcError::DataFormatError("payload exceeds frame ceiling".into()))?,
        })
    }

    pub fn task_id_str(&self) -> PpcResult<&str> {
        std::str::from_utf8(&self.payload_task_id())
            .map_err(|_| PpcError::DataFormatError("task id is not utf8".into()))
    }

    fn payload_task_id(&self) -> &[u8] {
        &self.task_id.0
    }

    pub fn error_notification(
        task_type: TaskType,
        algorithm_id: AlgorithmId,
        seq: u64,
        task_id: &str,
        sender_id: &str,
        reason: &str,
    ) -> PpcResult<Self> {
        Self::new(
            task_type,
            algorithm_id,
            MessageType::ErrorNotification,
            seq,
            task_id,
            sender_id,
            &[],
            reason.as_bytes().to_vec(),
        )
    }
}

pub fn encode(msg: &FramedMessage) -> PpcResult<Vec<u8>> {
    Ok(to_bytes(msg)?)
}

pub fn decode(bytes: &[u8]) -> PpcResult<FramedMessage> {
    Ok(crate::protocol::bounded::from_bytes(bytes)?)
}

// ---------------------------------------------------------------------
// Typed payloads, postcard-encoded into `FramedMessage::payload`.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cm2020Handshake {
    pub bucket_number: u32,
    pub seed: [u8; 16],
    pub low_bandwidth: bool,
    pub sync_results_back: bool,
    pub input_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtPointA {
    pub point: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtPointsB {
    pub points: BoundedVec<Vec<u8>, { crate::protocol::bounded::MAX_BUCKET_COLUMNS }>,
}

/// One fixed-size slice of column `column_index`'s matrix data; `round` is
/// the handle-width group this chunk belongs to (§4.10 "Batching").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixChunk {
    pub column_index: u32,
    pub round: u32,
    pub chunk_seq: u32,
    pub total_chunks: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextRound {
    pub round: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashBatch {
    pub hashes: BoundedVec<Vec<u8>, { crate::protocol::bounded::MAX_BATCH_ITEMS }>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultIndices {
    pub indices: BoundedVec<u64, { crate::protocol::bounded::MAX_BATCH_ITEMS }>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirHello {
    pub search_id_prefix: Vec<u8>,
    pub point_x: Vec<u8>,
    pub point_y: Vec<u8>,
    pub point_z: Vec<u8>,
    pub prefix_length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirResults {
    pub envelopes: BoundedVec<PirEnvelopeWire, { crate::protocol::bounded::MAX_PIR_CANDIDATES }>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PirEnvelopeWire {
    pub w: Vec<u8>,
    pub enc_key: [u8; 16],
    pub enc_record: Vec<u8>,
}

/// Batch `Vec<u8>` <-> chunk conversion used by CM2020's chunked send path
/// (§4.10). Grounded on `ppc-tools/src/common/TransTools.h`.
pub fn chunk_bytes(data: &[u8], chunk_len: usize) -> Vec<Vec<u8>> {
    if chunk_len == 0 {
        return vec![data.to_vec()];
    }
    data.chunks(chunk_len).map(|c| c.to_vec()).collect()
}

pub fn reassemble_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    let mut out = Vec::with_capacity(total);
    for c in chunks {
        out.extend_from_slice(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let msg = FramedMessage::new(
            TaskType::Psi,
            AlgorithmId::EcdhPsi,
            MessageType::HandshakeRequest,
            0,
            "task-1",
            "agency-a",
            b"node-bytes",
            vec![1, 2, 3],
        )
        .unwrap();
        let bytes = encode(&msg).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.seq, 0);
        assert_eq!(back.payload.0, vec![1, 2, 3]);
    }

    #[test]
    fn chunk_and_reassemble_is_identity() {
        let data: Vec<u8> = (0..257u16).map(|i| i as u8).collect();
        let chunks = chunk_bytes(&data, 64);
        assert_eq!(chunks.len(), 5);
        assert_eq!(reassemble_chunks(&chunks), data);
    }

    #[test]
    fn oversized_task_id_is_rejected() {
        let long_id = "x".repeat(MAX_TASK_ID_LEN + 1);
        let err = FramedMessage::new(
            TaskType::Psi,
            AlgorithmId::EcdhPsi,
            MessageType::HandshakeRequest,
            0,
            &long_id,
            "agency-a",
            b"",
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, PpcError::DataFormatError(_)));
    }
}
