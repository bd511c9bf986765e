//! CM2020 OT-extension PSI (C10), §4.10 — the hardest subsystem.
//!
//! Roles follow the spec's naming, which is inverted relative to the
//! underlying random-OT step: the PSI *receiver* builds the OKVS matrix
//! and plays the Simplest-OT *sender* role (ends up with both keys per
//! column); the PSI *sender* holds the OT choice bits and plays the
//! Simplest-OT *receiver* role (ends up with one key per column).
//!
//! Grounded on `wedpr-computing/ppc-psi`'s CM2020 sender/receiver pair:
//! handshake → random OT → chunked matrix exchange gated by a progress
//! barrier per column group → local OPRF evaluation → truncated-hash
//! intersection.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Cm2020Params;
use crate::crypto::bitvector::BitVector;
use crate::crypto::ecc::CurveType;
use crate::crypto::hash::{hash, HashType};
use crate::crypto::prng::{Prng, PrngType};
use crate::crypto::simplest_ot::{SimplestOtReceiver, SimplestOtSender};
use crate::error::PpcResult;
use crate::protocol::barrier::ProgressBarrier;
use crate::protocol::bounded::BoundedVec;
use crate::protocol::framing::{
    AlgorithmId, Cm2020Handshake, FramedMessage, MessageType, NextRound, OtPointA, OtPointsB,
    ResultIndices, TaskType,
};
use crate::transport::Transport;

/// `L(v) = (L0..L7)`, eight 32-bit location seeds derived from the item
/// (§4.10 "Preprocessing"). The task id is hashed in ahead of the item so
/// that two sessions over the same input sets land on different bucket
/// locations for the same item.
fn location_seeds(hash_ty: HashType, task_id: &str, item: &[u8]) -> PpcResult<[u32; 8]> {
    let mut seeds = [0u32; 8];
    for (i, slot) in seeds.iter_mut().enumerate() {
        let mut buf = task_id.as_bytes().to_vec();
        buf.extend_from_slice(item);
        buf.push(i as u8);
        let digest = hash(hash_ty, &buf)?;
        *slot = u32::from_le_bytes(digest[..4].try_into().unwrap());
    }
    Ok(seeds)
}

/// `((L[j mod 4] * j) + L[4 + j mod 4]) mod m`.
fn bit_location(seeds: &[u32; 8], j: u32, bucket_bits: u32) -> usize {
    let jmod4 = (j % 4) as usize;
    let a = seeds[jmod4] as u64;
    let b = seeds[4 + jmod4] as u64;
    (a.wrapping_mul(j as u64).wrapping_add(b) % bucket_bits as u64) as usize
}

pub fn bucket_size_bytes(max_input_size: u64, params: &Cm2020Params) -> u32 {
    let by_min = params.min_bucket_size / 8;
    let by_rate = ((max_input_size as f64 * params.encode_rate) / 8.0).ceil() as u32;
    by_min.max(by_rate).max(1)
}

fn handle_width(params: &Cm2020Params, bucket_size_bytes: u32, bucket_number: u32) -> u32 {
    const MEMORY_BUDGET: u32 = 1 << 26;
    let by_memory = (MEMORY_BUDGET / bucket_size_bytes.max(1)).max(params.min_handle_width);
    let by_power = 1u32 << params.handle_width_power.min(31);
    by_memory
        .min(by_power)
        .min(bucket_number.max(1))
        .max(params.min_handle_width)
        .max(1)
}

fn prng_column(key: &[u8; 16], len_bytes: usize) -> Vec<u8> {
    let mut prng = Prng::new(PrngType::Aes, key).expect("16-byte AES key");
    prng.generate(len_bytes)
}

/// Receiver's per-column secrets and expanded mask, kept around across the
/// matrix-send and OPRF phases.
struct ReceiverColumn {
    a: BitVector,
    m: Vec<u8>,
}

fn build_receiver_column(
    keys: &(Vec<u8>, Vec<u8>),
    bucket_size_bytes: u32,
    bucket_bits: u32,
    locations: &[usize],
) -> ReceiverColumn {
    let key0: [u8; 16] = keys.0[..16].try_into().unwrap();
    let key1: [u8; 16] = keys.1[..16].try_into().unwrap();
    let a_bytes = prng_column(&key0, bucket_size_bytes as usize);
    let a = BitVector::from_bytes(a_bytes, bucket_bits as usize);

    let mut delta = BitVector::ones(bucket_bits as usize);
    for &loc in locations {
        delta.clear(loc);
    }

    let prng1 = BitVector::from_bytes(
        prng_column(&key1, bucket_size_bytes as usize),
        bucket_bits as usize,
    );

    let mut m = a.clone();
    m.xor_into(&delta);
    m.xor_into(&prng1);

    ReceiverColumn {
        a,
        m: m.as_bytes().to_vec(),
    }
}

fn build_sender_column(
    choice: bool,
    key: &[u8; 16],
    m_bytes: &[u8],
    bucket_size_bytes: u32,
    bucket_bits: u32,
) -> BitVector {
    let prng_bytes = prng_column(key, bucket_size_bytes as usize);
    if !choice {
        BitVector::from_bytes(prng_bytes, bucket_bits as usize)
    } else {
        let mut c = BitVector::from_bytes(m_bytes.to_vec(), bucket_bits as usize);
        c.xor_into(&BitVector::from_bytes(prng_bytes, bucket_bits as usize));
        c
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MatrixChunkWire {
    column: u32,
    chunk_seq: u32,
    total_chunks: u32,
    data: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HashEntry {
    global_index: u64,
    digest: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HashBatchWire {
    entries: Vec<HashEntry>,
    is_final: bool,
}

async fn send_framed(
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
        AlgorithmId::Cm2020Psi,
        message_type,
        seq,
        task_id,
        sender_id,
        &[],
        payload,
    )?;
    transport.send(peer_id, msg).await
}

async fn recv_typed(
    transport: &dyn Transport,
    self_id: &str,
    task_id: &str,
    expected: MessageType,
) -> PpcResult<FramedMessage> {
    loop {
        let msg = transport.recv(self_id, task_id).await?;
        if std::mem::discriminant(&msg.message_type) == std::mem::discriminant(&expected) {
            return Ok(msg);
        }
    }
}

/// Runs the PSI-receiver side: builds the OKVS matrix, streams `M`, and
/// finishes by matching sender hashes against its own. Returns the
/// indices (into `my_items`) the receiver itself confirmed are shared.
pub async fn run_receiver(
    transport: Arc<dyn Transport>,
    task_id: &str,
    peer_id: &str,
    self_id: &str,
    curve: CurveType,
    hash_ty: HashType,
    params: Cm2020Params,
    my_items: &[Vec<u8>],
    max_input_size: u64,
    low_bandwidth: bool,
    sync_results_back: bool,
) -> PpcResult<Vec<u64>> {
    send_framed(
        transport.as_ref(),
        peer_id,
        task_id,
        self_id,
        MessageType::HandshakeRequest,
        0,
        crate::protocol::bounded::to_bytes(&Cm2020Handshake {
            bucket_number: params.bucket_number,
            seed: [0u8; 16],
            low_bandwidth,
            sync_results_back,
            input_size: max_input_size,
        })?,
    )
    .await?;

    let bucket_size = bucket_size_bytes(max_input_size, &params);
    let bucket_bits = bucket_size * 8;
    let n = params.bucket_number;

    // Random OT: receiver plays the Simplest-OT sender role.
    let ot_sender = SimplestOtSender::new(curve, hash_ty);
    let (a_scalar, big_a) = ot_sender.generate_point_a()?;
    send_framed(
        transport.as_ref(),
        peer_id,
        task_id,
        self_id,
        MessageType::OtPointA,
        0,
        crate::protocol::bounded::to_bytes(&OtPointA { point: big_a.to_bytes() })?,
    )
    .await?;
    let points_b_msg = recv_typed(
        transport.as_ref(),
        self_id,
        task_id,
        MessageType::OtPointsB,
    )
    .await?;
    let points_b_wire: OtPointsB = crate::protocol::bounded::from_bytes(&points_b_msg.payload)?;
    let group = crate::crypto::ecc::EcGroup::new(curve);
    let points_b: Vec<_> = points_b_wire
        .points
        .into_inner()
        .iter()
        .map(|b| group.point_from_bytes(b))
        .collect::<PpcResult<_>>()?;
    let keys: Vec<(Vec<u8>, Vec<u8>)> = ot_sender.finish_sender(&a_scalar, &big_a, &points_b)?;

    // Each local item's 8 location seeds, reused across all N columns.
    let item_seeds: Vec<[u32; 8]> = my_items
        .iter()
        .map(|v| location_seeds(hash_ty, task_id, v))
        .collect::<PpcResult<_>>()?;

    let width = handle_width(&params, bucket_size, n);
    let mut oprf_bits: Vec<BitVector> = my_items.iter().map(|_| BitVector::zeros(n as usize)).collect();

    let mut col = 0u32;
    let mut chunk_seq_counter = 0u64;
    while col < n {
        let group_end = (col + width).min(n);
        let group_cols: Vec<u32> = (col..group_end).collect();

        for &j in &group_cols {
            let locations: Vec<usize> = item_seeds
                .iter()
                .map(|seeds| bit_location(seeds, j, bucket_bits))
                .collect();
            let column = build_receiver_column(&keys[j as usize], bucket_size, bucket_bits, &locations);
            let chunks = crate::protocol::framing::chunk_bytes(&column.m, params.max_send_buffer_len as usize);
            let total_chunks = chunks.len() as u32;
            for (chunk_seq, chunk) in chunks.into_iter().enumerate() {
                send_framed(
                    transport.as_ref(),
                    peer_id,
                    task_id,
                    self_id,
                    MessageType::MatrixChunk,
                    chunk_seq_counter,
                    crate::protocol::bounded::to_bytes(&MatrixChunkWire {
                        column: j,
                        chunk_seq: chunk_seq as u32,
                        total_chunks,
                        data: chunk,
                    })?,
                )
                .await?;
                // §5 backpressure: under lowBandwidth each chunk send blocks
                // on the peer's ack instead of streaming ahead unacknowledged.
                if low_bandwidth {
                    recv_typed(transport.as_ref(), self_id, task_id, MessageType::ChunkAck).await?;
                }
                chunk_seq_counter += 1;
            }
            for (v, seeds) in item_seeds.iter().enumerate() {
                let loc = bit_location(seeds, j, bucket_bits);
                oprf_bits[v].set(j as usize, column.a.get(loc));
            }
        }

        recv_typed(transport.as_ref(), self_id, task_id, MessageType::NextRound).await?;
        col = group_end;
    }

    // PSI finish: build the local hash -> item-index map, then match
    // arriving sender hashes against it.
    let mut local_map: HashMap<Vec<u8>, u64> = HashMap::new();
    for (idx, bits) in oprf_bits.iter().enumerate() {
        let digest = hash(hash_ty, bits.as_bytes())?;
        local_map.insert(digest[..params.result_len_bytes as usize].to_vec(), idx as u64);
    }

    let mut my_matches = Vec::new();
    let mut sender_matches = Vec::new();
    loop {
        let msg = recv_typed(transport.as_ref(), self_id, task_id, MessageType::HashBatch).await?;
        let batch: HashBatchWire = crate::protocol::bounded::from_bytes(&msg.payload)?;
        for entry in &batch.entries {
            if let Some(&my_idx) = local_map.get(&entry.digest) {
                my_matches.push(my_idx);
                sender_matches.push(entry.global_index);
            }
        }
        if batch.is_final {
            break;
        }
    }

    if sync_results_back {
        let result_indices = ResultIndices {
            indices: BoundedVec::new(sender_matches).ok_or_else(|| {
                crate::error::PpcError::DataFormatError(
                    "too many matched indices for one message".into(),
                )
            })?,
        };
        send_framed(
            transport.as_ref(),
            peer_id,
            task_id,
            self_id,
            MessageType::ResultIndices,
            0,
            crate::protocol::bounded::to_bytes(&result_indices)?,
        )
        .await?;
    }

    Ok(my_matches)
}

/// Runs the PSI-sender side. Returns `Some(indices into my_items)` when
/// the receiver synced results back, `None` otherwise (§4.10 "PSI finish").
pub async fn run_sender(
    transport: Arc<dyn Transport>,
    task_id: &str,
    peer_id: &str,
    self_id: &str,
    curve: CurveType,
    hash_ty: HashType,
    my_items: &[Vec<u8>],
) -> PpcResult<Option<Vec<u64>>> {
    let handshake = recv_typed(
        transport.as_ref(),
        self_id,
        task_id,
        MessageType::HandshakeRequest,
    )
    .await?;
    let params: Cm2020Handshake = crate::protocol::bounded::from_bytes(&handshake.payload)?;
    let low_bandwidth = params.low_bandwidth;
    let sync_results_back = params.sync_results_back;
    let cm_params = Cm2020Params {
        bucket_number: params.bucket_number,
        ..Cm2020Params::default()
    };
    let max_input_size = params.input_size;
    let bucket_size = bucket_size_bytes(max_input_size, &cm_params);
    let bucket_bits = bucket_size * 8;
    let n = cm_params.bucket_number;

    // Random OT: sender plays the Simplest-OT receiver role, with a fresh
    // random choice bit per column.
    let point_a_msg = recv_typed(transport.as_ref(), self_id, task_id, MessageType::OtPointA).await?;
    let point_a: OtPointA = crate::protocol::bounded::from_bytes(&point_a_msg.payload)?;
    let group = crate::crypto::ecc::EcGroup::new(curve);
    let big_a = group.point_from_bytes(&point_a.point)?;

    let ot_receiver = SimplestOtReceiver::new(curve, hash_ty);
    let choices: Vec<bool> = (0..n).map(|_| rand::random::<bool>()).collect();
    let (b_scalars, b_points) = ot_receiver.generate_points_b(&big_a, &choices)?;
    let points_b_bytes: Vec<Vec<u8>> = b_points.iter().map(|p| p.to_bytes()).collect();
    let points_b_wire = OtPointsB {
        points: BoundedVec::new(points_b_bytes).ok_or_else(|| {
            crate::error::PpcError::DataFormatError("too many OT points for one bucket round".into())
        })?,
    };
    send_framed(
        transport.as_ref(),
        peer_id,
        task_id,
        self_id,
        MessageType::OtPointsB,
        0,
        crate::protocol::bounded::to_bytes(&points_b_wire)?,
    )
    .await?;
    let chosen_keys = ot_receiver.finish_receiver(&big_a, &b_scalars)?;

    let item_seeds: Vec<[u32; 8]> = my_items
        .iter()
        .map(|v| location_seeds(hash_ty, task_id, v))
        .collect::<PpcResult<_>>()?;

    let width = handle_width(&cm_params, bucket_size, n);
    let mut oprf_bits: Vec<BitVector> = my_items.iter().map(|_| BitVector::zeros(n as usize)).collect();

    let mut col = 0u32;
    while col < n {
        let group_end = (col + width).min(n);
        let group_cols: Vec<u32> = (col..group_end).collect();

        // Fires once every column in this group has all of its chunks.
        let matrix_barrier = ProgressBarrier::new();
        matrix_barrier.reset(group_cols.len() as i64);
        let mut pending: HashMap<u32, Vec<Option<Vec<u8>>>> = HashMap::new();

        while !matrix_barrier.is_completed() {
            let msg = recv_typed(
                transport.as_ref(),
                self_id,
                task_id,
                MessageType::MatrixChunk,
            )
            .await?;
            let chunk: MatrixChunkWire = crate::protocol::bounded::from_bytes(&msg.payload)?;
            if low_bandwidth {
                send_framed(
                    transport.as_ref(),
                    peer_id,
                    task_id,
                    self_id,
                    MessageType::ChunkAck,
                    msg.seq,
                    Vec::new(),
                )
                .await?;
            }
            if !group_cols.contains(&chunk.column) {
                continue;
            }
            let slots = pending
                .entry(chunk.column)
                .or_insert_with(|| vec![None; chunk.total_chunks as usize]);
            if chunk.chunk_seq as usize >= slots.len() {
                slots.resize(chunk.chunk_seq as usize + 1, None);
            }
            slots[chunk.chunk_seq as usize] = Some(chunk.data);
            if slots.iter().all(Option::is_some) {
                matrix_barrier.mark(chunk.column as u64);
            }
        }

        for &j in &group_cols {
            let slots = pending.remove(&j).expect("all columns received");
            let m_bytes = crate::protocol::framing::reassemble_chunks(
                &slots.into_iter().map(|s| s.expect("complete")).collect::<Vec<_>>(),
            );
            let key: [u8; 16] = chosen_keys[j as usize][..16].try_into().unwrap();
            let column = build_sender_column(choices[j as usize], &key, &m_bytes, bucket_size, bucket_bits);
            for (v, seeds) in item_seeds.iter().enumerate() {
                let loc = bit_location(seeds, j, bucket_bits);
                oprf_bits[v].set(j as usize, column.get(loc));
            }
        }

        send_framed(
            transport.as_ref(),
            peer_id,
            task_id,
            self_id,
            MessageType::NextRound,
            col as u64,
            crate::protocol::bounded::to_bytes(&NextRound { round: col })?,
        )
        .await?;
        col = group_end;
    }

    // PSI finish: stream truncated hashes of our own OPRF outputs.
    const FINISH_BATCH: usize = 256;
    let entries: Vec<HashEntry> = oprf_bits
        .iter()
        .enumerate()
        .map(|(idx, bits)| {
            let digest = hash(hash_ty, bits.as_bytes())?;
            Ok(HashEntry {
                global_index: idx as u64,
                digest: digest[..cm_params.result_len_bytes as usize].to_vec(),
            })
        })
        .collect::<PpcResult<_>>()?;

    let mut seq = 0u64;
    for (batch_no, chunk) in entries.chunks(FINISH_BATCH).enumerate() {
        let is_final = (batch_no + 1) * FINISH_BATCH >= entries.len();
        send_framed(
            transport.as_ref(),
            peer_id,
            task_id,
            self_id,
            MessageType::HashBatch,
            seq,
            crate::protocol::bounded::to_bytes(&HashBatchWire {
                entries: chunk.to_vec(),
                is_final,
            })?,
        )
        .await?;
        seq += 1;
    }
    if entries.is_empty() {
        send_framed(
            transport.as_ref(),
            peer_id,
            task_id,
            self_id,
            MessageType::HashBatch,
            0,
            crate::protocol::bounded::to_bytes(&HashBatchWire {
                entries: vec![],
                is_final: true,
            })?,
        )
        .await?;
    }

    if !sync_results_back {
        return Ok(None);
    }
    let result_msg = recv_typed(
        transport.as_ref(),
        self_id,
        task_id,
        MessageType::ResultIndices,
    )
    .await?;
    let indices: ResultIndices = crate::protocol::bounded::from_bytes(&result_msg.payload)?;
    Ok(Some(indices.indices.into_inner()))
}
