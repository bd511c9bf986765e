//! Engine configuration — a plain, read-only-after-`start()` value.
//!
//! Replaces the ambient global config/flag pattern of the original
//! implementation (a process-wide "SM-crypto mode" switch) with an
//! explicit struct passed by value into every constructor that needs it.

use serde::{Deserialize, Serialize};

use crate::crypto::ecc::CurveType;
use crate::crypto::hash::HashType;
use crate::crypto::prng::PrngType;

/// CM2020 bucket geometry. Both parties must agree on every field here —
/// a party that receives a handshake implying different geometry aborts
/// the task (§4.10).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cm2020Params {
    /// Number of OKVS columns (buckets). Default chosen to match the
    /// reference implementation's default for small-to-medium inputs.
    pub bucket_number: u32,
    /// `log2` of the per-group column count above which the matrix is
    /// processed in `handle_width`-sized column groups rather than all
    /// at once, bounding peak memory (§4.10 "Batching").
    pub handle_width_power: u32,
    pub min_handle_width: u32,
    /// Minimum bucket size in bits, applied as a floor regardless of
    /// how small the input sets are.
    pub min_bucket_size: u32,
    /// Bits of bucket reserved per input item; bucket_size_bytes =
    /// max(min_bucket_size/8, ceil(max_input_size * encode_rate / 8)).
    pub encode_rate: f64,
    /// Chunk size (bytes) for a single MATRIX_CHUNK wire message.
    pub max_send_buffer_len: u32,
    /// Truncated hash length (bytes) used for the PSI-finish SENDHASHES
    /// batches; with 128-bit (16-byte) truncation the false-positive
    /// probability is 2^-60-ish at realistic set sizes (§8).
    pub result_len_bytes: u32,
}

impl Default for Cm2020Params {
    fn default() -> Self {
        Self {
            bucket_number: 512,
            handle_width_power: 20,
            min_handle_width: 1,
            min_bucket_size: 512,
            encode_rate: 1.5,
            max_send_buffer_len: 1 << 20,
            result_len_bytes: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub curve: CurveType,
    pub hash: HashType,
    pub prng: PrngType,

    /// Shared worker pool size for batched crypto (EC multiplies, hashes,
    /// PRNG expansions). Defaults to the host's available parallelism.
    pub thread_pool_size: usize,

    /// Bounded admission queue capacity in the dispatcher (C12).
    pub task_queue_capacity: usize,

    /// Dispatcher's parallelism semaphore; defaults to `thread_pool_size`.
    pub max_concurrent_tasks: usize,

    /// Per-send network timeout, milliseconds.
    pub network_timeout_ms: u64,

    /// A task that hasn't reached a terminal state within this window is
    /// aborted and the peer notified (§5). Minutes in production,
    /// milliseconds in tests — callers pick the unit via this field's
    /// raw value, which is always interpreted as milliseconds here.
    pub task_expire_ms: u64,

    /// Grace period after a task finishes during which late peer
    /// messages are still acknowledged, then the routing entry is
    /// dropped (§4.12).
    pub waiting_peer_finish_minutes: u64,

    /// How often the agency directory is refreshed (§6).
    pub agency_refresh_ms: u64,

    /// Peer keepalive ping interval.
    pub ping_interval_ms: u64,

    pub cm2020: Cm2020Params,

    /// Obfuscation prefix length (in bytes of the search-id hash) used
    /// by default for OT-PIR when a task doesn't override it (§4.11).
    pub default_pir_prefix_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            curve: CurveType::P256,
            hash: HashType::Sha256,
            prng: PrngType::Aes,
            thread_pool_size: parallelism,
            task_queue_capacity: 256,
            max_concurrent_tasks: parallelism,
            network_timeout_ms: 30_000,
            task_expire_ms: 3_000,
            waiting_peer_finish_minutes: 5,
            agency_refresh_ms: 3_000,
            ping_interval_ms: 60_000,
            cm2020: Cm2020Params::default(),
            default_pir_prefix_len: 6,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> crate::error::PpcResult<()> {
        if self.thread_pool_size == 0 {
            return Err(crate::error::PpcError::InvalidConfig(
                "thread_pool_size must be > 0".into(),
            ));
        }
        if self.cm2020.bucket_number == 0 {
            return Err(crate::error::PpcError::InvalidConfig(
                "cm2020.bucket_number must be > 0".into(),
            ));
        }
        if self.cm2020.result_len_bytes == 0 || self.cm2020.result_len_bytes > 32 {
            return Err(crate::error::PpcError::InvalidConfig(
                "cm2020.result_len_bytes must be in 1..=32".into(),
            ));
        }
        Ok(())
    }
}
