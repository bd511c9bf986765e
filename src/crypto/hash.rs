//! Hash primitives (C1): SHA-256/512, SM3, MD5, BLAKE2b, and the
//! non-cryptographic BitMix-Murmur 64-bit hash used for cuckoo-filter tags.

use blake2::digest::{Update, VariableOutput};
use blake2::{Blake2bMac512, Blake2bVar};
use digest::{Digest, Mac};
use md5::Md5;
use sha2::{Sha256, Sha512};
use sm3::Sm3;

use crate::error::{PpcError, PpcResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HashType {
    Sha256,
    Sha512,
    Sm3,
    Md5,
    /// Output length in bytes, 16..=64.
    Blake2b(u8),
}

impl HashType {
    pub fn output_len(self) -> usize {
        match self {
            HashType::Sha256 => 32,
            HashType::Sha512 => 64,
            HashType::Sm3 => 32,
            HashType::Md5 => 16,
            HashType::Blake2b(n) => n as usize,
        }
    }
}

/// One-shot hash of `input` under `ty`. Equivalent to `init + update + final`.
pub fn hash(ty: HashType, input: &[u8]) -> PpcResult<Vec<u8>> {
    let mut state = HashState::init(ty)?;
    state.update(input);
    state.finish()
}

/// Incrementally updatable hash state, tagged by algorithm.
pub enum HashState {
    Sha256(Sha256),
    Sha512(Sha512),
    Sm3(Sm3),
    Md5(Md5),
    Blake2b { out_len: usize, inner: Blake2bVar },
}

impl HashState {
    pub fn init(ty: HashType) -> PpcResult<Self> {
        Ok(match ty {
            HashType::Sha256 => HashState::Sha256(Sha256::new()),
            HashType::Sha512 => HashState::Sha512(Sha512::new()),
            HashType::Sm3 => HashState::Sm3(Sm3::new()),
            HashType::Md5 => HashState::Md5(Md5::new()),
            HashType::Blake2b(n) => {
                if !(16..=64).contains(&n) {
                    return Err(PpcError::UnsupportedHashType(format!(
                        "blake2b output length {n} out of range 16..=64"
                    )));
                }
                HashState::Blake2b {
                    out_len: n as usize,
                    inner: Blake2bVar::new(n as usize)
                        .map_err(|e| PpcError::Internal(e.to_string()))?,
                }
            }
        })
    }

    pub fn update(&mut self, input: &[u8]) {
        match self {
            HashState::Sha256(h) => Digest::update(h, input),
            HashState::Sha512(h) => Digest::update(h, input),
            HashState::Sm3(h) => Digest::update(h, input),
            HashState::Md5(h) => Digest::update(h, input),
            HashState::Blake2b { inner, .. } => Update::update(inner, input),
        }
    }

    pub fn finish(self) -> PpcResult<Vec<u8>> {
        Ok(match self {
            HashState::Sha256(h) => h.finalize().to_vec(),
            HashState::Sha512(h) => h.finalize().to_vec(),
            HashState::Sm3(h) => h.finalize().to_vec(),
            HashState::Md5(h) => h.finalize().to_vec(),
            HashState::Blake2b { out_len, inner } => {
                let mut out = vec![0u8; out_len];
                inner
                    .finalize_variable(&mut out)
                    .map_err(|e| PpcError::Internal(e.to_string()))?;
                out
            }
        })
    }
}

/// Keyed BLAKE2b, used by the BLAKE2b PRNG (C3) to hash a block index under
/// the stream's seed. `out_len` matches PRNG::BUFFER_CAPACITY for that
/// variant (64 bytes).
pub fn blake2b_keyed(key: &[u8], input: &[u8], out_len: usize) -> PpcResult<Vec<u8>> {
    if out_len == 64 {
        let mut mac =
            Blake2bMac512::new_from_slice(key).map_err(|e| PpcError::Internal(e.to_string()))?;
        Mac::update(&mut mac, input);
        return Ok(mac.finalize().into_bytes().to_vec());
    }
    // Non-default output width: BLAKE2b's keying convention folds the key
    // block in before the message; Blake2bVar doesn't expose a keyed
    // constructor for arbitrary output sizes, so the key is hashed in as a
    // length-prefixed prefix block instead.
    let mut inner =
        Blake2bVar::new(out_len).map_err(|e| PpcError::Internal(e.to_string()))?;
    Update::update(&mut inner, &(key.len() as u64).to_le_bytes());
    Update::update(&mut inner, key);
    Update::update(&mut inner, input);
    let mut out = vec![0u8; out_len];
    inner
        .finalize_variable(&mut out)
        .map_err(|e| PpcError::Internal(e.to_string()))?;
    Ok(out)
}

/// Non-cryptographic 64-bit mix, used only where collision probability (not
/// preimage resistance) matters — cuckoo-filter tags and PIR id hints (§4.1).
pub fn hash64(bytes: &[u8], seed: u64) -> u64 {
    // Murmur-style: fold the input 8 bytes at a time with a multiplicative
    // mix, then run it through Murmur3's 64-bit finalizer (fmix64).
    const M: u64 = 0xc6a4_a7935_bd1e995u64;
    let mut h = seed ^ (bytes.len() as u64).wrapping_mul(M);

    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        let mut k = u64::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> 47;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut buf = [0u8; 8];
        buf[..rem.len()].copy_from_slice(rem);
        h ^= u64::from_le_bytes(buf);
        h = h.wrapping_mul(M);
    }

    fmix64(h)
}

pub fn hash64_u64(value: u64, seed: u64) -> u64 {
    hash64(&value.to_le_bytes(), seed)
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        for ty in [
            HashType::Sha256,
            HashType::Sha512,
            HashType::Sm3,
            HashType::Md5,
            HashType::Blake2b(32),
        ] {
            let a = hash(ty, b"determinism matters").unwrap();
            let b = hash(ty, b"determinism matters").unwrap();
            assert_eq!(a, b);
            assert_eq!(a.len(), ty.output_len());
        }
    }

    #[test]
    fn incremental_matches_oneshot() {
        let whole = hash(HashType::Sha256, b"hello world").unwrap();
        let mut st = HashState::init(HashType::Sha256).unwrap();
        st.update(b"hello ");
        st.update(b"world");
        assert_eq!(whole, st.finish().unwrap());
    }

    #[test]
    fn blake2b_rejects_out_of_range_length() {
        assert!(HashState::init(HashType::Blake2b(8)).is_err());
        assert!(HashState::init(HashType::Blake2b(65)).is_err());
    }

    #[test]
    fn hash64_is_deterministic_and_seed_sensitive() {
        let a = hash64(b"cuckoo", 1);
        let b = hash64(b"cuckoo", 1);
        let c = hash64(b"cuckoo", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
