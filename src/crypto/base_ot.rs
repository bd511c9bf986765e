//! 1-of-n base OT for PIR (C8).
//!
//! Grounded on `wedpr-computing/ppc-pir/src/BaseOT.h`. The sender (the PIR
//! querier) commits to a search id without revealing it; the receiver (the
//! data holder) builds one OT envelope per prefix-matching candidate row.
//! Exactly the envelope whose id equals the sender's search id yields a
//! usable AES key; every other candidate's derived key differs from the
//! sender's recovered key by an unknown multiple of the group generator,
//! so its envelope decrypts to garbage.

use crate::crypto::cipher::{self, CipherType};
use crate::crypto::ecc::{CurveType, EcGroup, EcPoint, EcScalar};
use crate::crypto::hash::{hash, hash64, HashType};
use crate::error::PpcResult;

const ENVELOPE_IV: [u8; 16] = [0u8; 16];

#[derive(Debug, Clone)]
pub struct SenderMessage {
    pub x: EcPoint,
    pub y: EcPoint,
    pub z: EcPoint,
    /// `H(searchId)[0..prefixLength]`, the obfuscated search prefix.
    pub prefix: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ReceiverEnvelope {
    pub w: EcPoint,
    /// The candidate's fresh AES key, XORed under the OT-derived key.
    pub enc_key: [u8; 16],
    pub enc_record: Vec<u8>,
}

fn hash64_scalar(group: &EcGroup, id: &[u8]) -> PpcResult<EcScalar> {
    let tag = hash64(id, 0);
    group.hash_to_scalar(&tag.to_le_bytes())
}

fn derive_aes_key(hash_ty: HashType, point: &EcPoint) -> PpcResult<[u8; 16]> {
    let digest = hash(hash_ty, &point.to_bytes())?;
    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    Ok(key)
}

fn xor16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

pub struct BaseOtSender {
    group: EcGroup,
    hash_ty: HashType,
    a: EcScalar,
    b: EcScalar,
}

impl BaseOtSender {
    /// Picks `a`, `b` and builds the HELLO_RECEIVER message for
    /// `search_id` obfuscated to `prefix_len` bytes.
    pub fn new(
        curve: CurveType,
        hash_ty: HashType,
        search_id: &[u8],
        prefix_len: usize,
    ) -> PpcResult<(Self, SenderMessage)> {
        let group = EcGroup::new(curve);
        let a = group.random_scalar();
        let b = group.random_scalar();
        let x = group.base_mul(&a)?;
        let y = group.base_mul(&b)?;

        let ab = group.scalar_mul(&a, &b)?;
        let hs = hash64_scalar(&group, search_id)?;
        let ab_minus_hs = group.scalar_sub(&ab, &hs)?;
        let z = group.base_mul(&ab_minus_hs)?;

        let digest = hash(hash_ty, search_id)?;
        let prefix = digest[..prefix_len.min(digest.len())].to_vec();

        let msg = SenderMessage {
            x,
            y,
            z,
            prefix,
        };
        Ok((Self { group, hash_ty, a, b }, msg))
    }

    /// Tries every candidate envelope; returns the decrypted record of the
    /// one whose id matched, or `None` ("not found", §4.8).
    pub fn finish_sender(&self, envelopes: &[ReceiverEnvelope]) -> PpcResult<Option<Vec<u8>>> {
        for env in envelopes {
            let key_point = self.group.point_mul(&env.w, &self.b)?;
            let key_bytes = derive_aes_key(self.hash_ty, &key_point)?;
            let candidate_key = xor16(&env.enc_key, &key_bytes);
            if let Ok(record) =
                cipher::decrypt_cbc(CipherType::Aes128, &candidate_key, &ENVELOPE_IV, &env.enc_record)
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn point_a(&self) -> PpcResult<EcPoint> {
        self.group.base_mul(&self.a)
    }
}

pub struct BaseOtReceiver {
    group: EcGroup,
    hash_ty: HashType,
}

impl BaseOtReceiver {
    pub fn new(curve: CurveType, hash_ty: HashType) -> Self {
        Self {
            group: EcGroup::new(curve),
            hash_ty,
        }
    }

    /// Builds one envelope per `(id, record)` candidate that matched the
    /// sender's prefix.
    pub fn generate_message(
        &self,
        sender_msg: &SenderMessage,
        candidates: &[(Vec<u8>, Vec<u8>)],
    ) -> PpcResult<Vec<ReceiverEnvelope>> {
        candidates
            .iter()
            .map(|(id, record)| self.build_envelope(sender_msg, id, record))
            .collect()
    }

    fn build_envelope(
        &self,
        sender_msg: &SenderMessage,
        id: &[u8],
        record: &[u8],
    ) -> PpcResult<ReceiverEnvelope> {
        let r_j = self.group.random_scalar();
        let s_j = self.group.random_scalar();

        let sj_x = self.group.point_mul(&sender_msg.x, &s_j)?;
        let rj_g = self.group.base_mul(&r_j)?;
        let w = self.group.point_add(&sj_x, &rj_g)?;

        let hid = hash64_scalar(&self.group, id)?;
        let hid_g = self.group.base_mul(&hid)?;
        let z_plus = self.group.point_add(&sender_msg.z, &hid_g)?;
        let sj_zplus = self.group.point_mul(&z_plus, &s_j)?;
        let rj_y = self.group.point_mul(&sender_msg.y, &r_j)?;
        let key_point = self.group.point_add(&sj_zplus, &rj_y)?;

        let key_bytes = derive_aes_key(self.hash_ty, &key_point)?;
        let fresh_key: [u8; 16] = {
            use rand::RngCore;
            let mut k = [0u8; 16];
            rand::rngs::OsRng.fill_bytes(&mut k);
            k
        };
        let enc_key = xor16(&key_bytes, &fresh_key);
        let enc_record = cipher::encrypt_cbc(CipherType::Aes128, &fresh_key, &ENVELOPE_IV, record)?;

        Ok(ReceiverEnvelope {
            w,
            enc_key,
            enc_record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_hit_decrypts_exact_row() {
        let curve = CurveType::P256;
        let hash_ty = HashType::Sha256;
        let search_id = b"testmsg1100".to_vec();

        let (sender, sender_msg) =
            BaseOtSender::new(curve, hash_ty, &search_id, 6).unwrap();
        let receiver = BaseOtReceiver::new(curve, hash_ty);

        let candidates = vec![
            (b"testmsg1099".to_vec(), b"row-1099-payload".to_vec()),
            (search_id.clone(), b"row-1100-payload".to_vec()),
            (b"testmsg1101".to_vec(), b"row-1101-payload".to_vec()),
        ];

        let envelopes = receiver.generate_message(&sender_msg, &candidates).unwrap();
        let found = sender.finish_sender(&envelopes).unwrap();
        assert_eq!(found, Some(b"row-1100-payload".to_vec()));
    }

    #[test]
    fn no_match_yields_not_found() {
        let curve = CurveType::P256;
        let hash_ty = HashType::Sha256;
        let search_id = b"absent-id".to_vec();

        let (sender, sender_msg) =
            BaseOtSender::new(curve, hash_ty, &search_id, 6).unwrap();
        let receiver = BaseOtReceiver::new(curve, hash_ty);

        let candidates = vec![(b"other-id-1".to_vec(), b"payload-1".to_vec())];
        let envelopes = receiver.generate_message(&sender_msg, &candidates).unwrap();
        let found = sender.finish_sender(&envelopes).unwrap();
        assert_eq!(found, None);
    }
}
