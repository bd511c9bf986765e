//! Simplest OT (C7), Chou-Orlandi random 1-of-2 OT.
//!
//! Grounded on `ppc-crypto/src/randomot/SimplestOT.{h,cpp}`. Sender picks a
//! scalar `a` and publishes `A = aG`; for choice bit `c_i` the receiver
//! publishes `B_i = b_iG` (c_i = 0) or `A + b_iG` (c_i = 1). The sender
//! then derives both possible keys per index, the receiver derives exactly
//! the one matching its choice bit, and they agree without the sender ever
//! learning `c`.

use crate::crypto::ecc::{CurveType, EcGroup, EcPoint, EcScalar};
use crate::crypto::hash::{hash, HashType};
use crate::error::PpcResult;

fn h(hash_ty: HashType, point_bytes: &[u8], index: u64) -> PpcResult<Vec<u8>> {
    let mut buf = point_bytes.to_vec();
    buf.extend_from_slice(&index.to_le_bytes());
    hash(hash_ty, &buf)
}

pub struct SimplestOtSender {
    group: EcGroup,
    hash_ty: HashType,
}

pub struct SimplestOtReceiver {
    group: EcGroup,
    hash_ty: HashType,
}

impl SimplestOtSender {
    pub fn new(curve: CurveType, hash_ty: HashType) -> Self {
        Self {
            group: EcGroup::new(curve),
            hash_ty,
        }
    }

    /// Step 1: sender picks `a` and publishes `A = aG`.
    pub fn generate_point_a(&self) -> PpcResult<(EcScalar, EcPoint)> {
        let a = self.group.random_scalar();
        let big_a = self.group.base_mul(&a)?;
        Ok((a, big_a))
    }

    /// Step 3: given the receiver's `B_i` values, derive both candidate
    /// keys per index. `keys[i] = (k_i0, k_i1)`.
    pub fn finish_sender(
        &self,
        a: &EcScalar,
        big_a: &EcPoint,
        points_b: &[EcPoint],
    ) -> PpcResult<Vec<(Vec<u8>, Vec<u8>)>> {
        points_b
            .iter()
            .enumerate()
            .map(|(i, b_i)| {
                let ab = self.group.point_mul(b_i, a)?;
                let k0 = h(self.hash_ty, &ab.to_bytes(), i as u64)?;
                let ab_minus_a = self.group.point_sub(&ab, big_a)?;
                let k1 = h(self.hash_ty, &ab_minus_a.to_bytes(), i as u64)?;
                Ok((k0, k1))
            })
            .collect()
    }
}

impl SimplestOtReceiver {
    pub fn new(curve: CurveType, hash_ty: HashType) -> Self {
        Self {
            group: EcGroup::new(curve),
            hash_ty,
        }
    }

    /// Step 2: for each choice bit, pick `b_i` and publish `B_i`.
    pub fn generate_points_b(
        &self,
        big_a: &EcPoint,
        choices: &[bool],
    ) -> PpcResult<(Vec<EcScalar>, Vec<EcPoint>)> {
        let mut b_scalars = Vec::with_capacity(choices.len());
        let mut b_points = Vec::with_capacity(choices.len());
        for &c_i in choices {
            let b_i = self.group.random_scalar();
            let b_ig = self.group.base_mul(&b_i)?;
            let point = if c_i {
                self.group.point_add(big_a, &b_ig)?
            } else {
                b_ig
            };
            b_scalars.push(b_i);
            b_points.push(point);
        }
        Ok((b_scalars, b_points))
    }

    /// Step 4: `k_i = H(b_i * A || i)`, the single key the receiver ends up
    /// with per index.
    pub fn finish_receiver(
        &self,
        big_a: &EcPoint,
        b_scalars: &[EcScalar],
    ) -> PpcResult<Vec<Vec<u8>>> {
        b_scalars
            .iter()
            .enumerate()
            .map(|(i, b_i)| {
                let ba = self.group.point_mul(big_a, b_i)?;
                h(self.hash_ty, &ba.to_bytes(), i as u64)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ot_correctness_holds() {
        let curve = CurveType::P256;
        let hash_ty = HashType::Sha256;
        let sender = SimplestOtSender::new(curve, hash_ty);
        let receiver = SimplestOtReceiver::new(curve, hash_ty);

        let choices: Vec<bool> = (0..64).map(|i| i % 3 == 0).collect();

        let (a, big_a) = sender.generate_point_a().unwrap();
        let (b_scalars, b_points) = receiver.generate_points_b(&big_a, &choices).unwrap();
        let sender_keys = sender.finish_sender(&a, &big_a, &b_points).unwrap();
        let receiver_keys = receiver.finish_receiver(&big_a, &b_scalars).unwrap();

        for (i, &c_i) in choices.iter().enumerate() {
            let expected = if c_i {
                &sender_keys[i].1
            } else {
                &sender_keys[i].0
            };
            assert_eq!(&receiver_keys[i], expected);
        }
    }
}
