//! OPRF (C6): EC-DH OPRF (JKK14) and the RA2018 multiplicative variant.
//!
//! Grounded on `ppc-crypto/src/oprf/EcdhOprf.h` (client/server split with
//! blind/evaluate/finalize/fullEvaluate) and `RA2018Oprf.cpp` (persistent
//! server scalar alpha, per-call client scalar beta). All operations are
//! batchable: the `_batch` entry points run over an input vector, mirroring
//! the original's `tbb::parallel_for` fan-out (offloaded to the shared
//! worker pool by the dispatcher, not by this module — see §5).

use crate::crypto::ecc::{CurveType, EcGroup, EcPoint, EcScalar};
use crate::crypto::hash::{hash, HashType};
use crate::error::PpcResult;

fn h2(hash_ty: HashType, x: &[u8], point_bytes: &[u8], output_size: usize) -> PpcResult<Vec<u8>> {
    let mut buf = x.to_vec();
    buf.extend_from_slice(point_bytes);
    let digest = hash(hash_ty, &buf)?;
    Ok(digest[..output_size.min(digest.len())].to_vec())
}

/// EC-DH OPRF client half: holds no long-term key, only the blinding
/// scalar for the lifetime of one call.
pub struct EcdhOprfClient {
    group: EcGroup,
    hash_ty: HashType,
    output_size: usize,
}

impl EcdhOprfClient {
    pub fn new(curve: CurveType, hash_ty: HashType, output_size: usize) -> Self {
        Self {
            group: EcGroup::new(curve),
            hash_ty,
            output_size,
        }
    }

    /// `blind(x, r) -> B = H1(x)^r`. Returns `(B, r)`; the caller keeps `r`
    /// for `finalize`.
    pub fn blind(&self, x: &[u8]) -> PpcResult<(EcPoint, EcScalar)> {
        let r = self.group.random_scalar();
        let h1 = self.group.hash_to_curve(x)?;
        let b = self.group.point_mul(&h1, &r)?;
        Ok((b, r))
    }

    pub fn blind_batch(&self, xs: &[Vec<u8>]) -> PpcResult<Vec<(EcPoint, EcScalar)>> {
        xs.iter().map(|x| self.blind(x)).collect()
    }

    /// `finalize(x, E, r) -> H2(x || E^{1/r})`.
    pub fn finalize(&self, x: &[u8], e: &EcPoint, r: &EcScalar) -> PpcResult<Vec<u8>> {
        let r_inv = self.group.invert_scalar(r)?;
        let unblinded = self.group.point_mul(e, &r_inv)?;
        h2(self.hash_ty, x, &unblinded.to_bytes(), self.output_size)
    }
}

/// EC-DH OPRF server half: holds the session key `k`.
pub struct EcdhOprfServer {
    group: EcGroup,
    hash_ty: HashType,
    output_size: usize,
    key: EcScalar,
}

impl EcdhOprfServer {
    pub fn new(curve: CurveType, hash_ty: HashType, output_size: usize, key: EcScalar) -> Self {
        Self {
            group: EcGroup::new(curve),
            hash_ty,
            output_size,
            key,
        }
    }

    /// `evaluate(B, k) -> E = B^k`.
    pub fn evaluate(&self, b: &EcPoint) -> PpcResult<EcPoint> {
        self.group.point_mul(b, &self.key)
    }

    pub fn evaluate_batch(&self, bs: &[EcPoint]) -> PpcResult<Vec<EcPoint>> {
        bs.iter().map(|b| self.evaluate(b)).collect()
    }

    /// `fullEvaluate(x, k) -> H2(x || H1(x)^k)`, used when one party holds
    /// both the input and the key (e.g. the server precomputing its own
    /// OPRF outputs in CM2020).
    pub fn full_evaluate(&self, x: &[u8]) -> PpcResult<Vec<u8>> {
        let h1 = self.group.hash_to_curve(x)?;
        let e = self.group.point_mul(&h1, &self.key)?;
        h2(self.hash_ty, x, &e.to_bytes(), self.output_size)
    }

    pub fn full_evaluate_batch(&self, xs: &[Vec<u8>]) -> PpcResult<Vec<Vec<u8>>> {
        xs.iter().map(|x| self.full_evaluate(x)).collect()
    }
}

/// RA2018 OPRF server: holds a persistent scalar alpha for the session,
/// used to build privacy-preserving cuckoo-filter entries.
pub struct Ra2018OprfServer {
    group: EcGroup,
    alpha: EcScalar,
}

impl Ra2018OprfServer {
    pub fn new(curve: CurveType, alpha: EcScalar) -> Self {
        Self {
            group: EcGroup::new(curve),
            alpha,
        }
    }

    pub fn generate_alpha(curve: CurveType) -> EcScalar {
        EcGroup::new(curve).random_scalar()
    }

    /// `evaluate(blinded) -> blinded^alpha`.
    pub fn evaluate(&self, blinded: &EcPoint) -> PpcResult<EcPoint> {
        self.group.point_mul(blinded, &self.alpha)
    }

    pub fn evaluate_batch(&self, blinded: &[EcPoint]) -> PpcResult<Vec<EcPoint>> {
        blinded.iter().map(|b| self.evaluate(b)).collect()
    }
}

/// Opaque handle to one cuckoo-filter-backed RA2018 storage artifact.
/// The filter's own build/lookup/persistence logic is out of scope (the
/// storage backend is a non-goal); this only carries the identifying
/// metadata the OPRF batching path needs to tag which filter a blinded
/// evaluation belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ra2018FilterInfo {
    pub filter_id: String,
    pub num_entries: u64,
    pub num_hash_functions: u32,
}

impl Ra2018FilterInfo {
    pub fn new(filter_id: impl Into<String>, num_entries: u64, num_hash_functions: u32) -> Self {
        Self {
            filter_id: filter_id.into(),
            num_entries,
            num_hash_functions,
        }
    }
}

/// RA2018 OPRF client: generates a fresh blinding scalar beta per call.
pub struct Ra2018OprfClient {
    group: EcGroup,
}

impl Ra2018OprfClient {
    pub fn new(curve: CurveType) -> Self {
        Self {
            group: EcGroup::new(curve),
        }
    }

    /// `blind(y, beta) -> H1(y)^beta`. Returns `(blinded, beta)`.
    pub fn blind(&self, y: &[u8]) -> PpcResult<(EcPoint, EcScalar)> {
        let beta = self.group.random_scalar();
        let h1 = self.group.hash_to_curve(y)?;
        let blinded = self.group.point_mul(&h1, &beta)?;
        Ok((blinded, beta))
    }

    pub fn blind_batch(&self, ys: &[Vec<u8>]) -> PpcResult<Vec<(EcPoint, EcScalar)>> {
        ys.iter().map(|y| self.blind(y)).collect()
    }

    /// `finalize(evaluated, beta) -> evaluated^{1/beta}`.
    pub fn finalize(&self, evaluated: &EcPoint, beta: &EcScalar) -> PpcResult<EcPoint> {
        let beta_inv = self.group.invert_scalar(beta)?;
        self.group.point_mul(evaluated, &beta_inv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_oprf_symmetry_holds() {
        let curve = CurveType::P256;
        let hash_ty = HashType::Sha256;
        let key = EcGroup::new(curve).random_scalar();

        let client = EcdhOprfClient::new(curve, hash_ty, 32);
        let server = EcdhOprfServer::new(curve, hash_ty, 32, key.clone());

        let x = b"oprf input".to_vec();
        let (blinded, r) = client.blind(&x).unwrap();
        let evaluated = server.evaluate(&blinded).unwrap();
        let finalized = client.finalize(&x, &evaluated, &r).unwrap();

        let full = server.full_evaluate(&x).unwrap();
        assert_eq!(finalized, full);
    }

    #[test]
    fn ra2018_round_trip_matches_direct_evaluation() {
        let curve = CurveType::P256;
        let alpha = Ra2018OprfServer::generate_alpha(curve);
        let server = Ra2018OprfServer::new(curve, alpha.clone());
        let client = Ra2018OprfClient::new(curve);

        let y = b"filter entry".to_vec();
        let (blinded, beta) = client.blind(&y).unwrap();
        let evaluated = server.evaluate(&blinded).unwrap();
        let unblinded = client.finalize(&evaluated, &beta).unwrap();

        let group = EcGroup::new(curve);
        let h1 = group.hash_to_curve(&y).unwrap();
        let direct = group.point_mul(&h1, &alpha).unwrap();
        assert_eq!(unblinded.to_bytes(), direct.to_bytes());
    }
}
