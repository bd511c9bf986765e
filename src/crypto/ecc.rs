//! Big-integer and EC group primitives (C2).
//!
//! The group abstraction is parameterized by [`CurveType`]. Ed25519 and
//! X25519 do not support `scalarAdd/Sub/Mul` nor `hashToScalar` and signal
//! `unsupported` when called, matching the reference implementation's API
//! surface even though the underlying dalek scalar field could do the
//! arithmetic — callers must not rely on it.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar as DalekScalar;
use curve25519_dalek::traits::Identity;
use elliptic_curve::group::{Group, GroupEncoding};
use elliptic_curve::{Field, PrimeField};
use k256::Secp256k1;
use p256::NistP256;
use rand::rngs::OsRng;
use sm2::Sm2;
use x25519_dalek::{PublicKey as XPublicKey, StaticSecret as XStaticSecret};

use crate::crypto::hash::{hash, HashType};
use crate::error::{PpcError, PpcResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CurveType {
    Ed25519,
    Sm2,
    Secp256k1,
    P256,
    X25519Batched,
}

impl CurveType {
    fn supports_scalar_arith(self) -> bool {
        !matches!(self, CurveType::Ed25519 | CurveType::X25519Batched)
    }
}

#[derive(Clone)]
pub enum EcScalar {
    Ed25519(DalekScalar),
    P256(p256::Scalar),
    Secp256k1(k256::Scalar),
    Sm2(sm2::Scalar),
    /// Clamped X25519 scalar bytes; arithmetic over this field is unsupported.
    X25519([u8; 32]),
}

#[derive(Clone)]
pub enum EcPoint {
    Ed25519(EdwardsPoint),
    P256(p256::ProjectivePoint),
    Secp256k1(k256::ProjectivePoint),
    Sm2(sm2::ProjectivePoint),
    /// Montgomery u-coordinate.
    X25519([u8; 32]),
}

impl EcPoint {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            EcPoint::Ed25519(p) => p.compress().to_bytes().to_vec(),
            EcPoint::P256(p) => p.to_bytes().to_vec(),
            EcPoint::Secp256k1(p) => p.to_bytes().to_vec(),
            EcPoint::Sm2(p) => p.to_bytes().to_vec(),
            EcPoint::X25519(b) => b.to_vec(),
        }
    }
}

/// Tagged, zero-cost dispatch over the configured curve. Constructed once
/// per session from a [`CurveType`]; never boxed, never a trait object.
pub struct EcGroup {
    curve: CurveType,
}

impl EcGroup {
    pub fn new(curve: CurveType) -> Self {
        Self { curve }
    }

    pub fn curve(&self) -> CurveType {
        self.curve
    }

    pub fn random_scalar(&self) -> EcScalar {
        match self.curve {
            CurveType::Ed25519 => EcScalar::Ed25519(DalekScalar::random(&mut OsRng)),
            CurveType::P256 => EcScalar::P256(p256::Scalar::random(&mut OsRng)),
            CurveType::Secp256k1 => EcScalar::Secp256k1(k256::Scalar::random(&mut OsRng)),
            CurveType::Sm2 => EcScalar::Sm2(sm2::Scalar::random(&mut OsRng)),
            CurveType::X25519Batched => {
                let secret = XStaticSecret::random_from_rng(OsRng);
                EcScalar::X25519(secret.to_bytes())
            }
        }
    }

    pub fn invert_scalar(&self, s: &EcScalar) -> PpcResult<EcScalar> {
        let inv = match s {
            EcScalar::Ed25519(x) => EcScalar::Ed25519(x.invert()),
            EcScalar::P256(x) => Option::from(x.invert())
                .map(EcScalar::P256)
                .ok_or(PpcError::ScalarInvertFailure)?,
            EcScalar::Secp256k1(x) => Option::from(x.invert())
                .map(EcScalar::Secp256k1)
                .ok_or(PpcError::ScalarInvertFailure)?,
            EcScalar::Sm2(x) => Option::from(x.invert())
                .map(EcScalar::Sm2)
                .ok_or(PpcError::ScalarInvertFailure)?,
            EcScalar::X25519(_) => {
                return Err(PpcError::UnsupportedCurveType(
                    "x25519 scalar inversion unsupported".into(),
                ))
            }
        };
        Ok(inv)
    }

    pub fn scalar_add(&self, a: &EcScalar, b: &EcScalar) -> PpcResult<EcScalar> {
        self.require_scalar_arith()?;
        Ok(match (a, b) {
            (EcScalar::Ed25519(x), EcScalar::Ed25519(y)) => EcScalar::Ed25519(x + y),
            (EcScalar::P256(x), EcScalar::P256(y)) => EcScalar::P256(x + y),
            (EcScalar::Secp256k1(x), EcScalar::Secp256k1(y)) => EcScalar::Secp256k1(x + y),
            (EcScalar::Sm2(x), EcScalar::Sm2(y)) => EcScalar::Sm2(x + y),
            _ => return Err(PpcError::DataFormatError("scalar curve mismatch".into())),
        })
    }

    pub fn scalar_sub(&self, a: &EcScalar, b: &EcScalar) -> PpcResult<EcScalar> {
        self.require_scalar_arith()?;
        Ok(match (a, b) {
            (EcScalar::Ed25519(x), EcScalar::Ed25519(y)) => EcScalar::Ed25519(x - y),
            (EcScalar::P256(x), EcScalar::P256(y)) => EcScalar::P256(x - y),
            (EcScalar::Secp256k1(x), EcScalar::Secp256k1(y)) => EcScalar::Secp256k1(x - y),
            (EcScalar::Sm2(x), EcScalar::Sm2(y)) => EcScalar::Sm2(x - y),
            _ => return Err(PpcError::DataFormatError("scalar curve mismatch".into())),
        })
    }

    pub fn scalar_mul(&self, a: &EcScalar, b: &EcScalar) -> PpcResult<EcScalar> {
        self.require_scalar_arith()?;
        Ok(match (a, b) {
            (EcScalar::Ed25519(x), EcScalar::Ed25519(y)) => EcScalar::Ed25519(x * y),
            (EcScalar::P256(x), EcScalar::P256(y)) => EcScalar::P256(x * y),
            (EcScalar::Secp256k1(x), EcScalar::Secp256k1(y)) => EcScalar::Secp256k1(x * y),
            (EcScalar::Sm2(x), EcScalar::Sm2(y)) => EcScalar::Sm2(x * y),
            _ => return Err(PpcError::DataFormatError("scalar curve mismatch".into())),
        })
    }

    /// Hashes `input` to a scalar via rejection sampling over the field's
    /// canonical byte representation.
    pub fn hash_to_scalar(&self, input: &[u8]) -> PpcResult<EcScalar> {
        self.require_scalar_arith()?;
        match self.curve {
            CurveType::P256 => weier_hash_to_scalar::<NistP256>(input).map(EcScalar::P256),
            CurveType::Secp256k1 => {
                weier_hash_to_scalar::<Secp256k1>(input).map(EcScalar::Secp256k1)
            }
            CurveType::Sm2 => weier_hash_to_scalar::<Sm2>(input).map(EcScalar::Sm2),
            CurveType::Ed25519 | CurveType::X25519Batched => unreachable!("checked above"),
        }
    }

    /// Try-and-increment hash-to-curve: starting from `x = hash(input) mod
    /// p`, attempt to decompress a valid point; on failure, re-hash and
    /// retry. SM2 always applies one extra initial hash first (§4.2).
    pub fn hash_to_curve(&self, input: &[u8]) -> PpcResult<EcPoint> {
        let seed = if matches!(self.curve, CurveType::Sm2) {
            hash(HashType::Sm3, input)?
        } else {
            input.to_vec()
        };

        const MAX_ATTEMPTS: u32 = 256;
        for attempt in 0..MAX_ATTEMPTS {
            let mut buf = seed.clone();
            buf.extend_from_slice(&attempt.to_le_bytes());
            let digest = hash(self.default_point_hash(), &buf)?;

            if let Some(point) = self.try_decompress(&digest) {
                return Ok(point);
            }
        }
        Err(PpcError::HashToCurveFailure {
            attempts: MAX_ATTEMPTS,
        })
    }

    fn default_point_hash(&self) -> HashType {
        match self.curve {
            CurveType::Sm2 => HashType::Sm3,
            _ => HashType::Sha256,
        }
    }

    fn try_decompress(&self, digest: &[u8]) -> Option<EcPoint> {
        match self.curve {
            CurveType::Ed25519 => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&digest[..32]);
                CompressedEdwardsY(bytes)
                    .decompress()
                    .map(EcPoint::Ed25519)
            }
            CurveType::P256 => try_decompress_weier::<NistP256>(digest).map(EcPoint::P256),
            CurveType::Secp256k1 => {
                try_decompress_weier::<Secp256k1>(digest).map(EcPoint::Secp256k1)
            }
            CurveType::Sm2 => try_decompress_weier::<Sm2>(digest).map(EcPoint::Sm2),
            CurveType::X25519Batched => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&digest[..32]);
                Some(EcPoint::X25519(bytes))
            }
        }
    }

    pub fn point_from_bytes(&self, bytes: &[u8]) -> PpcResult<EcPoint> {
        match self.curve {
            CurveType::Ed25519 => {
                if bytes.len() != 32 {
                    return Err(PpcError::DataFormatError("ed25519 point must be 32 bytes".into()));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(bytes);
                Option::from(CompressedEdwardsY(arr).decompress())
                    .map(EcPoint::Ed25519)
                    .ok_or(PpcError::DataFormatError("invalid ed25519 point encoding".into()))
            }
            CurveType::P256 => weier_point_from_bytes::<NistP256>(bytes).map(EcPoint::P256),
            CurveType::Secp256k1 => weier_point_from_bytes::<Secp256k1>(bytes).map(EcPoint::Secp256k1),
            CurveType::Sm2 => weier_point_from_bytes::<Sm2>(bytes).map(EcPoint::Sm2),
            CurveType::X25519Batched => {
                if bytes.len() != 32 {
                    return Err(PpcError::DataFormatError("x25519 point must be 32 bytes".into()));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(bytes);
                Ok(EcPoint::X25519(arr))
            }
        }
    }

    pub fn point_mul(&self, p: &EcPoint, s: &EcScalar) -> PpcResult<EcPoint> {
        let out = match (p, s) {
            (EcPoint::Ed25519(p), EcScalar::Ed25519(s)) => EcPoint::Ed25519(p * s),
            (EcPoint::P256(p), EcScalar::P256(s)) => EcPoint::P256(*p * s),
            (EcPoint::Secp256k1(p), EcScalar::Secp256k1(s)) => EcPoint::Secp256k1(*p * s),
            (EcPoint::Sm2(p), EcScalar::Sm2(s)) => EcPoint::Sm2(*p * s),
            (EcPoint::X25519(u), EcScalar::X25519(s)) => {
                let secret = XStaticSecret::from(*s);
                let public = XPublicKey::from(*u);
                EcPoint::X25519(secret.diffie_hellman(&public).to_bytes())
            }
            _ => return Err(PpcError::DataFormatError("point/scalar curve mismatch".into())),
        };
        self.reject_identity(out)
    }

    pub fn base_mul(&self, s: &EcScalar) -> PpcResult<EcPoint> {
        let out = match s {
            EcScalar::Ed25519(s) => EcPoint::Ed25519(ED25519_BASEPOINT_POINT * s),
            EcScalar::P256(s) => EcPoint::P256(p256::ProjectivePoint::generator() * s),
            EcScalar::Secp256k1(s) => EcPoint::Secp256k1(k256::ProjectivePoint::generator() * s),
            EcScalar::Sm2(s) => EcPoint::Sm2(sm2::ProjectivePoint::generator() * s),
            EcScalar::X25519(s) => {
                let secret = XStaticSecret::from(*s);
                EcPoint::X25519(XPublicKey::from(&secret).to_bytes())
            }
        };
        self.reject_identity(out)
    }

    pub fn point_add(&self, a: &EcPoint, b: &EcPoint) -> PpcResult<EcPoint> {
        match (a, b) {
            (EcPoint::Ed25519(a), EcPoint::Ed25519(b)) => Ok(EcPoint::Ed25519(a + b)),
            (EcPoint::P256(a), EcPoint::P256(b)) => Ok(EcPoint::P256(a + b)),
            (EcPoint::Secp256k1(a), EcPoint::Secp256k1(b)) => Ok(EcPoint::Secp256k1(a + b)),
            (EcPoint::Sm2(a), EcPoint::Sm2(b)) => Ok(EcPoint::Sm2(a + b)),
            (EcPoint::X25519(_), EcPoint::X25519(_)) => Err(PpcError::UnsupportedCurveType(
                "x25519 point addition unsupported".into(),
            )),
            _ => Err(PpcError::DataFormatError("point curve mismatch".into())),
        }
    }

    pub fn point_sub(&self, a: &EcPoint, b: &EcPoint) -> PpcResult<EcPoint> {
        match (a, b) {
            (EcPoint::Ed25519(a), EcPoint::Ed25519(b)) => Ok(EcPoint::Ed25519(a - b)),
            (EcPoint::P256(a), EcPoint::P256(b)) => Ok(EcPoint::P256(a - b)),
            (EcPoint::Secp256k1(a), EcPoint::Secp256k1(b)) => Ok(EcPoint::Secp256k1(a - b)),
            (EcPoint::Sm2(a), EcPoint::Sm2(b)) => Ok(EcPoint::Sm2(a - b)),
            (EcPoint::X25519(_), EcPoint::X25519(_)) => Err(PpcError::UnsupportedCurveType(
                "x25519 point subtraction unsupported".into(),
            )),
            _ => Err(PpcError::DataFormatError("point curve mismatch".into())),
        }
    }

    pub fn is_valid_point(&self, p: &EcPoint) -> bool {
        match p {
            EcPoint::Ed25519(p) => *p != EdwardsPoint::identity(),
            EcPoint::P256(p) => !bool::from(p.is_identity()),
            EcPoint::Secp256k1(p) => !bool::from(p.is_identity()),
            EcPoint::Sm2(p) => !bool::from(p.is_identity()),
            EcPoint::X25519(b) => *b != [0u8; 32],
        }
    }

    fn reject_identity(&self, p: EcPoint) -> PpcResult<EcPoint> {
        if self.is_valid_point(&p) {
            Ok(p)
        } else {
            Err(PpcError::EcMultiplyFailure)
        }
    }

    fn require_scalar_arith(&self) -> PpcResult<()> {
        if self.curve.supports_scalar_arith() {
            Ok(())
        } else {
            Err(PpcError::UnsupportedCurveType(format!(
                "{:?} does not support scalar arithmetic / hash-to-scalar",
                self.curve
            )))
        }
    }
}

fn weier_hash_to_scalar<C>(input: &[u8]) -> PpcResult<C::Scalar>
where
    C: elliptic_curve::CurveArithmetic,
    C::Scalar: PrimeField,
{
    for counter in 0u32..1000 {
        let mut buf = input.to_vec();
        buf.extend_from_slice(&counter.to_le_bytes());
        let digest = hash(HashType::Sha512, &buf)?;

        let mut repr = <C::Scalar as PrimeField>::Repr::default();
        let n = repr.as_ref().len();
        repr.as_mut().copy_from_slice(&digest[..n]);
        if let Some(s) = Option::from(C::Scalar::from_repr(repr)) {
            return Ok(s);
        }
    }
    Err(PpcError::HashToCurveFailure { attempts: 1000 })
}

fn try_decompress_weier<C>(digest: &[u8]) -> Option<C::ProjectivePoint>
where
    C: elliptic_curve::CurveArithmetic,
    C::AffinePoint: GroupEncoding,
{
    for tag in [0x02u8, 0x03u8] {
        let mut enc = <C::AffinePoint as GroupEncoding>::Repr::default();
        let enc_ref = enc.as_mut();
        if enc_ref.is_empty() {
            continue;
        }
        enc_ref[0] = tag;
        let n = enc_ref.len() - 1;
        enc_ref[1..].copy_from_slice(&digest[..n.min(digest.len())]);
        if let Some(affine) = Option::from(C::AffinePoint::from_bytes(&enc)) {
            return Some(affine.into());
        }
    }
    None
}

fn weier_point_from_bytes<C>(bytes: &[u8]) -> PpcResult<C::ProjectivePoint>
where
    C: elliptic_curve::CurveArithmetic,
    C::AffinePoint: GroupEncoding,
{
    let mut enc = <C::AffinePoint as GroupEncoding>::Repr::default();
    if enc.as_ref().len() != bytes.len() {
        return Err(PpcError::DataFormatError(format!(
            "expected {}-byte compressed point, got {}",
            enc.as_ref().len(),
            bytes.len()
        )));
    }
    enc.as_mut().copy_from_slice(bytes);
    Option::from(C::AffinePoint::from_bytes(&enc))
        .map(Into::into)
        .ok_or_else(|| PpcError::DataFormatError("invalid point encoding".into()))
}

/// Batched X25519 shared-secret computation, 8 scalars/points at a time.
/// Refuses to run without AVX512-IFMA rather than silently falling back to
/// a scalar path (§4.2).
pub fn x25519_batch_dh(scalars: &[[u8; 32]], points: &[[u8; 32]]) -> PpcResult<Vec<[u8; 32]>> {
    if !avx512_ifma_available() {
        return Err(PpcError::UnsupportedCurveType(
            "X25519Batched requires AVX512-IFMA".into(),
        ));
    }
    if scalars.len() != points.len() {
        return Err(PpcError::X25519BatchFailure(
            "scalar/point count mismatch".into(),
        ));
    }
    if scalars.len() % 8 != 0 {
        return Err(PpcError::X25519BatchFailure(
            "batch size must be a multiple of 8; pad and discard".into(),
        ));
    }

    let mut out = Vec::with_capacity(scalars.len());
    for (s, p) in scalars.iter().zip(points.iter()) {
        let secret = XStaticSecret::from(*s);
        let public = XPublicKey::from(*p);
        out.push(secret.diffie_hellman(&public).to_bytes());
    }
    Ok(out)
}

#[cfg(target_arch = "x86_64")]
fn avx512_ifma_available() -> bool {
    is_x86_feature_detected!("avx512ifma")
}

#[cfg(not(target_arch = "x86_64"))]
fn avx512_ifma_available() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p256_group_laws_hold() {
        let g = EcGroup::new(CurveType::P256);
        let p = g.base_mul(&g.random_scalar()).unwrap();
        let q = g.base_mul(&g.random_scalar()).unwrap();
        let sum = g.point_add(&p, &q).unwrap();
        let back = g.point_sub(&sum, &q).unwrap();
        assert_eq!(p.to_bytes(), back.to_bytes());
    }

    #[test]
    fn p256_scalar_invert_round_trips_ec_multiply() {
        let g = EcGroup::new(CurveType::P256);
        let k = g.random_scalar();
        let k_inv = g.invert_scalar(&k).unwrap();
        let p = g.base_mul(&g.random_scalar()).unwrap();
        let kp = g.point_mul(&p, &k).unwrap();
        let back = g.point_mul(&kp, &k_inv).unwrap();
        assert_eq!(p.to_bytes(), back.to_bytes());
    }

    #[test]
    fn ed25519_scalar_arith_is_unsupported() {
        let g = EcGroup::new(CurveType::Ed25519);
        let a = g.random_scalar();
        let b = g.random_scalar();
        assert!(g.scalar_add(&a, &b).is_err());
        assert!(g.hash_to_scalar(b"x").is_err());
    }

    #[test]
    fn x25519_batch_requires_multiple_of_eight() {
        let err = x25519_batch_dh(&[[0u8; 32]; 3], &[[0u8; 32]; 3]).unwrap_err();
        assert!(matches!(err, PpcError::X25519BatchFailure(_)) || matches!(err, PpcError::UnsupportedCurveType(_)));
    }

    #[test]
    fn sm2_hash_to_curve_is_deterministic() {
        let g = EcGroup::new(CurveType::Sm2);
        let p1 = g.hash_to_curve(b"some identity string").unwrap();
        let p2 = g.hash_to_curve(b"some identity string").unwrap();
        assert_eq!(p1.to_bytes(), p2.to_bytes());
    }
}
