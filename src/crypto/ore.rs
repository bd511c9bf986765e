//! FastOre: a deterministic, order-revealing, 2-bytes-per-plaintext-byte
//! construction (C5).
//!
//! Grounded on `wedpr-crypto/ppc-crypto-core/src/ore/FastOre.{h,cpp}`. Byte
//! `i` of the ciphertext is derived from a truncated-AES-CBC encryption of
//! the ciphertext produced so far, which makes the scheme a growing chain
//! rather than a fixed-key stream cipher: each mask depends on every byte
//! emitted before it.

use crate::error::{PpcError, PpcResult};

const KEY_LEN: usize = 16;
/// |plaintext| must be < 2^62 (§7 `OreOutOfRange`).
const MAX_ABS_INTEGER: i128 = 1i128 << 62;
const FLOAT_FRAC_DIGITS: usize = 8;

fn ore_key(key: &[u8]) -> PpcResult<[u8; KEY_LEN]> {
    key.try_into()
        .map_err(|_| PpcError::DataFormatError(format!("ore key must be {KEY_LEN} bytes")))
}

/// AES-128-CBC(key, iv=0) over a zero-padded multi-block buffer, no
/// PKCS7 padding — the chain operates on raw ciphertext bytes, not a
/// recoverable plaintext stream.
fn cbc_chain(key: &[u8; KEY_LEN], prefix: &[u8]) -> Vec<u8> {
    use aes::cipher::block_padding::NoPadding;
    use aes::cipher::{BlockEncryptMut, KeyIvInit};

    let mut buf = if prefix.is_empty() {
        vec![0u8; 16]
    } else {
        let pad = (16 - prefix.len() % 16) % 16;
        let mut b = prefix.to_vec();
        b.extend(std::iter::repeat(0u8).take(pad));
        b
    };
    let len = buf.len();
    let iv = [0u8; 16];
    cbc::Encryptor::<aes::Aes128>::new(key.into(), &iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .expect("exact block multiple");
    buf
}

/// Derives the 2-byte mask `(t0, t1)` for position `i`, given the
/// ciphertext bytes emitted for positions `0..i`. 0xFF is remapped to
/// 0xFE so the carry-propagation step (below) never wraps a mask byte
/// past the top of the byte range.
fn derive_mask(key: &[u8; KEY_LEN], ciphertext_prefix: &[u8]) -> (u8, u8) {
    let block = cbc_chain(key, ciphertext_prefix);
    let last = &block[block.len() - 16..];
    let avoid = |b: u8| if b == 0xFF { 0xFE } else { b };
    (avoid(last[14]), avoid(last[15]))
}

/// Encrypts an arbitrary byte string under the FastOre chain construction.
/// Output is exactly `2 * plaintext.len()` bytes.
pub fn encrypt_bytes(key: &[u8], plaintext: &[u8]) -> PpcResult<Vec<u8>> {
    let key = ore_key(key)?;
    let mut ciphertext = Vec::with_capacity(plaintext.len() * 2);

    for &pt_byte in plaintext {
        let (t0, t1) = derive_mask(&key, &ciphertext);
        let s = t1 as u16 + pt_byte as u16;
        let carry = (s / 256) as u8;
        let out0 = t0.wrapping_add(carry);
        let out1 = (s % 256) as u8;
        ciphertext.push(out0);
        ciphertext.push(out1);
    }
    Ok(ciphertext)
}

pub fn decrypt_bytes(key: &[u8], ciphertext: &[u8]) -> PpcResult<Vec<u8>> {
    if ciphertext.len() % 2 != 0 {
        return Err(PpcError::OreCipherTooShort {
            expected: ciphertext.len() + 1,
            got: ciphertext.len(),
        });
    }
    let key = ore_key(key)?;
    let n = ciphertext.len() / 2;
    let mut plaintext = Vec::with_capacity(n);

    for i in 0..n {
        let prefix = &ciphertext[..2 * i];
        let (t0, t1) = derive_mask(&key, prefix);
        let out0 = ciphertext[2 * i];
        let out1 = ciphertext[2 * i + 1];

        let carry = (out0 as i32 - t0 as i32).rem_euclid(256);
        let carry = if carry > 1 {
            // wrap ambiguity resolved by taking the smaller residue — carry
            // is always 0 or 1 by construction.
            carry - 256
        } else {
            carry
        };
        let pt = (out1 as i32 + 256 * carry - t1 as i32).rem_euclid(256) as u8;
        plaintext.push(pt);
    }
    Ok(plaintext)
}

/// Lexicographic byte comparison; the sign matches the sign of the
/// underlying plaintext difference by construction (§8).
pub fn compare(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    a.cmp(b)
}

/// Integer ORE: bias-shift into the non-negative domain, big-endian
/// serialize, then FastOre over the 8 bytes.
pub fn encrypt_i64(key: &[u8], value: i64) -> PpcResult<Vec<u8>> {
    if (value as i128).unsigned_abs() as i128 >= MAX_ABS_INTEGER {
        return Err(PpcError::OreOutOfRange);
    }
    let biased = (value as i128 + (i64::MAX as i128 / 2)) as u64;
    encrypt_bytes(key, &biased.to_be_bytes())
}

pub fn decrypt_i64(key: &[u8], ciphertext: &[u8]) -> PpcResult<i64> {
    if ciphertext.len() != 16 {
        return Err(PpcError::OreCipherTooShort {
            expected: 16,
            got: ciphertext.len(),
        });
    }
    let plain = decrypt_bytes(key, ciphertext)?;
    let biased = u64::from_be_bytes(plain.try_into().unwrap());
    Ok((biased as i128 - (i64::MAX as i128 / 2)) as i64)
}

/// Float ORE: {floor, fractional-digit string} encrypted separately and
/// concatenated. Using `floor` rather than `trunc` keeps the fractional
/// remainder always non-negative, `value - value.floor()` is at least zero
/// and strictly less than one, so `-0.5` and `0.5` encrypt to distinct
/// ciphertexts (floor -1 vs 0) instead of colliding on a shared zero
/// integer part. The fractional part is zero-padded to a fixed digit width
/// so the concatenation's lexicographic order matches numeric order
/// regardless of how many digits the caller actually supplied.
pub fn encrypt_decimal(key: &[u8], value: f64) -> PpcResult<Vec<u8>> {
    if !value.is_finite() {
        return Err(PpcError::OreOutOfRange);
    }
    let int_part = value.floor() as i64;
    let int_ct = encrypt_i64(key, int_part)?;

    let frac = value - value.floor();
    let formatted = format!("{:.*}", FLOAT_FRAC_DIGITS, frac);
    let digits = formatted.split('.').nth(1).unwrap_or("0");
    let frac_ct = encrypt_bytes(key, digits.as_bytes())?;

    let mut out = int_ct;
    out.extend(frac_ct);
    Ok(out)
}

pub fn decrypt_decimal(key: &[u8], ciphertext: &[u8]) -> PpcResult<f64> {
    if ciphertext.len() != 16 + FLOAT_FRAC_DIGITS * 2 {
        return Err(PpcError::OreCipherTooShort {
            expected: 16 + FLOAT_FRAC_DIGITS * 2,
            got: ciphertext.len(),
        });
    }
    let int_part = decrypt_i64(key, &ciphertext[..16])?;
    let digit_bytes = decrypt_bytes(key, &ciphertext[16..])?;
    let digits: String = digit_bytes.iter().map(|&b| b as char).collect();
    let frac: f64 = format!("0.{digits}")
        .parse()
        .map_err(|_| PpcError::DataFormatError("ore decimal digits corrupt".into()))?;
    Ok(int_part as f64 + frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"abcdabcdabcdabcd";

    #[test]
    fn integer_round_trip() {
        for v in [
            -(1i64 << 62) + 1,
            0,
            123456,
            -234567,
            (1i64 << 62) - 1,
        ] {
            let ct = encrypt_i64(&KEY, v).unwrap();
            assert_eq!(decrypt_i64(&KEY, &ct).unwrap(), v);
        }
    }

    #[test]
    fn integer_out_of_range_is_rejected() {
        assert!(encrypt_i64(&KEY, i64::MAX).is_err());
        assert!(encrypt_i64(&KEY, i64::MIN).is_err());
    }

    #[test]
    fn order_is_preserved_for_integers() {
        let a = encrypt_i64(&KEY, -500).unwrap();
        let b = encrypt_i64(&KEY, 500).unwrap();
        let c = encrypt_i64(&KEY, 500_000).unwrap();
        assert_eq!(compare(&a, &b), std::cmp::Ordering::Less);
        assert_eq!(compare(&b, &c), std::cmp::Ordering::Less);
    }

    #[test]
    fn decimal_round_trip_on_non_negative_values() {
        for v in [0.0, 1.5, 123456.00001234, 999999.99999999] {
            let ct = encrypt_decimal(&KEY, v).unwrap();
            let back = decrypt_decimal(&KEY, &ct).unwrap();
            assert!((back - v).abs() < 1e-6);
        }
    }

    #[test]
    fn sorted_decimals_yield_monotonic_ciphertext_order() {
        let values = [
            -1000.25, -1.5, -0.75, -0.5, -0.25, 0.0, 0.25, 0.5, 42.75, 1000.125,
        ];
        let mut ciphertexts: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encrypt_decimal(&KEY, *v).unwrap())
            .collect();
        let originally_sorted = ciphertexts.clone();
        ciphertexts.sort();
        assert_eq!(ciphertexts, originally_sorted);
    }

    #[test]
    fn decimals_straddling_zero_do_not_collide() {
        let neg = encrypt_decimal(&KEY, -0.5).unwrap();
        let pos = encrypt_decimal(&KEY, 0.5).unwrap();
        assert_ne!(neg, pos);
        assert_eq!(decrypt_decimal(&KEY, &neg).unwrap(), -0.5);
        assert_eq!(decrypt_decimal(&KEY, &pos).unwrap(), 0.5);
    }

    #[test]
    fn decimal_round_trip_on_negative_values() {
        for v in [-0.5, -1.5, -1000.25, -0.00001234] {
            let ct = encrypt_decimal(&KEY, v).unwrap();
            let back = decrypt_decimal(&KEY, &ct).unwrap();
            assert!((back - v).abs() < 1e-6);
        }
    }
}
