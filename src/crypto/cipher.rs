//! Symmetric cipher (C4): AES-128/192/256-CBC and SM4-CBC behind one
//! interface. Only CBC mode is used internally — ORE (C5) and the
//! CM2020/PIR envelope schemes never need another mode.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};

use crate::error::{PpcError, PpcResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CipherType {
    Aes128,
    Aes192,
    Aes256,
    Sm4,
}

impl CipherType {
    pub fn key_len(self) -> usize {
        match self {
            CipherType::Aes128 => 16,
            CipherType::Aes192 => 24,
            CipherType::Aes256 => 32,
            CipherType::Sm4 => 16,
        }
    }

    pub const BLOCK_LEN: usize = 16;
}

fn check_lens(ty: CipherType, key: &[u8], iv: &[u8]) -> PpcResult<()> {
    if key.len() != ty.key_len() {
        return Err(PpcError::DataFormatError(format!(
            "{:?} key must be {} bytes, got {}",
            ty,
            ty.key_len(),
            key.len()
        )));
    }
    if iv.len() != CipherType::BLOCK_LEN {
        return Err(PpcError::DataFormatError(format!(
            "iv must be {} bytes, got {}",
            CipherType::BLOCK_LEN,
            iv.len()
        )));
    }
    Ok(())
}

pub fn encrypt_cbc(ty: CipherType, key: &[u8], iv: &[u8], plaintext: &[u8]) -> PpcResult<Vec<u8>> {
    check_lens(ty, key, iv)?;
    let mut buf = plaintext.to_vec();
    let pt_len = buf.len();
    // PKCS7 needs up to one extra block of headroom.
    buf.resize(pt_len + CipherType::BLOCK_LEN, 0);

    let out_len = match ty {
        CipherType::Aes128 => cbc::Encryptor::<Aes128>::new(key.into(), iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, pt_len)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?
            .len(),
        CipherType::Aes192 => cbc::Encryptor::<Aes192>::new(key.into(), iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, pt_len)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?
            .len(),
        CipherType::Aes256 => cbc::Encryptor::<Aes256>::new(key.into(), iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, pt_len)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?
            .len(),
        CipherType::Sm4 => cbc::Encryptor::<sm4::Sm4>::new(key.into(), iv.into())
            .encrypt_padded_mut::<Pkcs7>(&mut buf, pt_len)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?
            .len(),
    };
    buf.truncate(out_len);
    Ok(buf)
}

pub fn decrypt_cbc(ty: CipherType, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> PpcResult<Vec<u8>> {
    check_lens(ty, key, iv)?;
    let mut buf = ciphertext.to_vec();

    let out = match ty {
        CipherType::Aes128 => cbc::Decryptor::<Aes128>::new(key.into(), iv.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?,
        CipherType::Aes192 => cbc::Decryptor::<Aes192>::new(key.into(), iv.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?,
        CipherType::Aes256 => cbc::Decryptor::<Aes256>::new(key.into(), iv.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?,
        CipherType::Sm4 => cbc::Decryptor::<sm4::Sm4>::new(key.into(), iv.into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|e| PpcError::DataFormatError(e.to_string()))?,
    };
    let len = out.len();
    buf.truncate(len);
    Ok(buf)
}

/// AES-CBC with no padding, for the ORE byte chain and the PRNG's internal
/// use, where the plaintext is always exactly one block.
pub fn encrypt_block_aes128_nopad(key: &[u8; 16], iv: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    use aes::cipher::block_padding::NoPadding;
    let mut buf = *block;
    cbc::Encryptor::<Aes128>::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, 16)
        .expect("single exact block");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes128_round_trip() {
        let key = [1u8; 16];
        let iv = [2u8; 16];
        let pt = b"the quick brown fox jumps over";
        let ct = encrypt_cbc(CipherType::Aes128, &key, &iv, pt).unwrap();
        let back = decrypt_cbc(CipherType::Aes128, &key, &iv, &ct).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn sm4_round_trip() {
        let key = [9u8; 16];
        let iv = [4u8; 16];
        let pt = b"sm4 round trip payload";
        let ct = encrypt_cbc(CipherType::Sm4, &key, &iv, pt).unwrap();
        let back = decrypt_cbc(CipherType::Sm4, &key, &iv, &ct).unwrap();
        assert_eq!(back, pt);
    }

    #[test]
    fn rejects_wrong_key_length() {
        let iv = [0u8; 16];
        assert!(encrypt_cbc(CipherType::Aes256, &[0u8; 16], &iv, b"x").is_err());
    }
}
