//! AES-128-CBC decryption for mini program encrypted user data

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use aes::Aes128;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::Decryptor;
use serde::{Deserialize, Serialize};

use crate::crypto::pkcs7::{self, AES_BLOCK_SIZE};
use crate::error::{CryptoError, WechatError};

type Aes128CbcDecryptor = Decryptor<Aes128>;

/// Decrypted user data with watermark
#[derive(Debug, Clone, Deserialize)]
pub struct DecryptedUserData {
    /// Sensitive user data fields vary by scenario
    /// Common fields include: openId, unionId, nickName, gender, etc.
    #[serde(flatten)]
    pub data: serde_json::Value,
    /// Watermark for verification
    pub watermark: Watermark,
}

/// Watermark from decrypted data
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Watermark {
    /// Timestamp when data was encrypted
    pub timestamp: i64,
    /// AppID that encrypted the data
    pub appid: String,
}

/// Decrypt mini program encrypted user data
///
/// - Key: session_key (base64, 16 bytes)
/// - IV: iv from the client (base64, 16 bytes)
/// - Data: encrypted_data from the client (base64)
pub fn decrypt_user_data(
    session_key: &str,
    encrypted_data: &str,
    iv: &str,
) -> Result<DecryptedUserData, WechatError> {
    let key = BASE64.decode(session_key).map_err(CryptoError::Decode)?;
    let mut buffer = BASE64.decode(encrypted_data).map_err(CryptoError::Decode)?;
    let iv_bytes = BASE64.decode(iv).map_err(CryptoError::Decode)?;

    if key.len() != 16 {
        return Err(WechatError::Config(format!(
            "Invalid session_key length: expected 16, got {}",
            key.len()
        )));
    }
    if iv_bytes.len() != 16 {
        return Err(WechatError::Config(format!(
            "Invalid IV length: expected 16, got {}",
            iv_bytes.len()
        )));
    }

    let len = buffer.len();
    if len % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::BlockAlignment { len }.into());
    }

    let decryptor = Aes128CbcDecryptor::new(key.as_slice().into(), iv_bytes.as_slice().into());
    let decrypted = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| CryptoError::BlockAlignment { len })?;
    let plain = pkcs7::unpad(decrypted, AES_BLOCK_SIZE)?;

    Ok(serde_json::from_slice(plain)?)
}

/// Verify watermark appid matches expected appid
pub fn verify_watermark(data: &DecryptedUserData, expected_appid: &str) -> Result<(), WechatError> {
    if data.watermark.appid != expected_appid {
        return Err(WechatError::Signature(format!(
            "Watermark appid mismatch: expected {}",
            expected_appid
        )));
    }
    Ok(())
}
