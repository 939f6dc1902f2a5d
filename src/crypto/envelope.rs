//! AES-256-CBC message envelope
//!
//! Plaintext layout before padding:
//!
//! ```text
//! random(16B) | be_u32(len(xml)) | xml | appid
//! ```
//!
//! The buffer is PKCS7-padded to the AES block size, encrypted with
//! AES-256-CBC (IV = first 16 key bytes) and base64-encoded.

use std::sync::Arc;

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::crypto::key::SymmetricKey;
use crate::crypto::nonce::NonceSource;
use crate::crypto::pkcs7::{self, AES_BLOCK_SIZE};
use crate::crypto::signature::constant_time_eq;
use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const NONCE_LEN: usize = 16;
const LENGTH_FIELD_LEN: usize = 4;
const HEADER_LEN: usize = NONCE_LEN + LENGTH_FIELD_LEN;

/// Encrypt/decrypt seam used by [`CryptoChannel`](crate::channel::CryptoChannel)
pub trait EnvelopeCipher: Send + Sync {
    /// Encrypt a plaintext XML body into base64 ciphertext.
    fn encrypt(&self, plain_xml: &[u8]) -> Result<String, CryptoError>;

    /// Decrypt base64 ciphertext back into the XML body.
    fn decrypt(&self, cipher_b64: &str) -> Result<Vec<u8>, CryptoError>;
}

impl<T: EnvelopeCipher + ?Sized> EnvelopeCipher for Arc<T> {
    fn encrypt(&self, plain_xml: &[u8]) -> Result<String, CryptoError> {
        (**self).encrypt(plain_xml)
    }

    fn decrypt(&self, cipher_b64: &str) -> Result<Vec<u8>, CryptoError> {
        (**self).decrypt(cipher_b64)
    }
}

/// Envelope codec bound to one appid and key
#[derive(Clone)]
pub struct EnvelopeCodec {
    appid: String,
    key: SymmetricKey,
    nonce: Arc<dyn NonceSource>,
}

impl std::fmt::Debug for EnvelopeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCodec")
            .field("appid", &self.appid)
            .finish_non_exhaustive()
    }
}

impl EnvelopeCodec {
    pub fn new(
        appid: impl Into<String>,
        key: SymmetricKey,
        nonce: Arc<dyn NonceSource>,
    ) -> Self {
        Self {
            appid: appid.into(),
            key,
            nonce,
        }
    }

    pub fn appid(&self) -> &str {
        &self.appid
    }
}

impl EnvelopeCipher for EnvelopeCodec {
    fn encrypt(&self, plain_xml: &[u8]) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.nonce.fill_bytes(&mut nonce);
        encrypt(plain_xml, &self.appid, &self.key, &nonce)
    }

    fn decrypt(&self, cipher_b64: &str) -> Result<Vec<u8>, CryptoError> {
        decrypt(cipher_b64, &self.key, &self.appid)
    }
}

/// Encrypt `plain_xml` for `appid` using the caller-supplied random prefix.
pub fn encrypt(
    plain_xml: &[u8],
    appid: &str,
    key: &SymmetricKey,
    nonce: &[u8; NONCE_LEN],
) -> Result<String, CryptoError> {
    let xml_len = u32::try_from(plain_xml.len()).map_err(|_| CryptoError::TruncatedPayload)?;

    let mut raw = Vec::with_capacity(HEADER_LEN + plain_xml.len() + appid.len());
    raw.extend_from_slice(nonce);
    raw.extend_from_slice(&xml_len.to_be_bytes());
    raw.extend_from_slice(plain_xml);
    raw.extend_from_slice(appid.as_bytes());

    seal(&raw, key)
}

/// Decrypt an envelope and check that it was produced for `expected_appid`.
pub fn decrypt(
    cipher_b64: &str,
    key: &SymmetricKey,
    expected_appid: &str,
) -> Result<Vec<u8>, CryptoError> {
    let plain = open(cipher_b64, key)?;

    if plain.len() < HEADER_LEN {
        return Err(CryptoError::TruncatedPayload);
    }
    let (_, rest) = plain.split_at(NONCE_LEN);
    let (length_field, rest) = rest.split_at(LENGTH_FIELD_LEN);

    let mut len_bytes = [0u8; LENGTH_FIELD_LEN];
    len_bytes.copy_from_slice(length_field);
    let xml_len = u32::from_be_bytes(len_bytes) as usize;
    if xml_len > rest.len() {
        return Err(CryptoError::TruncatedPayload);
    }

    let (xml, appid) = rest.split_at(xml_len);
    if !constant_time_eq(appid, expected_appid.as_bytes()) {
        return Err(CryptoError::AppIdMismatch);
    }

    Ok(xml.to_vec())
}

/// Pad, encrypt and base64-encode a raw plaintext buffer.
fn seal(raw: &[u8], key: &SymmetricKey) -> Result<String, CryptoError> {
    let mut buffer = pkcs7::pad(raw, AES_BLOCK_SIZE);
    let len = buffer.len();

    let encryptor = Aes256CbcEnc::new(&(*key.as_bytes()).into(), &key.iv().into());
    let ciphertext = encryptor
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| CryptoError::BlockAlignment { len })?;

    Ok(BASE64.encode(ciphertext))
}

/// Base64-decode, decrypt and unpad, returning the raw plaintext buffer.
fn open(cipher_b64: &str, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    let mut buffer = BASE64.decode(cipher_b64.trim())?;
    let len = buffer.len();
    if len % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::BlockAlignment { len });
    }

    let decryptor = Aes256CbcDec::new(&(*key.as_bytes()).into(), &key.iv().into());
    let decrypted = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| CryptoError::BlockAlignment { len })?;

    Ok(pkcs7::unpad(decrypted, AES_BLOCK_SIZE)?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::nonce::OsNonce;

    const APPID: &str = "wx123458de9ae3rdew";
    const NONCE: [u8; 16] = *b"0123456789abcdef";

    fn test_key() -> SymmetricKey {
        SymmetricKey::from_encoding_aes_key("abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG")
            .unwrap()
    }

    #[test]
    fn test_plaintext_layout() {
        let key = test_key();
        let sealed = encrypt(b"<xml/>", APPID, &key, &NONCE).unwrap();
        let raw = open(&sealed, &key).unwrap();

        assert_eq!(&raw[..16], &NONCE);
        assert_eq!(&raw[16..20], &6u32.to_be_bytes());
        assert_eq!(&raw[20..26], b"<xml/>");
        assert_eq!(&raw[26..], APPID.as_bytes());
    }

    #[test]
    fn test_round_trip() {
        let key = test_key();
        let xml = "<xml><Content><![CDATA[示例内容]]></Content></xml>".as_bytes();
        let sealed = encrypt(xml, APPID, &key, &NONCE).unwrap();
        assert_eq!(decrypt(&sealed, &key, APPID).unwrap(), xml);
    }

    #[test]
    fn test_round_trip_empty_body() {
        let key = test_key();
        let sealed = encrypt(b"", APPID, &key, &NONCE).unwrap();
        assert!(decrypt(&sealed, &key, APPID).unwrap().is_empty());
    }

    #[test]
    fn test_ciphertext_is_block_aligned() {
        let key = test_key();
        for len in 0..40 {
            let xml = vec![b'x'; len];
            let sealed = encrypt(&xml, APPID, &key, &NONCE).unwrap();
            let decoded = BASE64.decode(sealed).unwrap();
            assert_eq!(decoded.len() % AES_BLOCK_SIZE, 0);
        }
    }

    #[test]
    fn test_codec_uses_fresh_nonce() {
        let codec = EnvelopeCodec::new(APPID, test_key(), Arc::new(OsNonce));
        let a = codec.encrypt(b"<xml/>").unwrap();
        let b = codec.encrypt(b"<xml/>").unwrap();
        assert_ne!(a, b);
        assert_eq!(codec.decrypt(&a).unwrap(), b"<xml/>");
        assert_eq!(codec.decrypt(&b).unwrap(), b"<xml/>");
    }

    #[test]
    fn test_appid_mismatch() {
        let key = test_key();
        let sealed = encrypt(b"<xml/>", "wxotherappid000000", &key, &NONCE).unwrap();
        assert!(matches!(
            decrypt(&sealed, &key, APPID),
            Err(CryptoError::AppIdMismatch)
        ));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            decrypt("not base64!!", &test_key(), APPID),
            Err(CryptoError::Decode(_))
        ));
    }

    #[test]
    fn test_block_alignment() {
        let encoded = BASE64.encode([0u8; 20]);
        assert!(matches!(
            decrypt(&encoded, &test_key(), APPID),
            Err(CryptoError::BlockAlignment { len: 20 })
        ));
    }

    #[test]
    fn test_empty_ciphertext() {
        assert!(matches!(
            decrypt("", &test_key(), APPID),
            Err(CryptoError::Padding)
        ));
    }

    #[test]
    fn test_oversized_length_field() {
        let key = test_key();
        let mut raw = NONCE.to_vec();
        raw.extend_from_slice(&u32::MAX.to_be_bytes());
        raw.extend_from_slice(b"<xml/>");
        raw.extend_from_slice(APPID.as_bytes());

        let sealed = seal(&raw, &key).unwrap();
        assert!(matches!(
            decrypt(&sealed, &key, APPID),
            Err(CryptoError::TruncatedPayload)
        ));
    }

    #[test]
    fn test_short_plaintext() {
        let key = test_key();
        let sealed = seal(b"too short", &key).unwrap();
        assert!(matches!(
            decrypt(&sealed, &key, APPID),
            Err(CryptoError::TruncatedPayload)
        ));
    }

    #[test]
    fn test_length_field_tamper_never_returns_original() {
        let key = test_key();
        let xml = b"<xml><MsgType>text</MsgType></xml>";
        for delta in [1i64, -1, 18, -6, 1 << 16] {
            let claimed = (xml.len() as i64 + delta) as u32;
            let mut raw = NONCE.to_vec();
            raw.extend_from_slice(&claimed.to_be_bytes());
            raw.extend_from_slice(xml);
            raw.extend_from_slice(APPID.as_bytes());

            let sealed = seal(&raw, &key).unwrap();
            if let Ok(plain) = decrypt(&sealed, &key, APPID) {
                assert_ne!(plain, xml);
            }
        }
    }
}
