//! Cryptography primitives for WeChat callbacks and payments
//!
//! - [`pkcs7`] - block padding shared by every AES path
//! - [`signature`] - canonical strings, callback SHA1, payment MD5/HMAC-SHA256
//! - [`envelope`] - AES-256-CBC envelope for encrypted callback messages
//! - [`nonce`] - injectable random source for nonces
//! - [`user_data`] - mini program user data decryption
//!
//! ## Security
//!
//! Keys are immutable after construction and never appear in `Debug` output
//! or error values. Signatures are compared in constant time.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wechat_secure_channel::crypto;
//!
//! let sign = crypto::callback_signature("token", "1409304348", "nonce");
//! let pay = crypto::pay_signature(api_key, "MD5", &params)?;
//! ```

pub mod envelope;
pub mod key;
pub mod nonce;
pub mod pkcs7;
pub mod signature;
pub mod user_data;

pub use envelope::{EnvelopeCipher, EnvelopeCodec};
pub use key::SymmetricKey;
pub use nonce::{NonceSource, OsNonce};
pub use signature::{
    callback_signature, canonical_string, jsapi_signature, pay_signature, verify_pay_signature,
    SignType,
};
pub use user_data::{decrypt_user_data, verify_watermark, DecryptedUserData, Watermark};
