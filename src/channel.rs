//! Signed and encrypted callback channel
//!
//! [`CryptoChannel`] wraps an [`EnvelopeCipher`] with the callback signature
//! check and the fixed wire envelope:
//!
//! ```text
//! <xml>
//! <Encrypt><![CDATA[...]]></Encrypt>
//! <MsgSignature><![CDATA[...]]></MsgSignature>
//! <TimeStamp>...</TimeStamp>
//! <Nonce><![CDATA[...]]></Nonce>
//! </xml>
//! ```
//!
//! The channel holds only fixed key material, so one instance can be shared
//! across threads without locking.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::Deserialize;

use crate::crypto::envelope::{EnvelopeCipher, EnvelopeCodec};
use crate::crypto::key::SymmetricKey;
use crate::crypto::nonce::{NonceSource, OsNonce};
use crate::crypto::signature::{callback_signature, constant_time_eq};
use crate::error::{CryptoError, WechatError};
use crate::fields::{self, cdata};
use crate::message::{InboundMessage, Reply};

/// Length of generated signature nonces
const NONCE_STR_LEN: usize = 16;

/// Query of the GET verification handshake
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EchoQuery {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub echostr: String,
}

/// Query of a POST callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    /// `aes` when the body is an encrypted envelope
    #[serde(default)]
    pub encrypt_type: Option<String>,
    #[serde(default)]
    pub msg_signature: Option<String>,
}

impl CallbackQuery {
    pub fn is_encrypted(&self) -> bool {
        self.encrypt_type.as_deref() == Some("aes")
    }
}

/// Secure message channel bound to one appid, token and key
pub struct CryptoChannel<C: EnvelopeCipher = EnvelopeCodec> {
    token: String,
    codec: C,
    nonce: Arc<dyn NonceSource>,
}

impl<C: EnvelopeCipher> std::fmt::Debug for CryptoChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoChannel").finish_non_exhaustive()
    }
}

impl CryptoChannel<EnvelopeCodec> {
    /// Create a channel from the platform-issued 43-character EncodingAESKey.
    pub fn new(
        appid: impl Into<String>,
        token: impl Into<String>,
        encoding_aes_key: &str,
    ) -> Result<Self, CryptoError> {
        Self::with_nonce_source(appid, token, encoding_aes_key, Arc::new(OsNonce))
    }

    /// Like [`CryptoChannel::new`] with an explicit nonce source.
    pub fn with_nonce_source(
        appid: impl Into<String>,
        token: impl Into<String>,
        encoding_aes_key: &str,
        nonce: Arc<dyn NonceSource>,
    ) -> Result<Self, CryptoError> {
        let key = SymmetricKey::from_encoding_aes_key(encoding_aes_key)?;
        let codec = EnvelopeCodec::new(appid, key, Arc::clone(&nonce));
        Ok(Self {
            token: token.into(),
            codec,
            nonce,
        })
    }

    pub fn appid(&self) -> &str {
        self.codec.appid()
    }
}

impl<C: EnvelopeCipher> CryptoChannel<C> {
    /// Build a channel around any envelope cipher.
    pub fn with_codec(token: impl Into<String>, codec: C, nonce: Arc<dyn NonceSource>) -> Self {
        Self {
            token: token.into(),
            codec,
            nonce,
        }
    }

    /// Encrypt `xml` into a signed wire envelope.
    ///
    /// An empty `timestamp` is replaced by the current unix time and an empty
    /// `nonce` by a fresh random string. Any other `timestamp` must be decimal
    /// unix seconds. Returns the envelope and its signature.
    pub fn encrypt_message(
        &self,
        xml: &[u8],
        timestamp: &str,
        nonce: &str,
    ) -> Result<(Vec<u8>, String), CryptoError> {
        let timestamp = if timestamp.is_empty() {
            unix_now().to_string()
        } else {
            parse_timestamp(timestamp)?.to_string()
        };
        let nonce = if nonce.is_empty() {
            self.nonce.random_string(NONCE_STR_LEN)
        } else {
            nonce.to_string()
        };

        let encrypted = self.codec.encrypt(xml)?;
        let signature = callback_signature(&self.token, &timestamp, &nonce);

        let wire = format!(
            "<xml>\n<Encrypt>{}</Encrypt>\n<MsgSignature>{}</MsgSignature>\n<TimeStamp>{}</TimeStamp>\n<Nonce>{}</Nonce>\n</xml>",
            cdata(&encrypted),
            cdata(&signature),
            timestamp,
            cdata(&nonce),
        );

        Ok((wire.into_bytes(), signature))
    }

    /// Verify the signature, then decrypt the `Encrypt` field of `wire_xml`.
    ///
    /// A bad signature fails before the body is parsed or decrypted.
    pub fn decrypt_message(
        &self,
        wire_xml: &[u8],
        signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        if !self.verify_signature(signature, timestamp, nonce) {
            return Err(CryptoError::SignatureMismatch);
        }

        let fields = fields::read_fields(wire_xml)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
        let encrypted = fields
            .get("Encrypt")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing Encrypt".to_string()))?;

        self.codec.decrypt(encrypted)
    }

    /// Constant-time check of a callback signature.
    pub fn verify_signature(&self, signature: &str, timestamp: &str, nonce: &str) -> bool {
        let expected = callback_signature(&self.token, timestamp, nonce);
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }

    /// Answer the GET handshake: `echostr` on a valid signature, otherwise `None`.
    pub fn verify_echo<'a>(&self, query: &'a EchoQuery) -> Option<&'a str> {
        if self.verify_signature(&query.signature, &query.timestamp, &query.nonce) {
            Some(query.echostr.as_str())
        } else {
            debug!("[WechatChannel] echo rejected: signature mismatch");
            None
        }
    }

    /// Authenticate and decode a POST callback body.
    ///
    /// Every failure yields `None` so handlers answer all rejections alike.
    pub fn open_callback(&self, body: &[u8], query: &CallbackQuery) -> Option<InboundMessage> {
        match self.try_open_callback(body, query) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("[WechatChannel] callback rejected: {}", e);
                None
            }
        }
    }

    fn try_open_callback(
        &self,
        body: &[u8],
        query: &CallbackQuery,
    ) -> Result<InboundMessage, WechatError> {
        if query.is_encrypted() {
            let signature = query
                .msg_signature
                .as_deref()
                .unwrap_or(query.signature.as_str());
            let plain = self.decrypt_message(body, signature, &query.timestamp, &query.nonce)?;
            InboundMessage::parse(&plain)
        } else {
            if !self.verify_signature(&query.signature, &query.timestamp, &query.nonce) {
                return Err(CryptoError::SignatureMismatch.into());
            }
            InboundMessage::parse(body)
        }
    }

    /// Render `reply` and seal it into a signed envelope.
    pub fn seal_reply(
        &self,
        reply: &Reply,
        timestamp: &str,
        nonce: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let xml = reply.to_xml(unix_now());
        let (wire, _) = self.encrypt_message(xml.as_bytes(), timestamp, nonce)?;
        Ok(wire)
    }
}

/// The timestamp is rendered outside CDATA, so only plain digits are accepted.
fn parse_timestamp(timestamp: &str) -> Result<u64, CryptoError> {
    if !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CryptoError::InvalidTimestamp(timestamp.to_string()));
    }
    timestamp
        .parse()
        .map_err(|_| CryptoError::InvalidTimestamp(timestamp.to_string()))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
