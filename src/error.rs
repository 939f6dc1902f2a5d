use thiserror::Error;

/// Failures of the message encryption and signing primitives.
///
/// None of the variants carry plaintext or key material, so they are safe to
/// log. Callback handlers should still answer every variant the same way.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("EncodingAESKey must be 43 characters, got {actual}")]
    InvalidKeyLength { actual: usize },

    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("ciphertext length {len} is not a multiple of the block size")]
    BlockAlignment { len: usize },

    #[error("decrypted payload is truncated")]
    TruncatedPayload,

    #[error("decrypted payload belongs to a different appid")]
    AppIdMismatch,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("unsupported sign type: {0}")]
    UnsupportedSignType(String),

    #[error("invalid MAC key")]
    InvalidMacKey,

    #[error("invalid PKCS7 padding")]
    Padding,

    #[error("invalid parameter name: {0:?}")]
    InvalidParamName(String),

    #[error("timestamp is not unix seconds: {0:?}")]
    InvalidTimestamp(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// WeChat SDK error types
#[derive(Debug, Error)]
pub enum WechatError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WeChat API error (code={code}): {message}")]
    Api { code: i32, message: String },

    #[error("Access token error: {0}")]
    Token(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Invalid value for field {name}: {value}")]
    InvalidField { name: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_error_converts_into_wechat_error() {
        let err: WechatError = CryptoError::SignatureMismatch.into();
        assert!(matches!(
            err,
            WechatError::Crypto(CryptoError::SignatureMismatch)
        ));
        assert_eq!(err.to_string(), "Crypto error: signature mismatch");
    }

    #[test]
    fn test_key_length_message() {
        let err = CryptoError::InvalidKeyLength { actual: 42 };
        assert_eq!(
            err.to_string(),
            "EncodingAESKey must be 43 characters, got 42"
        );
    }
}
