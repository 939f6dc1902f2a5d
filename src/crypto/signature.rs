//! Signature computation for callbacks, payments and the JS-SDK
//!
//! Every signature here is built from a canonical string: parameters sorted by
//! key, `sign` and empty values dropped, joined as `k=v` pairs with `&`. The
//! sort makes the result independent of how the caller's map iterates.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

const SIGN_KEY: &str = "sign";
const SIGN_TYPE_KEY: &str = "sign_type";

/// Hash used for payment signatures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignType {
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
}

impl SignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignType::Md5 => "MD5",
            SignType::HmacSha256 => "HMAC-SHA256",
        }
    }

    /// Uppercase hex digest of `params` signed with `api_key`.
    pub fn sign<I, K, V>(&self, api_key: &str, params: I) -> Result<String, CryptoError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let canonical = canonical_string(params, &[]);
        let base = if canonical.is_empty() {
            format!("key={api_key}")
        } else {
            format!("{canonical}&key={api_key}")
        };

        let digest = match self {
            SignType::Md5 => Md5::digest(base.as_bytes()).to_vec(),
            SignType::HmacSha256 => {
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(api_key.as_bytes())
                    .map_err(|_| CryptoError::InvalidMacKey)?;
                mac.update(base.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
        };

        Ok(hex::encode_upper(digest))
    }
}

impl FromStr for SignType {
    type Err = CryptoError;

    /// An empty string selects the MD5 default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "MD5" => Ok(SignType::Md5),
            "HMAC-SHA256" => Ok(SignType::HmacSha256),
            other => Err(CryptoError::UnsupportedSignType(other.to_string())),
        }
    }
}

impl fmt::Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the canonical `k1=v1&k2=v2` string.
///
/// Keys are sorted lexicographically. `sign`, any key in `exclude_keys` and
/// every empty value are left out.
pub fn canonical_string<I, K, V>(params: I, exclude_keys: &[&str]) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let params: Vec<(K, V)> = params.into_iter().collect();
    let mut pairs: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .filter(|(k, v)| *k != SIGN_KEY && !exclude_keys.contains(k) && !v.is_empty())
        .collect();
    pairs.sort_unstable();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// SHA1 signature authenticating platform callbacks.
///
/// The three values are sorted and concatenated without separators.
pub fn callback_signature(token: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, timestamp, nonce];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Payment signature with the hash named by `sign_type`.
///
/// `""` and `"MD5"` select MD5; `"HMAC-SHA256"` selects HMAC-SHA256 keyed with
/// `api_key`. Any other name fails instead of producing a digest.
pub fn pay_signature<I, K, V>(
    api_key: &str,
    sign_type: &str,
    params: I,
) -> Result<String, CryptoError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sign_type: SignType = sign_type.parse()?;
    sign_type.sign(api_key, params)
}

/// Check the `sign` entry of a payment parameter set.
///
/// The hash comes from the `sign_type` entry, MD5 when absent.
pub fn verify_pay_signature<I, K, V>(api_key: &str, params: I) -> Result<(), CryptoError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let params: Vec<(K, V)> = params.into_iter().collect();
    let pairs: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();
    let lookup = |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|&(_, v)| v);

    let supplied = lookup(SIGN_KEY).ok_or(CryptoError::SignatureMismatch)?;
    let sign_type: SignType = lookup(SIGN_TYPE_KEY).unwrap_or_default().parse()?;
    let expected = sign_type.sign(api_key, pairs.iter().copied())?;

    if constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
        Ok(())
    } else {
        Err(CryptoError::SignatureMismatch)
    }
}

/// JS-SDK `wx.config` signature, lowercase hex SHA1.
pub fn jsapi_signature(ticket: &str, noncestr: &str, timestamp: &str, url: &str) -> String {
    let canonical = canonical_string(
        [
            ("jsapi_ticket", ticket),
            ("noncestr", noncestr),
            ("timestamp", timestamp),
            ("url", url),
        ],
        &[],
    );
    hex::encode(Sha1::digest(canonical.as_bytes()))
}

/// Compare two byte strings without an early exit on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
