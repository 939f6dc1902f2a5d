//! Account configuration
//!
//! ```json
//! {
//!   "appid": "wx1234567890abcdef",
//!   "secret": "...",
//!   "token": "...",
//!   "encoding_aes_key": "...43 chars...",
//!   "pay": { "appid": "...", "mch_id": "...", "api_key": "...", "sign_type": "MD5" }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::channel::CryptoChannel;
use crate::client::WechatClient;
use crate::error::WechatError;
use crate::pay::PayConfig;
use crate::types::{AppId, AppSecret};

#[derive(Clone, Deserialize)]
pub struct Config {
    pub appid: String,
    #[serde(default)]
    pub secret: String,
    /// Callback token configured on the platform
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub encoding_aes_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub pay: Option<PayConfig>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("appid", &self.appid)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("pay", &self.pay)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, WechatError> {
        serde_json::from_str(json).map_err(|e| WechatError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WechatError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| WechatError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Callback channel; needs `token` and `encoding_aes_key`.
    pub fn channel(&self) -> Result<CryptoChannel, WechatError> {
        let token = required(&self.token, "token")?;
        let key = required(&self.encoding_aes_key, "encoding_aes_key")?;
        Ok(CryptoChannel::new(self.appid.clone(), token, key)?)
    }

    /// API client; needs `secret`.
    pub fn client(&self) -> Result<WechatClient, WechatError> {
        let appid = AppId::new(self.appid.clone()).map_err(WechatError::Config)?;
        let secret = AppSecret::new(self.secret.clone())
            .map_err(|_| WechatError::Config("secret is required".to_string()))?;

        let mut builder = WechatClient::builder().appid(appid).secret(secret);
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url.clone());
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }

    pub fn pay(&self) -> Result<&PayConfig, WechatError> {
        self.pay
            .as_ref()
            .ok_or_else(|| WechatError::Config("pay is required".to_string()))
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, WechatError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WechatError::Config(format!("{name} is required")))
}
