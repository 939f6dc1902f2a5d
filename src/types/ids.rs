use std::fmt;

use serde::{Deserialize, Serialize};

/// WeChat AppID (18 characters, `wx` prefix)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if !id.starts_with("wx") {
            return Err(format!("AppId must start with 'wx', got {}", id));
        }
        if id.len() != 18 {
            return Err(format!("AppId must be 18 characters, got {}", id.len()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AppId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.0
    }
}

/// WeChat AppSecret
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AppSecret(String);

impl AppSecret {
    pub fn new(secret: impl Into<String>) -> Result<Self, String> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err("AppSecret must not be empty".to_string());
        }
        Ok(Self(secret))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppSecret([REDACTED])")
    }
}

/// Access token issued by `/cgi-bin/token`
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Result<Self, String> {
        let token = token.into();
        if token.is_empty() {
            return Err("AccessToken must not be empty".to_string());
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_id_valid() {
        let app_id = AppId::new("wx1234567890abcdef").unwrap();
        assert_eq!(app_id.as_str(), "wx1234567890abcdef");
    }

    #[test]
    fn test_app_id_invalid_length() {
        assert!(AppId::new("wxshort").is_err());
    }

    #[test]
    fn test_app_id_invalid_prefix() {
        let result = AppId::new("ab1234567890abcdef");
        assert!(result.unwrap_err().contains("must start with 'wx'"));
    }

    #[test]
    fn test_app_id_deserialize_validates() {
        let ok: AppId = serde_json::from_str("\"wx1234567890abcdef\"").unwrap();
        assert_eq!(ok.as_str(), "wx1234567890abcdef");
        assert!(serde_json::from_str::<AppId>("\"nope\"").is_err());
    }

    #[test]
    fn test_app_secret_empty() {
        assert!(AppSecret::new("").is_err());
    }

    #[test]
    fn test_secrets_are_redacted() {
        let secret = AppSecret::new("s3cr3t").unwrap();
        let token = AccessToken::new("t0k3n").unwrap();
        assert!(!format!("{:?}", secret).contains("s3cr3t"));
        assert!(!format!("{:?}", token).contains("t0k3n"));
    }

    #[test]
    fn test_access_token_empty() {
        assert!(AccessToken::new("").is_err());
    }
}
