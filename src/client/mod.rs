//! WeChat HTTP client
//!
//! The client only carries what the token cache needs: credentials, a base
//! URL and a JSON `GET` that maps `errcode` failures to [`WechatError::Api`].
//!
//! [`WechatError::Api`]: crate::error::WechatError::Api

mod wechat_client;
pub use wechat_client::{WechatClient, WechatClientBuilder};
