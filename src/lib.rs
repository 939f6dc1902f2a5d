//! WeChat secure message channel for Rust
//!
//! Server-side building blocks for WeChat Official Account, Open Platform and
//! WeChat Pay integrations:
//!
//! - AES-256-CBC message envelopes between the platform and a callback endpoint
//! - SHA1 callback signatures and the GET verification handshake
//! - MD5 / HMAC-SHA256 payment signatures, request bodies and notifications
//! - Typed inbound messages and passive replies
//! - A cached, self-refreshing access token
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wechat_secure_channel::{CryptoChannel, channel::CallbackQuery};
//!
//! let channel = CryptoChannel::new(
//!     "wxb11529c136998cb6",
//!     "token",
//!     "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG",
//! )?;
//!
//! // POST handler
//! match channel.open_callback(&body, &query) {
//!     Some(message) => { /* handle message */ }
//!     None => { /* reply with an empty body */ }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`channel`] - signed, encrypted callback channel
//! - [`crypto`] - padding, signatures, envelope codec, user data decryption
//! - [`message`] - inbound message decoding and replies
//! - [`pay`] - payment request signing and notification verification
//! - [`token`] - access token cache with background refresh
//! - [`client`] - HTTP client used by the token cache
//! - [`config`] - JSON account configuration
//! - [`error`] - error types
//!
//! ## Error Handling
//!
//! Crypto primitives return [`CryptoError`]; everything else returns
//! [`WechatError`], which wraps it. Callback handlers should answer every
//! rejection the same way:
//!
//! ```rust,ignore
//! match channel.decrypt_message(&body, &sig, &ts, &nonce) {
//!     Ok(xml) => { /* ... */ }
//!     Err(_) => return empty_response(),
//! }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fields;
pub mod message;
pub mod pay;
pub mod token;
pub mod types;
mod utils;

pub use channel::CryptoChannel;
pub use client::{WechatClient, WechatClientBuilder};
pub use config::Config;
pub use error::{CryptoError, WechatError};
pub use message::{InboundMessage, Reply};
pub use pay::PayConfig;
pub use token::{RefreshHandle, TokenCache};
