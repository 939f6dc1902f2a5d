//! Access token cache
//!
//! Readers share a `RwLock` fast path. Refreshes are serialised by a separate
//! mutex so concurrent callers hitting an expired token trigger one fetch.
//! [`TokenCache::spawn_refresher`] runs an explicit interval loop that keeps
//! the token warm until its [`RefreshHandle`] is shut down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Deserialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::WechatClient;
use crate::error::WechatError;
use crate::types::AccessToken;
use crate::utils::jittered_delay;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;
const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: AccessToken,
    pub expires_at: Instant,
}

impl CachedToken {
    /// True once `now + buffer` reaches the expiry instant.
    pub fn is_expired(&self, buffer: Duration) -> bool {
        Instant::now() + buffer >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
}

/// Cached access token with single-flight refresh
pub struct TokenCache {
    client: WechatClient,
    cache: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
    refresh_buffer: Duration,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("client", &self.client)
            .field("refresh_buffer", &self.refresh_buffer)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(client: WechatClient) -> Self {
        Self {
            client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
        }
    }

    /// How long before expiry a token is treated as stale. Default: 5 minutes.
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    pub fn client(&self) -> &WechatClient {
        &self.client
    }

    /// Current access token, fetching a new one when stale.
    pub async fn token(&self) -> Result<String, WechatError> {
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached().await {
            return Ok(token);
        }
        self.refresh_locked().await
    }

    /// Fetch a new token regardless of the cached one.
    pub async fn refresh(&self) -> Result<String, WechatError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Drop the cached token, e.g. after the API reports it invalid.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// `base_url + path` with a current `access_token` query parameter.
    pub async fn authenticated_url(&self, path: &str) -> Result<String, WechatError> {
        let token = self.token().await?;
        Ok(format!(
            "{}{}",
            self.client.base_url(),
            WechatClient::append_access_token(path, &token)
        ))
    }

    /// Snapshot of the cache entry.
    pub async fn cached_token(&self) -> Option<CachedToken> {
        self.cache.read().await.clone()
    }

    /// Keep the token warm from a background task.
    ///
    /// The first tick fires immediately; later ticks refresh only when the
    /// cached token is within the refresh buffer of expiry. A zero `period`
    /// is a configuration error.
    pub fn spawn_refresher(
        self: Arc<Self>,
        period: Duration,
    ) -> Result<RefreshHandle, WechatError> {
        if period.is_zero() {
            return Err(WechatError::Config(
                "refresh period must be greater than zero".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.token().await {
                            warn!("[TokenCache] background refresh failed: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("[TokenCache] refresher stopped");
        });

        Ok(RefreshHandle {
            shutdown: shutdown_tx,
            task,
        })
    }

    async fn cached(&self) -> Option<String> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|cached| !cached.is_expired(self.refresh_buffer))
            .map(|cached| cached.token.as_str().to_string())
    }

    async fn refresh_locked(&self) -> Result<String, WechatError> {
        let response = self.fetch_token_with_retry().await?;
        let token = AccessToken::new(response.access_token).map_err(WechatError::Token)?;

        info!(
            "[TokenCache] access token refreshed for {}, expires in {}s",
            self.client.appid(),
            response.expires_in
        );

        let value = token.as_str().to_string();
        *self.cache.write().await = Some(CachedToken {
            token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        Ok(value)
    }

    async fn fetch_token_with_retry(&self) -> Result<TokenResponse, WechatError> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match self.fetch_token().await {
                Ok(response) => return Ok(response),
                Err(WechatError::Http(e)) => {
                    warn!(
                        "[TokenCache] token request failed (attempt {}/{}): {}",
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    last_error = Some(WechatError::Http(e));
                    if attempt < MAX_RETRIES - 1 {
                        tokio::time::sleep(jittered_delay(RETRY_DELAY_MS, attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| WechatError::Token("Unknown error".to_string())))
    }

    async fn fetch_token(&self) -> Result<TokenResponse, WechatError> {
        let query = [
            ("grant_type", "client_credential"),
            ("appid", self.client.appid()),
            ("secret", self.client.secret()),
        ];

        self.client.get("/cgi-bin/token", &query).await
    }
}

/// Owner of a background refresh loop
#[derive(Debug)]
pub struct RefreshHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the loop and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("[TokenCache] refresher task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
