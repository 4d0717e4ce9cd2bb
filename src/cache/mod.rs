use crate::culqi::types::{CardData, TokenData};
use crate::metrics;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Token cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheConfig {
    /// Enable caching
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of entries in cache
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// Time-to-live for cache entries in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_capacity() -> u64 {
    1000
}

fn default_ttl_ms() -> u64 {
    300_000 // 5 minutes
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_capacity: default_max_capacity(),
            ttl_ms: default_ttl_ms(),
        }
    }
}

impl TokenCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// One-way fingerprint of a card, used as the cache key.
///
/// Built from card number and CVV so two requests for the same card share a
/// token, without the raw values ever being stored.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct CardFingerprint(String);

impl CardFingerprint {
    pub fn new(card: &CardData) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(card.card_number.trim().as_bytes());
        hasher.update([0u8]);
        hasher.update(card.cvv.trim().as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CardFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to correlate log lines
        write!(f, "CardFingerprint({}…)", &self.0[..12])
    }
}

/// TTL-bounded cache of issued card tokens
#[derive(Debug, Clone)]
pub struct TokenCache {
    config: TokenCacheConfig,
    cache: Cache<CardFingerprint, TokenData>,
}

impl TokenCache {
    /// Create a new token cache
    pub fn new(config: TokenCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl())
            .build();

        info!(
            enabled = config.enabled,
            max_capacity = config.max_capacity,
            ttl_ms = config.ttl_ms,
            "Initialized token cache"
        );

        Self { config, cache }
    }

    /// Look up a previously issued token
    pub async fn get(&self, key: &CardFingerprint) -> Option<TokenData> {
        if !self.config.enabled {
            return None;
        }

        let cached = self.cache.get(key).await;
        metrics::record_token_cache_lookup(cached.is_some());
        if cached.is_some() {
            debug!(fingerprint = ?key, "Token cache hit");
        }
        cached
    }

    /// Store an issued token
    pub async fn put(&self, key: CardFingerprint, token: TokenData) {
        if !self.config.enabled {
            return;
        }

        debug!(fingerprint = ?key, token_id = %token.id, "Caching token");
        self.cache.insert(key, token).await;
    }

    /// Get cache statistics
    pub fn stats(&self) -> TokenCacheStats {
        TokenCacheStats {
            enabled: self.config.enabled,
            entry_count: self.cache.entry_count(),
            ttl_ms: self.config.ttl_ms,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct TokenCacheStats {
    pub enabled: bool,
    pub entry_count: u64,
    pub ttl_ms: u64,
}
