//! Rotating signing key set.
//!
//! Keys are fetched from a [`KeySetSource`] and cached by key id until the
//! refresh interval elapses. A token signed with an unknown key id forces
//! one refresh before it is rejected. [`KeySetCache::spawn_refresh`] keeps
//! the cache warm on its own task, independently of any dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::foundation::{AuthError, AuthResult};
use crate::integration::HttpClientCapability;

/// Default time a fetched key set stays valid.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// One JSON Web Key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, `RSA` or `EC`.
    pub kty: String,
    /// Key id.
    #[serde(default)]
    pub kid: Option<String>,
    /// Intended algorithm.
    #[serde(default)]
    pub alg: Option<String>,
    /// RSA modulus.
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent.
    #[serde(default)]
    pub e: Option<String>,
    /// EC curve.
    #[serde(default)]
    pub crv: Option<String>,
    /// EC x coordinate.
    #[serde(default)]
    pub x: Option<String>,
    /// EC y coordinate.
    #[serde(default)]
    pub y: Option<String>,
    /// Channels allowed to use the key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endorsements: Vec<String>,
}

/// A JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// Keys.
    pub keys: Vec<Jwk>,
}

/// Where key sets come from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetches the current key set.
    async fn fetch(&self) -> AuthResult<JwkSet>;
}

/// A fixed key set.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySet(pub JwkSet);

#[async_trait]
impl KeySetSource for StaticKeySet {
    async fn fetch(&self) -> AuthResult<JwkSet> {
        Ok(self.0.clone())
    }
}

/// Discovers the key set through an OpenID metadata document.
pub struct OpenIdKeySetSource {
    metadata_url: String,
    client: Arc<dyn HttpClientCapability>,
}

impl OpenIdKeySetSource {
    /// Creates a source reading `metadata_url`.
    pub fn new(metadata_url: impl Into<String>, client: Arc<dyn HttpClientCapability>) -> Self {
        Self {
            metadata_url: metadata_url.into(),
            client,
        }
    }
}

#[async_trait]
impl KeySetSource for OpenIdKeySetSource {
    async fn fetch(&self) -> AuthResult<JwkSet> {
        let metadata = self
            .client
            .get_json(&self.metadata_url)
            .await
            .map_err(|e| AuthError::key_set(e.to_string()))?;
        let jwks_uri = metadata
            .get("jwks_uri")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| AuthError::key_set("metadata has no jwks_uri"))?;

        debug!(jwks_uri, "Fetching signing keys");
        let keys = self
            .client
            .get_json(jwks_uri)
            .await
            .map_err(|e| AuthError::key_set(e.to_string()))?;
        serde_json::from_value(keys).map_err(|e| AuthError::key_set(e.to_string()))
    }
}

struct Cached {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
}

/// Cache of signing keys indexed by key id.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    refresh_interval: Duration,
    cached: RwLock<Option<Cached>>,
    refreshing: tokio::sync::Mutex<()>,
}

impl KeySetCache {
    /// Creates an empty cache over `source`.
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self {
            source,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            cached: RwLock::new(None),
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Returns the refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.cached.read().as_ref().map_or(0, |c| c.keys.len())
    }

    /// Returns true when no key is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, kid: &str, now: Instant) -> Option<Option<Jwk>> {
        let cached = self.cached.read();
        let cached = cached.as_ref()?;
        if now.duration_since(cached.fetched_at) >= self.refresh_interval {
            return None;
        }
        Some(cached.keys.get(kid).cloned())
    }

    /// Returns the currently valid key with id `kid`.
    pub async fn key(&self, kid: &str) -> AuthResult<Jwk> {
        match self.lookup(kid, Instant::now()) {
            Some(Some(key)) => return Ok(key),
            Some(None) => debug!(kid, "Unknown key id, refreshing key set"),
            None => debug!("Key set missing or stale, refreshing"),
        }
        self.refresh().await?;
        self.lookup(kid, Instant::now())
            .flatten()
            .ok_or_else(|| AuthError::UnknownKey {
                kid: kid.to_string(),
            })
    }

    /// Fetches the key set now. Returns the number of keys.
    pub async fn refresh(&self) -> AuthResult<usize> {
        let _refreshing = self.refreshing.lock().await;
        let set = self.source.fetch().await?;
        let keys: HashMap<_, _> = set
            .keys
            .into_iter()
            .filter_map(|key| key.kid.clone().map(|kid| (kid, key)))
            .collect();
        let count = keys.len();
        *self.cached.write() = Some(Cached {
            keys,
            fetched_at: Instant::now(),
        });
        info!(keys = count, "Signing key set refreshed");
        Ok(count)
    }

    /// Refreshes the key set now and then every refresh interval, until cancelled.
    pub fn spawn_refresh(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(e) = cache.refresh().await {
                    warn!(error = %e, "Signing key set refresh failed");
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(cache.refresh_interval) => {}
                }
            }
            debug!("Signing key set refresh stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        fetches: AtomicUsize,
        set: JwkSet,
    }

    #[async_trait]
    impl KeySetSource for Counting {
        async fn fetch(&self) -> AuthResult<JwkSet> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.set.clone())
        }
    }

    fn key(kid: &str) -> Jwk {
        Jwk {
            kty: "EC".into(),
            kid: Some(kid.into()),
            alg: Some("ES256".into()),
            n: None,
            e: None,
            crv: Some("P-256".into()),
            x: Some("x".into()),
            y: Some("y".into()),
            endorsements: Vec::new(),
        }
    }

    fn counting(kids: &[&str]) -> Arc<Counting> {
        Arc::new(Counting {
            fetches: AtomicUsize::new(0),
            set: JwkSet {
                keys: kids.iter().map(|k| key(k)).collect(),
            },
        })
    }

    #[tokio::test]
    async fn keys_are_cached_between_refreshes() {
        let source = counting(&["k1"]);
        let cache = KeySetCache::new(source.clone());

        cache.key("k1").await.unwrap();
        cache.key("k1").await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_kid_refreshes_once() {
        let source = counting(&["k1"]);
        let cache = KeySetCache::new(source.clone());
        cache.refresh().await.unwrap();

        let err = cache.key("other").await.unwrap_err();
        assert_eq!(err, AuthError::UnknownKey { kid: "other".into() });
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn set_goes_stale_after_interval() {
        let source = counting(&["k1"]);
        let cache = KeySetCache::new(source).with_refresh_interval(Duration::from_secs(60));
        cache.refresh().await.unwrap();

        let now = Instant::now();
        assert_eq!(cache.lookup("k1", now), Some(Some(key("k1"))));
        assert_eq!(cache.lookup("k1", now + Duration::from_secs(61)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh_stops_on_cancel() {
        let source = counting(&["k1"]);
        let cache = Arc::new(
            KeySetCache::new(source.clone()).with_refresh_interval(Duration::from_secs(60)),
        );
        let token = CancellationToken::new();
        let task = cache.spawn_refresh(token.clone());

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);

        token.cancel();
        task.await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
