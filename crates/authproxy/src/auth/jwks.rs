//! JWKS key cache with lock-free snapshots and background refresh.
//!
//! The cache fetches a JSON Web Key Set from a remote URL and publishes it as
//! an immutable [`KeySet`] snapshot. Request handlers read the current
//! snapshot without taking a lock; refreshes build a new snapshot and swap it
//! in atomically.
//!
//! # Refresh
//!
//! - The initial fetch happens in [`JwksCache::fetch`] and its failure is fatal
//! - A background task refreshes the set every `refresh_interval`
//! - A lookup that sees a stale snapshot, or a token with an unknown key id,
//!   requests a lazy refresh that runs on a spawned task; the caller never waits
//! - Lazy refreshes are rate limited by [`MIN_REFRESH_RETRY`]
//! - A failed refresh keeps the last known-good snapshot

use arc_swap::ArcSwap;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::observability::metrics::{record_jwks_refresh, set_jwks_keys};

/// Default interval between scheduled refreshes (15 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(900);

/// Minimum time between two lazily triggered refresh attempts.
pub const MIN_REFRESH_RETRY: Duration = Duration::from_secs(30);

/// Timeout for a single JWKS HTTP request.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while fetching a key set.
#[derive(Debug, Error)]
pub enum JwksError {
    #[error("fetching jwks from {url}: {cause}")]
    Fetch { url: String, cause: String },

    #[error("jwks endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("parsing jwks from {url}: {cause}")]
    Parse { url: String, cause: String },

    #[error("jwks from {url} contains no usable keys")]
    NoUsableKeys { url: String },
}

/// A single verification key from the key set.
#[derive(Clone)]
pub struct VerificationKey {
    kid: Option<String>,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Build a verification key from a parsed JWK.
    ///
    /// Returns `None` for keys that cannot verify signatures: encryption
    /// keys, encryption algorithms, symmetric keys (their material is public
    /// once published) and unsupported key types.
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return None;
        }
        if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
            return None;
        }

        let algorithm = match jwk.common.key_algorithm.as_ref() {
            Some(key_algorithm) => Some(signing_algorithm(key_algorithm)?),
            None => None,
        };

        let decoding_key = DecodingKey::from_jwk(jwk).ok()?;

        Some(Self {
            kid: jwk.common.key_id.clone(),
            algorithm,
            decoding_key,
        })
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Algorithm declared by the key, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Map a JWK `alg` to an asymmetric signature algorithm.
fn signing_algorithm(key_algorithm: &KeyAlgorithm) -> Option<Algorithm> {
    match key_algorithm {
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Immutable snapshot of a fetched key set.
#[derive(Debug)]
pub struct KeySet {
    keys: Vec<VerificationKey>,
    fetched_at: Instant,
}

impl KeySet {
    pub fn new(keys: Vec<VerificationKey>) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    /// Look up a key by its key id.
    pub fn find(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.iter().find(|key| key.kid() == Some(kid))
    }

    pub fn keys(&self) -> &[VerificationKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Raw JWKS document. Keys are kept as JSON so one bad key does not
/// invalidate the whole set.
#[derive(Deserialize)]
struct RawKeySet {
    keys: Vec<serde_json::Value>,
}

/// Key cache for a single JWKS URL.
pub struct JwksCache {
    url: String,
    http_client: reqwest::Client,
    refresh_interval: Duration,
    current: ArcSwap<KeySet>,
    refreshing: AtomicBool,
    /// Milliseconds since `created` of the last lazy refresh attempt.
    last_lazy_attempt_ms: AtomicU64,
    created: Instant,
}

impl JwksCache {
    /// Create a cache and perform the initial fetch.
    ///
    /// # Errors
    ///
    /// Returns `JwksError` if the initial key set cannot be fetched or
    /// contains no usable key.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(url: &str, refresh_interval: Duration) -> Result<Arc<Self>, JwksError> {
        let http_client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "authproxy.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        let start = Instant::now();
        let key_set = match fetch_key_set(&http_client, url).await {
            Ok(key_set) => key_set,
            Err(e) => {
                record_jwks_refresh("error", start.elapsed());
                return Err(e);
            }
        };
        record_jwks_refresh("success", start.elapsed());
        set_jwks_keys(key_set.len());

        tracing::info!(
            target: "authproxy.auth.jwks",
            url = %url,
            keys = key_set.len(),
            "Initial JWKS fetch complete"
        );

        Ok(Arc::new(Self::from_parts(
            url.to_string(),
            http_client,
            refresh_interval,
            key_set,
        )))
    }

    /// Build a cache around an already fetched key set.
    pub fn from_parts(
        url: String,
        http_client: reqwest::Client,
        refresh_interval: Duration,
        key_set: KeySet,
    ) -> Self {
        Self {
            url,
            http_client,
            refresh_interval,
            current: ArcSwap::from_pointee(key_set),
            refreshing: AtomicBool::new(false),
            last_lazy_attempt_ms: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the current snapshot without waiting.
    ///
    /// A stale snapshot is still returned, and a lazy refresh is requested.
    pub fn snapshot(self: &Arc<Self>) -> Arc<KeySet> {
        let key_set = self.current.load_full();
        if key_set.age() > self.refresh_interval {
            tracing::debug!(target: "authproxy.auth.jwks", url = %self.url, "JWKS snapshot is stale");
            self.request_refresh();
        }
        key_set
    }

    /// Request a non-blocking refresh.
    ///
    /// Ignored while another refresh is running or when the previous lazy
    /// attempt is more recent than [`MIN_REFRESH_RETRY`].
    pub fn request_refresh(self: &Arc<Self>) {
        let now_ms = elapsed_ms(self.created);
        let last_ms = self.last_lazy_attempt_ms.load(Ordering::Acquire);
        if last_ms != 0 && now_ms.saturating_sub(last_ms) < duration_ms(MIN_REFRESH_RETRY) {
            return;
        }
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.last_lazy_attempt_ms
            .store(now_ms.max(1), Ordering::Release);

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            // Failure is logged and counted inside refresh
            let _ = cache.refresh().await;
            cache.refreshing.store(false, Ordering::Release);
        });
    }

    /// Fetch the key set and swap it in on success.
    ///
    /// # Errors
    ///
    /// Returns `JwksError` on failure; the previous snapshot stays in place.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn refresh(&self) -> Result<(), JwksError> {
        let start = Instant::now();
        match fetch_key_set(&self.http_client, &self.url).await {
            Ok(key_set) => {
                let count = key_set.len();
                self.current.store(Arc::new(key_set));
                record_jwks_refresh("success", start.elapsed());
                set_jwks_keys(count);
                tracing::debug!(target: "authproxy.auth.jwks", url = %self.url, keys = count, "JWKS refreshed");
                Ok(())
            }
            Err(e) => {
                record_jwks_refresh("error", start.elapsed());
                tracing::warn!(
                    target: "authproxy.auth.jwks",
                    error = %e,
                    "JWKS refresh failed, keeping previous key set"
                );
                Err(e)
            }
        }
    }

    /// Spawn the scheduled refresh task.
    ///
    /// The task only holds a weak reference and exits once the cache is dropped.
    /// A zero refresh interval disables scheduled refreshes; every snapshot is
    /// then stale and refreshes are driven by lazy requests alone.
    pub fn spawn_refresh_task(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.refresh_interval;

        if period.is_zero() {
            tracing::warn!(
                target: "authproxy.auth.jwks",
                url = %self.url,
                "JWKS refresh interval is zero, scheduled refresh disabled"
            );
            return tokio::spawn(async {});
        }

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(cache) = weak.upgrade() else {
                    tracing::debug!(target: "authproxy.auth.jwks", "JWKS cache dropped, stopping refresh task");
                    break;
                };
                let _ = cache.refresh().await;
            }
        })
    }
}

impl fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksCache")
            .field("url", &self.url)
            .field("refresh_interval", &self.refresh_interval)
            .field("keys", &self.current.load().len())
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    duration_ms(since.elapsed())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

async fn fetch_key_set(client: &reqwest::Client, url: &str) -> Result<KeySet, JwksError> {
    tracing::debug!(target: "authproxy.auth.jwks", url = %url, "Fetching JWKS");

    let response = client.get(url).send().await.map_err(|e| JwksError::Fetch {
        url: url.to_string(),
        cause: e.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(JwksError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let raw: RawKeySet = response.json().await.map_err(|e| JwksError::Parse {
        url: url.to_string(),
        cause: e.to_string(),
    })?;

    parse_key_set(url, raw.keys)
}

fn parse_key_set(url: &str, raw_keys: Vec<serde_json::Value>) -> Result<KeySet, JwksError> {
    let mut keys = Vec::with_capacity(raw_keys.len());
    for raw in raw_keys {
        let parsed = serde_json::from_value::<Jwk>(raw)
            .ok()
            .and_then(|jwk| VerificationKey::from_jwk(&jwk));
        match parsed {
            Some(key) => keys.push(key),
            None => {
                tracing::debug!(target: "authproxy.auth.jwks", url = %url, "Skipping unusable key in JWKS");
            }
        }
    }

    if keys.is_empty() {
        return Err(JwksError::NoUsableKeys {
            url: url.to_string(),
        });
    }

    Ok(KeySet::new(keys))
}
