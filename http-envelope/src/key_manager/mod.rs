// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Public key lifecycle
//!
//! Before any payload may be sealed, the client must hold exactly one
//! trusted RSA public key. [`KeyManager`] acquires it, either verbatim from
//! the configuration or from a remote endpoint (consulting the session cache
//! first), pins it against the configured SHA-256 hash and publishes it.
//!
//! ```text
//! Uninitialized -> Disabled
//!               -> UsingDirectKey ------------------------> Validating -> Ready | Failed
//!               -> CheckingCache -> (hit) Validating
//!                                -> (miss | stale) Fetching -> Validating
//! ```
//!
//! The lifecycle is driven once per manager by [`KeyManager::initialize`].

mod source;
pub use source::*;

use std::{sync::Arc, time::Duration};

use crypto::{rsa::RSAPublicKey, HashAlgorithm};
use log::{debug, error, info, warn};
use strum::Display;
use tokio::sync::{watch, Mutex, OnceCell};

use crate::{
    cache::{KeyCache, PUBLIC_KEY_CACHE_ENTRY},
    config::EnvelopeConfig,
    headers::HeaderLookup,
    Error, Result,
};

/// Digest used to pin public keys.
pub const PIN_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum KeyState {
    Uninitialized,
    Disabled,
    UsingDirectKey,
    CheckingCache,
    Fetching,
    Validating,
    Ready,
    Failed,
}

impl KeyState {
    pub fn is_settled(&self) -> bool {
        matches!(self, KeyState::Disabled | KeyState::Ready | KeyState::Failed)
    }
}

/// Successful terminal states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum KeyOrigin {
    Direct,
    Cache,
    Remote,
}

/// The trusted public key. Immutable once published.
#[derive(Debug)]
pub struct ActiveKey {
    pub pem: String,
    pub fingerprint: String,
    pub origin: KeyOrigin,
    key: RSAPublicKey,
}

impl ActiveKey {
    pub fn public_key(&self) -> &RSAPublicKey {
        &self.key
    }
}

enum Outcome {
    Settled(Readiness),
    Failed(String),
}

/// Lowercase hex SHA-256 of the PEM text exactly as received.
pub fn fingerprint(pem: &str) -> String {
    PIN_HASH_ALGORITHM.hex_digest(pem.as_bytes())
}

/// Whether `pem` hashes to `expected`. Hex case is ignored. A missing pin
/// never matches.
pub fn pin_matches(pem: &str, expected: Option<&str>) -> bool {
    match expected {
        Some(expected) => fingerprint(pem).eq_ignore_ascii_case(expected),
        None => false,
    }
}

/// Delay before retry number `attempt + 1`: 1s, 2s, 4s, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.saturating_sub(1)))
}

pub struct KeyManager {
    config: Arc<EnvelopeConfig>,
    cache: Arc<dyn KeyCache>,
    source: Arc<dyn KeySource>,
    state: watch::Sender<KeyState>,
    active: OnceCell<Arc<ActiveKey>>,
    outcome: Mutex<Option<Outcome>>,
}

impl KeyManager {
    pub fn new(
        config: Arc<EnvelopeConfig>,
        cache: Arc<dyn KeyCache>,
        source: Arc<dyn KeySource>,
    ) -> Self {
        Self {
            config,
            cache,
            source,
            state: watch::Sender::new(KeyState::Uninitialized),
            active: OnceCell::new(),
            outcome: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    pub fn state(&self) -> KeyState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<KeyState> {
        self.state.subscribe()
    }

    /// Resolve once the lifecycle reached a terminal state.
    pub async fn wait_until_settled(&self) -> KeyState {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(KeyState::is_settled).await.map(|state| *state);
        settled.unwrap_or_else(|_| self.state())
    }

    /// The published key, only available in [`KeyState::Ready`].
    pub fn active_key(&self) -> Option<Arc<ActiveKey>> {
        self.active.get().cloned()
    }

    /// Drive the lifecycle to a terminal state. The first caller runs it;
    /// concurrent callers wait for it, later callers get the recorded
    /// outcome.
    pub async fn initialize(&self) -> Result<Readiness> {
        let mut outcome = self.outcome.lock().await;
        match outcome.as_ref() {
            Some(Outcome::Settled(readiness)) => return Ok(*readiness),
            Some(Outcome::Failed(reason)) => {
                return Err(Error::InitializationFailed(reason.clone()))
            }
            None => {}
        }

        let res = self.run_lifecycle().await;
        *outcome = Some(match &res {
            Ok(readiness) => Outcome::Settled(*readiness),
            Err(e) => {
                error!("HTTP envelope encryption could not start: {e}");
                error!("Set `enabled = false` in the envelope configuration to run without payload encryption.");
                Outcome::Failed(e.to_string())
            }
        });

        res
    }

    async fn run_lifecycle(&self) -> Result<Readiness> {
        if !self.config.enabled {
            info!("HTTP envelope encryption disabled by configuration");
            self.transition(KeyState::Disabled);
            return Ok(Readiness::Disabled);
        }

        match self.acquire().await {
            Ok(()) => {
                self.transition(KeyState::Ready);
                Ok(Readiness::Ready)
            }
            Err(e) => {
                self.transition(KeyState::Failed);
                Err(e)
            }
        }
    }

    async fn acquire(&self) -> Result<()> {
        self.config.validate()?;

        if let Some(pem) = &self.config.public_key_pem {
            self.transition(KeyState::UsingDirectKey);
            return self.activate(pem.clone(), KeyOrigin::Direct);
        }

        let Some(endpoint) = self.config.key_endpoint.as_deref() else {
            return Err(Error::Config("no public key source configured".into()));
        };

        self.transition(KeyState::CheckingCache);
        if let Some(pem) = self.read_cache() {
            match self.activate(pem, KeyOrigin::Cache) {
                Ok(()) => return Ok(()),
                Err(e) => warn!("cached public key rejected, fetching a fresh one: {e}"),
            }
        }

        self.transition(KeyState::Fetching);
        let pem = self.fetch_public_key(endpoint).await?;
        self.activate(pem, KeyOrigin::Remote)
    }

    /// Fetch the PEM, retrying transport failures with exponential backoff.
    /// A response without the key header is a deployment error and is not
    /// retried.
    async fn fetch_public_key(&self, endpoint: &str) -> Result<String> {
        let attempts = self.config.fetch_retries.max(1);
        let header = &self.config.headers.public_key;

        let mut attempt = 1;
        loop {
            debug!("fetch public key from {endpoint}, attempt {attempt}/{attempts}");
            match self.source.fetch(endpoint).await {
                Ok(headers) => {
                    return match headers.lookup(header) {
                        Some(pem) if !pem.trim().is_empty() => Ok(pem.to_owned()),
                        _ => Err(Error::MissingKeyHeader {
                            header: header.clone(),
                            observed: headers.observed_names(),
                        }),
                    };
                }
                Err(e) => {
                    if attempt >= attempts {
                        return Err(Error::FetchFailed {
                            endpoint: endpoint.to_owned(),
                            attempts,
                            reason: format!("{e:#}"),
                        });
                    }

                    let delay = backoff_delay(attempt);
                    warn!(
                        "fetch public key failed: {e:#}, retry in {}s ({attempt}/{attempts})",
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Pin, import and publish `pem`. A cached key that fails is evicted so
    /// the next attempt starts from a fresh fetch.
    fn activate(&self, pem: String, origin: KeyOrigin) -> Result<()> {
        self.transition(KeyState::Validating);

        let (fingerprint, key) = match self.verify_and_import(&pem) {
            Ok(verified) => verified,
            Err(e) => {
                if origin == KeyOrigin::Cache {
                    self.evict_cache();
                }
                return Err(e);
            }
        };

        info!("public key {fingerprint} from {origin} verified");
        if origin == KeyOrigin::Remote {
            self.write_cache(&pem);
        }

        let active = Arc::new(ActiveKey {
            pem,
            fingerprint,
            origin,
            key,
        });
        if self.active.set(active).is_err() {
            warn!("a public key was already published, keeping it");
        }

        Ok(())
    }

    fn verify_and_import(&self, pem: &str) -> Result<(String, RSAPublicKey)> {
        let computed = fingerprint(pem);
        match self.config.public_key_hash.as_deref() {
            None => {
                warn!("No public key hash pinned. After verifying the key out of band, set `public_key_hash = \"{computed}\"`.");
                return Err(Error::UnpinnedKey { computed });
            }
            Some(expected) if !pin_matches(pem, Some(expected)) => {
                return Err(Error::HashMismatch {
                    expected: expected.to_owned(),
                    computed,
                });
            }
            Some(_) => {}
        }

        let key =
            RSAPublicKey::from_pem(pem).map_err(|e| Error::InvalidPublicKey(format!("{e:#}")))?;
        Ok((computed, key))
    }

    fn read_cache(&self) -> Option<String> {
        match self.cache.get(PUBLIC_KEY_CACHE_ENTRY) {
            Ok(pem) => pem,
            Err(e) => {
                warn!("read public key cache failed, treat as empty: {e:#}");
                None
            }
        }
    }

    fn write_cache(&self, pem: &str) {
        if let Err(e) = self.cache.set(PUBLIC_KEY_CACHE_ENTRY, pem) {
            warn!("write public key cache failed: {e:#}");
        }
    }

    fn evict_cache(&self) {
        if let Err(e) = self.cache.remove(PUBLIC_KEY_CACHE_ENTRY) {
            warn!("evict public key cache failed: {e:#}");
        }
    }

    fn transition(&self, next: KeyState) {
        let previous = self.state.send_replace(next);
        if self.config.debug {
            info!("key lifecycle: {previous} -> {next}");
        } else {
            debug!("key lifecycle: {previous} -> {next}");
        }
    }
}
