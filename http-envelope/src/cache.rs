// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Session-scoped storage for the fetched public key.

use anyhow::Result;
use dashmap::DashMap;

/// Storage identifier of the cached PEM.
pub const PUBLIC_KEY_CACHE_ENTRY: &str = "http-envelope.public-key-pem";

/// A string key-value store living as long as the session. Every operation
/// may fail; callers decide how to degrade.
pub trait KeyCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory [`KeyCache`] scoped to the process.
#[derive(Default, Debug)]
pub struct SessionCache {
    entries: DashMap<String, String>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyCache for SessionCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let cache = SessionCache::new();
        assert_eq!(cache.get(PUBLIC_KEY_CACHE_ENTRY).unwrap(), None);

        cache.set(PUBLIC_KEY_CACHE_ENTRY, "first").unwrap();
        cache.set(PUBLIC_KEY_CACHE_ENTRY, "second").unwrap();
        assert_eq!(
            cache.get(PUBLIC_KEY_CACHE_ENTRY).unwrap().as_deref(),
            Some("second")
        );

        cache.remove(PUBLIC_KEY_CACHE_ENTRY).unwrap();
        assert_eq!(cache.get(PUBLIC_KEY_CACHE_ENTRY).unwrap(), None);
        cache.remove(PUBLIC_KEY_CACHE_ENTRY).unwrap();
    }
}
