// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{sync::Arc, time::Duration};

use anyhow::*;

use crate::{
    cache::{KeyCache, SessionCache},
    client::EnvelopeClient,
    config::EnvelopeConfig,
    key_manager::{HttpKeySource, KeyManager, KeySource},
    pipeline::Interceptor,
};

pub struct EnvelopeClientBuilder {
    config: EnvelopeConfig,
    cache: Option<Arc<dyn KeyCache>>,
    key_source: Option<Arc<dyn KeySource>>,
    root_certs: Vec<String>,
}

impl EnvelopeClientBuilder {
    pub fn new(config: EnvelopeConfig) -> Self {
        Self {
            config,
            cache: None,
            key_source: None,
            root_certs: vec![],
        }
    }

    /// Use `cache` instead of a fresh [`SessionCache`].
    pub fn with_cache(mut self, cache: Arc<dyn KeyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch the public key through `key_source` instead of the client's
    /// own http connection.
    pub fn with_key_source(mut self, key_source: Arc<dyn KeySource>) -> Self {
        self.key_source = Some(key_source);
        self
    }

    pub fn add_root_cert(mut self, cert_pem: &str) -> Self {
        self.root_certs.push(cert_pem.to_string());
        self
    }

    pub fn build(self) -> Result<EnvelopeClient> {
        let mut http_client_builder = reqwest::Client::builder()
            .user_agent(format!("http-envelope/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(self.config.request_timeout_sec))
            .use_rustls_tls();

        for root_cert in &self.root_certs {
            let cert = reqwest::Certificate::from_pem(root_cert.as_bytes())
                .context("read root cert")?;
            http_client_builder = http_client_builder.add_root_certificate(cert);
        }

        let http_client = http_client_builder
            .build()
            .context("Build envelope http client")?;

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(SessionCache::new()));
        let key_source = self
            .key_source
            .unwrap_or_else(|| Arc::new(HttpKeySource::new(http_client.clone())));

        let manager = KeyManager::new(Arc::new(self.config), cache, key_source);
        Ok(EnvelopeClient {
            http_client,
            interceptor: Interceptor::new(Arc::new(manager)),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        builder::EnvelopeClientBuilder,
        config::EnvelopeConfig,
        key_manager::{KeyState, Readiness},
    };

    #[tokio::test]
    async fn test_build_client() {
        let client = EnvelopeClientBuilder::new(EnvelopeConfig {
            enabled: false,
            ..Default::default()
        })
        .build()
        .expect("build client failed");

        assert_eq!(client.key_manager().state(), KeyState::Uninitialized);
        assert_eq!(client.initialize().await.unwrap(), Readiness::Disabled);
        assert_eq!(client.key_manager().state(), KeyState::Disabled);
    }
}
