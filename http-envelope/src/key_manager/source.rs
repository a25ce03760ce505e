// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::HeaderMap;

/// Where the public key is fetched from. Only the response headers matter:
/// the PEM travels in a header, never in the body.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Perform one fetch against `endpoint`. Any error returned here is
    /// considered transient and may be retried.
    async fn fetch(&self, endpoint: &str) -> Result<HeaderMap>;
}

/// [`KeySource`] issuing a plain `GET` with reqwest.
pub struct HttpKeySource {
    http_client: reqwest::Client,
}

impl HttpKeySource {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self, endpoint: &str) -> Result<HeaderMap> {
        let resp = self
            .http_client
            .get(endpoint)
            .send()
            .await
            .context("send public key request")?;

        let status = resp.status();
        debug!("key endpoint {endpoint} answered {status}");
        if !status.is_success() {
            bail!("key endpoint answered {status}");
        }

        Ok(resp.headers().clone())
    }
}
