// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Envelope client
//!
//! A reqwest client with the [`Interceptor`] wired around every exchange.
//! Build one with [`crate::EnvelopeClientBuilder`] and call
//! [`EnvelopeClient::initialize`] before sending.

use std::sync::Arc;

use log::debug;
use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    Method,
};
use serde::Serialize;

use crate::{
    key_manager::{KeyManager, Readiness},
    pipeline::{Body, IncomingResponse, Interceptor, OutgoingRequest},
    Error, Result,
};

const JSON_CONTENT_TYPE: &str = "application/json";

pub struct EnvelopeClient {
    /// Http client
    pub(crate) http_client: reqwest::Client,

    pub(crate) interceptor: Interceptor,
}

impl EnvelopeClient {
    /// Run the key lifecycle. Requests to sealed endpoints are refused until
    /// this has succeeded.
    pub async fn initialize(&self) -> Result<Readiness> {
        self.interceptor.manager().initialize().await
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        self.interceptor.manager()
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub async fn get(&self, url: &str) -> Result<IncomingResponse> {
        self.send(OutgoingRequest::new(Method::GET, url)).await
    }

    pub async fn post_json<T: Serialize>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<IncomingResponse> {
        let payload =
            serde_json::to_value(payload).map_err(|e| Error::SerializeBody(e.to_string()))?;
        self.send(OutgoingRequest::new(Method::POST, url).with_json(payload))
            .await
    }

    /// Seal, send and open one exchange. 4xx/5xx answers come back as
    /// [`Error::Status`].
    pub async fn send(&self, request: OutgoingRequest) -> Result<IncomingResponse> {
        let OutgoingRequest {
            method,
            url,
            mut headers,
            body,
        } = self.interceptor.seal_request(request).await?;

        let body = match body {
            Body::Empty => None,
            Body::Text(text) => Some(text),
            Body::Json(payload) => {
                let text = serde_json::to_string(&payload)
                    .map_err(|e| Error::SerializeBody(e.to_string()))?;
                headers
                    .entry(CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static(JSON_CONTENT_TYPE));
                Some(text)
            }
        };

        let mut builder = self.http_client.request(method.clone(), &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("{method} {url}: {e}")))?;
        debug!("{method} {url} answered {}", resp.status());

        let response = read_body(resp).await?;
        self.interceptor.open_response(response)
    }
}

/// Collect a reqwest response. JSON content is parsed when it is valid,
/// anything else stays text.
pub async fn read_body(resp: reqwest::Response) -> Result<IncomingResponse> {
    let status = resp.status();
    let headers = resp.headers().clone();
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("json"));

    let text = resp
        .text()
        .await
        .map_err(|e| Error::HttpError(format!("read response body: {e}")))?;

    let body = if text.is_empty() {
        Body::Empty
    } else if is_json {
        match serde_json::from_str(&text) {
            Ok(payload) => Body::Json(payload),
            Err(_) => Body::Text(text),
        }
    } else {
        Body::Text(text)
    };

    Ok(IncomingResponse::new(status, headers, body))
}
