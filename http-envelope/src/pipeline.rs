// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Interception pipeline
//!
//! The hooks a transport calls around one HTTP exchange:
//! [`Interceptor::seal_request`] before sending and
//! [`Interceptor::open_response`] after receiving.
//!
//! - `POST`/`PUT`/`PATCH` with a JSON body to a matching url: the body is
//!   sealed and replaced with the base64 ciphertext, the wrapped key and IV
//!   are attached as headers and the content type becomes `text/plain`.
//! - `GET` to a matching url: only wrapped reply material is attached, so
//!   the server can seal its answer.
//! - Responses carrying raw key material in the same two headers are
//!   opened. Error responses keep their status, with the opened fields
//!   available at the top level of [`StatusError`].

use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Method, StatusCode,
};
use serde_json::{Map, Value};

use crate::{
    config::EnvelopeConfig,
    envelope::{self, EnvelopeCodec},
    headers::{set_header, HeaderLookup},
    key_manager::{KeyManager, KeyState},
    matcher, Error, Result,
};

pub const SEALED_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn with_json(mut self, payload: Value) -> Self {
        self.body = Body::Json(payload);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = Body::Text(text.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct IncomingResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl IncomingResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            body,
        }
    }
}

/// Body of a failed exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    /// The error body was sealed and has been opened. `fields` holds the
    /// top-level members of `payload` when it is an object.
    Opened {
        payload: Value,
        fields: Map<String, Value>,
    },

    /// Passed through untouched.
    Plain(Body),
}

impl ErrorBody {
    pub fn opened(payload: Value) -> Self {
        let fields = match &payload {
            Value::Object(fields) => fields.clone(),
            _ => Map::new(),
        };
        ErrorBody::Opened { payload, fields }
    }
}

/// A 4xx/5xx response, with the original status preserved.
#[derive(Debug, Clone)]
pub struct StatusError {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: ErrorBody,
}

impl StatusError {
    /// Top-level field of the error payload, opened or plain JSON.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields()?.get(name)
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match &self.body {
            ErrorBody::Opened { fields, .. } => Some(fields),
            ErrorBody::Plain(Body::Json(Value::Object(fields))) => Some(fields),
            ErrorBody::Plain(_) => None,
        }
    }

    /// The opened payload, if the error body was sealed.
    pub fn payload(&self) -> Option<&Value> {
        match &self.body {
            ErrorBody::Opened { payload, .. } => Some(payload),
            ErrorBody::Plain(_) => None,
        }
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

pub struct Interceptor {
    manager: Arc<KeyManager>,
}

impl Interceptor {
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<KeyManager> {
        &self.manager
    }

    fn config(&self) -> &EnvelopeConfig {
        self.manager.config()
    }

    /// Whether payloads to `url` are sealed. The key endpoint never is.
    pub fn needs_encryption(&self, url: &str) -> bool {
        let config = self.config();
        if let Some(endpoint) = config.key_endpoint.as_deref() {
            if url.contains(endpoint) {
                return false;
            }
        }

        matcher::matches(url, &config.include_endpoints, &config.skip_endpoints)
    }

    pub async fn seal_request(&self, mut request: OutgoingRequest) -> Result<OutgoingRequest> {
        if !self.config().enabled || self.manager.state() == KeyState::Disabled {
            return Ok(request);
        }

        let applicable = match (&request.method, &request.body) {
            (method, Body::Json(_)) => carries_body(method),
            (method, Body::Empty) => *method == Method::GET,
            _ => false,
        };
        if !applicable {
            return Ok(request);
        }

        if !self.needs_encryption(&request.url) {
            return Ok(request);
        }

        let state = match self.manager.state() {
            KeyState::Uninitialized => KeyState::Uninitialized,
            state if state.is_settled() => state,
            _ => self.manager.wait_until_settled().await,
        };
        let active_key = match state {
            KeyState::Disabled => return Ok(request),
            KeyState::Ready => self
                .manager
                .active_key()
                .ok_or(Error::KeyUnavailable(state))?,
            _ => return Err(Error::KeyUnavailable(state)),
        };

        let config = self.config();
        let codec = EnvelopeCodec::new(active_key, config.padding);
        let (wrapped_key, wrapped_iv) = match &request.body {
            Body::Json(payload) => {
                let sealed = codec.seal(payload)?;
                request.body = Body::Text(sealed.ciphertext);
                request
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(SEALED_CONTENT_TYPE));
                (sealed.wrapped_key, sealed.wrapped_iv)
            }
            _ => {
                let material = codec.reply_material()?;
                (material.wrapped_key, material.wrapped_iv)
            }
        };

        set_header(&mut request.headers, &config.headers.wrapped_key, &wrapped_key)?;
        set_header(&mut request.headers, &config.headers.wrapped_iv, &wrapped_iv)?;

        if config.debug {
            info!("sealed {} {}", request.method, request.url);
        } else {
            debug!("sealed {} {}", request.method, request.url);
        }

        Ok(request)
    }

    /// Open the response if it carries key material. 4xx/5xx responses are
    /// returned as [`Error::Status`]; a body that fails to open is kept as
    /// it was received.
    pub fn open_response(&self, response: IncomingResponse) -> Result<IncomingResponse> {
        let opened = self.try_open(&response);
        let IncomingResponse {
            status,
            status_text,
            headers,
            body,
        } = response;

        if !(status.is_client_error() || status.is_server_error()) {
            let body = match opened {
                Some(payload) => Body::Json(payload),
                None => body,
            };
            return Ok(IncomingResponse {
                status,
                status_text,
                headers,
                body,
            });
        }

        let body = match opened {
            Some(payload) => ErrorBody::opened(payload),
            None => ErrorBody::Plain(body),
        };
        Err(Error::Status(Box::new(StatusError {
            status,
            status_text,
            headers,
            body,
        })))
    }

    fn try_open(&self, response: &IncomingResponse) -> Option<Value> {
        if !self.config().enabled || self.manager.state() == KeyState::Disabled {
            return None;
        }

        let text = match &response.body {
            Body::Text(text) => text.as_str(),
            Body::Json(Value::String(text)) => text.as_str(),
            _ => return None,
        };

        let names = &self.config().headers;
        let key = response.headers.lookup(&names.wrapped_key);
        let iv = response.headers.lookup(&names.wrapped_iv);
        match envelope::open(text, key, iv) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("keep {} response body unopened: {e}", response.status);
                None
            }
        }
    }
}
