// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # HTTP Envelope Encryption
//!
//! This crate transparently seals JSON payloads exchanged with a server that
//! holds an RSA private key.
//!
//! ## Protocol
//!
//! For every sealed request a fresh AES-256-GCM key and 12-byte IV are
//! generated. The JSON body, followed by `||` and a random alphanumeric
//! padding, is encrypted with them and sent base64 encoded as `text/plain`.
//! Key and IV are wrapped with the server's RSA-OAEP (SHA-256) public key and
//! travel in two headers. A `GET` carries the wrapped material only, so the
//! server can seal its answer.
//!
//! The server replies with the raw key and IV base64 encoded in the same
//! headers, and the body sealed the same way. Error responses keep their
//! status; their opened fields are reachable through [`pipeline::StatusError`].
//!
//! The public key is either configured verbatim or fetched from a key
//! endpoint, where it is returned in a response header. In both cases it is
//! pinned against a configured SHA-256 hash before it is trusted.
//!
//! ## Usage
//!
//! ```no_run
//! use http_envelope::{EnvelopeClientBuilder, EnvelopeConfig};
//! use serde_json::json;
//!
//! async fn exchange() {
//!     let config = EnvelopeConfig::new(None).unwrap();
//!     let client = EnvelopeClientBuilder::new(config).build().unwrap();
//!
//!     // fetch, pin and publish the public key
//!     client.initialize().await.unwrap();
//!
//!     let res = client
//!         .post_json("https://api.example.com/v1/transfer", &json!({"amount": 10}))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod builder;
pub mod cache;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod headers;
pub mod key_manager;
pub mod matcher;
pub mod pipeline;

pub use builder::EnvelopeClientBuilder;
pub use client::EnvelopeClient;
pub use config::EnvelopeConfig;
pub use error::{Error, Result};
pub use key_manager::{KeyManager, KeyState, Readiness};
pub use pipeline::{Body, IncomingResponse, Interceptor, OutgoingRequest};
