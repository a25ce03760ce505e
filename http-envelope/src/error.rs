// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

use crate::{key_manager::KeyState, pipeline::StatusError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid envelope configuration: {0}")]
    Config(String),

    #[error("fetch public key from {endpoint} failed after {attempts} attempt(s): {reason}")]
    FetchFailed {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    #[error(
        "public key header `{header}` not found in key endpoint response (observed headers: [{}]); \
         check that the endpoint exposes the header to this client",
        .observed.join(", ")
    )]
    MissingKeyHeader {
        header: String,
        observed: Vec<String>,
    },

    #[error("public key hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    #[error("no pinned public key hash configured; refusing to trust key with hash {computed}")]
    UnpinnedKey { computed: String },

    #[error("import public key failed: {0}")]
    InvalidPublicKey(String),

    #[error("seal request body failed: {0}")]
    Encryption(String),

    #[error("open sealed body failed: {0}")]
    Decryption(String),

    #[error("no trusted public key available (key lifecycle state: {0})")]
    KeyUnavailable(KeyState),

    #[error("envelope key lifecycle failed earlier: {0}")]
    InitializationFailed(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("serialize request body failed: {0}")]
    SerializeBody(String),

    #[error("http request failed: {0}")]
    HttpError(String),

    #[error("request failed with status {} {}", .0.status.as_u16(), .0.status_text)]
    Status(Box<StatusError>),
}

impl Error {
    /// Whether this error belongs to the key trust checks, i.e. the key
    /// itself must not be used.
    pub fn is_trust_error(&self) -> bool {
        matches!(
            self,
            Error::HashMismatch { .. } | Error::UnpinnedKey { .. } | Error::InvalidPublicKey(_)
        )
    }
}
