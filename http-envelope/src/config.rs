// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{env, path::Path};

use anyhow::{bail, Context};
use config::{Config, File};
use log::{debug, info};
use serde::Deserialize;

use crate::{Error, Result};

/// Env variable consulted when no explicit config path is given.
pub const CONFIG_PATH_ENV: &str = "HTTP_ENVELOPE_CONFIG_PATH";

pub const DEFAULT_PUBLIC_KEY_HEADER: &str = "X-Client-Init";
pub const DEFAULT_WRAPPED_KEY_HEADER: &str = "X-Request-Context";
pub const DEFAULT_WRAPPED_IV_HEADER: &str = "X-Client-Ref";

pub const DEFAULT_FETCH_RETRIES: u32 = 3;
pub const DEFAULT_PADDING_MIN: usize = 16;
pub const DEFAULT_PADDING_MAX: usize = 256;
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 60;

fn default_true() -> bool {
    true
}

fn default_fetch_retries() -> u32 {
    DEFAULT_FETCH_RETRIES
}

fn default_request_timeout_sec() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SEC
}

/// Names of the three headers the protocol uses.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct HeaderNames {
    /// Response header of the key endpoint that carries the PEM.
    pub public_key: String,

    /// Wrapped (request) or raw (response) AES key.
    pub wrapped_key: String,

    /// Wrapped (request) or raw (response) AES-GCM IV.
    pub wrapped_iv: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            public_key: DEFAULT_PUBLIC_KEY_HEADER.into(),
            wrapped_key: DEFAULT_WRAPPED_KEY_HEADER.into(),
            wrapped_iv: DEFAULT_WRAPPED_IV_HEADER.into(),
        }
    }
}

/// Inclusive byte range of the random padding appended to sealed payloads.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct PaddingRange {
    pub min: usize,
    pub max: usize,
}

impl Default for PaddingRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_PADDING_MIN,
            max: DEFAULT_PADDING_MAX,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct EnvelopeConfig {
    /// Master switch. When false every exchange passes through untouched.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// PEM supplied verbatim. Takes precedence over `key_endpoint`.
    #[serde(default)]
    pub public_key_pem: Option<String>,

    #[serde(default)]
    pub key_endpoint: Option<String>,

    /// Expected lowercase hex SHA-256 of the PEM text.
    #[serde(default)]
    pub public_key_hash: Option<String>,

    #[serde(default)]
    pub include_endpoints: Vec<String>,

    #[serde(default)]
    pub skip_endpoints: Vec<String>,

    #[serde(default)]
    pub headers: HeaderNames,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    #[serde(default)]
    pub padding: PaddingRange,

    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            public_key_pem: None,
            key_endpoint: None,
            public_key_hash: None,
            include_endpoints: Vec::new(),
            skip_endpoints: Vec::new(),
            headers: HeaderNames::default(),
            debug: false,
            fetch_retries: DEFAULT_FETCH_RETRIES,
            padding: PaddingRange::default(),
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
        }
    }
}

impl EnvelopeConfig {
    pub fn new(config_path: Option<String>) -> anyhow::Result<Self> {
        let config_path = config_path.or_else(|| {
            if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
                debug!("Read envelope config path from env: {env_path}");
                return Some(env_path);
            }
            None
        });

        match config_path {
            Some(path) => {
                info!("Use configuration file {path}");
                if !Path::new(&path).exists() {
                    bail!("Config file {path} not found.")
                }

                Self::from_file(&path)
            }
            None => {
                info!("No config path specified, use a default config.");
                Ok(Self::default())
            }
        }
    }

    /// Load `EnvelopeConfig` from a configuration file. Supported formats are all formats supported by the
    /// `config` crate.
    pub fn from_file(config_path: &str) -> anyhow::Result<Self> {
        let c = Config::builder()
            .add_source(File::with_name(config_path))
            .build()?;

        let res = c.try_deserialize().context("invalid config")?;
        Ok(res)
    }

    /// Reject configurations the key lifecycle could never settle with.
    /// A disabled configuration is always valid.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.public_key_pem.is_none() && self.key_endpoint.is_none() {
            return Err(Error::Config(
                "either `public_key_pem` or `key_endpoint` must be set".into(),
            ));
        }

        if self.fetch_retries == 0 {
            return Err(Error::Config("`fetch_retries` must be at least 1".into()));
        }

        if self.padding.min > self.padding.max {
            return Err(Error::Config(format!(
                "padding range {}..={} is empty",
                self.padding.min, self.padding.max
            )));
        }

        Ok(())
    }
}
