// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Hybrid envelope codec
//!
//! Requests are sealed under a fresh AES-256-GCM key and 12 byte IV; both
//! are wrapped with RSA-OAEP under the active public key. The plaintext is
//! `<json>||<padding>` where the padding has a random length, so the
//! ciphertext length does not reveal the payload length.
//!
//! Responses carry the AES key and IV **unwrapped**, base64 encoded, in the
//! same two headers. The response leg relies on the transport being
//! confidential.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use crypto::{
    decrypt, encrypt, generate_iv, generate_key,
    rsa::{PaddingMode, RSAPublicKey},
    WrapType,
};
use log::debug;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::{config::PaddingRange, key_manager::ActiveKey, Error, Result};

/// Separates the serialized payload from the random padding.
pub const SEPARATOR: &str = "||";

pub const WRAP_TYPE: WrapType = WrapType::Aes256Gcm;

pub const KEY_WRAP_PADDING: PaddingMode = PaddingMode::OAEP;

/// A sealed request. The ciphertext becomes the request body, the wrapped
/// key and IV travel as headers. The short serialized names only obscure
/// the structure; they are not a security control.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SealedBody {
    #[serde(rename = "d")]
    pub ciphertext: String,

    #[serde(rename = "k")]
    pub wrapped_key: String,

    #[serde(rename = "i")]
    pub wrapped_iv: String,
}

/// Wrapped key material sent with a bodyless request, telling the server
/// which key to seal its reply with.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMaterial {
    pub wrapped_key: String,
    pub wrapped_iv: String,
}

pub struct EnvelopeCodec {
    key: Arc<ActiveKey>,
    padding: PaddingRange,
}

impl EnvelopeCodec {
    pub fn new(key: Arc<ActiveKey>, padding: PaddingRange) -> Self {
        Self { key, padding }
    }

    /// Seal `payload` under fresh key material.
    pub fn seal(&self, payload: &Value) -> Result<SealedBody> {
        self.seal_with(payload, generate_key(WRAP_TYPE), generate_iv(WRAP_TYPE))
    }

    /// Seal `payload` under the given key material. The caller must never
    /// reuse a key and IV pair for a second plaintext.
    pub fn seal_with(
        &self,
        payload: &Value,
        key: Zeroizing<Vec<u8>>,
        iv: Vec<u8>,
    ) -> Result<SealedBody> {
        let ciphertext = encrypt_padded(payload, key.clone(), iv.clone(), self.padding)?;
        let (wrapped_key, wrapped_iv) = self.wrap(&key, &iv)?;

        Ok(SealedBody {
            ciphertext,
            wrapped_key,
            wrapped_iv,
        })
    }

    /// Header-only variant: fresh wrapped key material, no body.
    pub fn reply_material(&self) -> Result<ReplyMaterial> {
        let key = generate_key(WRAP_TYPE);
        let iv = generate_iv(WRAP_TYPE);
        let (wrapped_key, wrapped_iv) = self.wrap(&key, &iv)?;

        Ok(ReplyMaterial {
            wrapped_key,
            wrapped_iv,
        })
    }

    fn wrap(&self, key: &[u8], iv: &[u8]) -> Result<(String, String)> {
        let public_key: &RSAPublicKey = self.key.public_key();
        let wrapped_key = public_key
            .encrypt(KEY_WRAP_PADDING, key)
            .map_err(|e| Error::Encryption(format!("wrap key: {e:#}")))?;
        let wrapped_iv = public_key
            .encrypt(KEY_WRAP_PADDING, iv)
            .map_err(|e| Error::Encryption(format!("wrap iv: {e:#}")))?;

        Ok((STANDARD.encode(wrapped_key), STANDARD.encode(wrapped_iv)))
    }
}

/// Seal a reply under raw key material, i.e. the server half of the
/// protocol. Returns the base64 body.
pub fn seal_reply(payload: &Value, key: &[u8], iv: &[u8], padding: PaddingRange) -> Result<String> {
    encrypt_padded(payload, Zeroizing::new(key.to_vec()), iv.to_vec(), padding)
}

fn encrypt_padded(
    payload: &Value,
    key: Zeroizing<Vec<u8>>,
    iv: Vec<u8>,
    padding: PaddingRange,
) -> Result<String> {
    let serialized = serde_json::to_string(payload)
        .map_err(|e| Error::Encryption(format!("serialize payload: {e}")))?;
    let padding = random_padding(padding);
    debug!(
        "seal payload of {} bytes with {} bytes of padding",
        serialized.len(),
        padding.len()
    );

    let plaintext = Zeroizing::new(format!("{serialized}{SEPARATOR}{padding}").into_bytes());
    let ciphertext = encrypt(key, plaintext.to_vec(), iv, WRAP_TYPE)
        .map_err(|e| Error::Encryption(format!("{e:#}")))?;

    Ok(STANDARD.encode(ciphertext))
}

fn random_padding(range: PaddingRange) -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(range.min..=range.max.max(range.min));
    (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Open a sealed body with the raw base64 `key` and `iv` taken from the
/// response headers.
///
/// `Ok(None)` means the exchange was not encrypted: a header is missing or
/// the body is empty. Malformed base64, a failed authentication tag or a
/// missing separator are [`Error::Decryption`].
pub fn open(body: &str, key: Option<&str>, iv: Option<&str>) -> Result<Option<Value>> {
    let (Some(key), Some(iv)) = (key, iv) else {
        return Ok(None);
    };

    let body = unquote(body.trim());
    if body.is_empty() {
        return Ok(None);
    }

    let key = Zeroizing::new(decode_field("key", key)?);
    let iv = decode_field("iv", iv)?;
    let ciphertext = decode_field("body", body)?;

    let plaintext = decrypt(key, ciphertext, iv, WRAP_TYPE)
        .map_err(|e| Error::Decryption(format!("{e:#}")))?;
    let plaintext = Zeroizing::new(plaintext);
    let text = std::str::from_utf8(&plaintext)
        .map_err(|e| Error::Decryption(format!("plaintext is not utf-8: {e}")))?;

    let Some((payload, _padding)) = text.split_once(SEPARATOR) else {
        return Err(Error::Decryption("padding separator not found".into()));
    };

    let payload = serde_json::from_str(payload)
        .map_err(|e| Error::Decryption(format!("payload is not json: {e}")))?;
    Ok(Some(payload))
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| Error::Decryption(format!("{name} is not valid base64: {e}")))
}

/// Some servers serialize the ciphertext as a JSON string.
fn unquote(body: &str) -> &str {
    body.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(body)
}
