// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! APIs for symmetric keys

use anyhow::Result;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::rand::random_bytes;
use crate::rust::*;

pub const AES_GCM_256_KEY_BITS: u32 = 256;

pub const AES_GCM_256_KEY_LENGTH: usize = (AES_GCM_256_KEY_BITS / 8) as usize;

pub const AES_GCM_256_IV_LENGTH: usize = 12;

/// Supported WrapType, s.t. encryption algorithm used to seal envelope
/// payloads.
#[derive(EnumString, AsRefStr, Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
pub enum WrapType {
    /// The serialized name follows 5.2.6 section
    /// <https://www.rfc-editor.org/rfc/inline-errata/rfc7518.html>
    #[strum(serialize = "A256GCM")]
    #[serde(rename = "A256GCM")]
    Aes256Gcm,
}

/// Fresh random key material for a single exchange.
pub fn generate_key(wrap_type: WrapType) -> Zeroizing<Vec<u8>> {
    match wrap_type {
        WrapType::Aes256Gcm => Zeroizing::new(random_bytes::<AES_GCM_256_KEY_LENGTH>()),
    }
}

/// Fresh random IV for a single exchange.
pub fn generate_iv(wrap_type: WrapType) -> Vec<u8> {
    match wrap_type {
        WrapType::Aes256Gcm => random_bytes::<AES_GCM_256_IV_LENGTH>(),
    }
}

/// Decrypt the given `ciphertext`.
/// Note:
/// - IV length for A256GCM: 12 bytes
pub fn decrypt(
    key: Zeroizing<Vec<u8>>,
    ciphertext: Vec<u8>,
    iv: Vec<u8>,
    wrap_type: WrapType,
) -> Result<Vec<u8>> {
    match wrap_type {
        WrapType::Aes256Gcm => aes256gcm::decrypt(&key, &ciphertext, &iv),
    }
}

/// Encrypt the given `plaintext`.
/// Note:
/// - IV length for A256GCM: 12 bytes
pub fn encrypt(
    key: Zeroizing<Vec<u8>>,
    plaintext: Vec<u8>,
    iv: Vec<u8>,
    wrap_type: WrapType,
) -> Result<Vec<u8>> {
    match wrap_type {
        WrapType::Aes256Gcm => aes256gcm::encrypt(&key, &plaintext, &iv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_material_per_call() {
        let first = generate_key(WrapType::Aes256Gcm);
        let second = generate_key(WrapType::Aes256Gcm);
        assert_eq!(first.len(), AES_GCM_256_KEY_LENGTH);
        assert_ne!(*first, *second);

        let iv = generate_iv(WrapType::Aes256Gcm);
        assert_eq!(iv.len(), AES_GCM_256_IV_LENGTH);
        assert_ne!(iv, generate_iv(WrapType::Aes256Gcm));
    }

    #[test]
    fn wrap_type_names() {
        assert_eq!(WrapType::Aes256Gcm.as_ref(), "A256GCM");
        assert_eq!("A256GCM".parse::<WrapType>().unwrap(), WrapType::Aes256Gcm);
    }
}
