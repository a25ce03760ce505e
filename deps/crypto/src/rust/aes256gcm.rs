// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! This mod implements aes-256-gcm encryption & decryption.
use aes_gcm::{aead::Aead, Aes256Gcm, Key, KeyInit, Nonce};
use anyhow::*;

use crate::{AES_GCM_256_IV_LENGTH, AES_GCM_256_KEY_LENGTH};

fn check_material(key: &[u8], iv: &[u8]) -> Result<()> {
    if key.len() != AES_GCM_256_KEY_LENGTH {
        bail!(
            "aes-256-gcm key must be {AES_GCM_256_KEY_LENGTH} bytes, got {}",
            key.len()
        );
    }

    if iv.len() != AES_GCM_256_IV_LENGTH {
        bail!(
            "aes-256-gcm iv must be {AES_GCM_256_IV_LENGTH} bytes, got {}",
            iv.len()
        );
    }

    Ok(())
}

pub fn decrypt(key: &[u8], encrypted_data: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    check_material(key, iv)?;
    let decrypting_key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(decrypting_key);
    let nonce = Nonce::from_slice(iv);
    let plain_text = cipher
        .decrypt(nonce, encrypted_data)
        .map_err(|e| anyhow!("aes-256-gcm decrypt failed: {:?}", e))?;

    Ok(plain_text)
}

pub fn encrypt(key: &[u8], data: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    check_material(key, iv)?;
    let encrypting_key = Key::<Aes256Gcm>::from_slice(key);
    let cipher = Aes256Gcm::new(encrypting_key);
    let nonce = Nonce::from_slice(iv);
    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| anyhow!("aes-256-gcm encrypt failed: {:?}", e))?;

    Ok(ciphertext)
}
