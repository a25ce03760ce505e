// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! RSA key handles used to wrap and unwrap per-exchange AES material

use anyhow::*;
use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::{
    pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey},
    pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding},
    Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
};

use crate::rsa::{PaddingMode, RSA_PUBKEY_LENGTH};

const PEM_BOUNDARY: &str = "-----";

/// An imported RSA public key. This is the only key material the client
/// side of the envelope protocol ever holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RSAPublicKey {
    public_key: RsaPublicKey,
}

impl RSAPublicKey {
    /// Import a PEM encoded public key. Both SPKI (`BEGIN PUBLIC KEY`) and
    /// PKCS#1 (`BEGIN RSA PUBLIC KEY`) encodings are accepted.
    ///
    /// PEM text that travelled inside an HTTP header is often flattened to a
    /// single line or carries literal `\n` sequences, so only the base64
    /// body between the armor lines is interpreted.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let body = pem_body(pem);
        if body.is_empty() {
            bail!("PEM text does not contain any key material");
        }

        let der = STANDARD
            .decode(body)
            .context("PEM body is not valid base64")?;

        let public_key = RsaPublicKey::from_public_key_der(&der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
            .map_err(|e| anyhow!("not an RSA public key (SPKI nor PKCS#1): {e}"))?;

        Ok(Self { public_key })
    }

    pub fn encrypt(&self, mode: PaddingMode, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();
        match mode {
            PaddingMode::OAEP => self
                .public_key
                .encrypt(&mut rng, Oaep::new::<sha2::Sha256>(), plaintext)
                .map_err(|e| anyhow!("RSA key encrypt OAEP failed: {:?}", e)),
            PaddingMode::PKCS1v15 => self
                .public_key
                .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)
                .map_err(|e| anyhow!("RSA key pkcs1v15 encrypt failed: {:?}", e)),
        }
    }

    pub fn to_pkcs1_pem(&self) -> Result<String> {
        let res = self.public_key.to_pkcs1_pem(LineEnding::LF)?;
        Ok(res)
    }
}

/// Strip the armor lines and every whitespace or escaped newline.
fn pem_body(pem: &str) -> String {
    let mut body = String::with_capacity(pem.len());
    let mut rest = pem;
    while let Some(start) = rest.find(PEM_BOUNDARY) {
        body.push_str(&rest[..start]);
        let label = &rest[start + PEM_BOUNDARY.len()..];
        match label.find(PEM_BOUNDARY) {
            Some(end) => rest = &label[end + PEM_BOUNDARY.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    body.push_str(rest);

    body.replace("\\n", "")
        .replace("\\r", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

#[derive(Debug, Clone)]
pub struct RSAKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl RSAKeyPair {
    pub fn new() -> Result<RSAKeyPair> {
        Self::with_bits(RSA_PUBKEY_LENGTH)
    }

    pub fn with_bits(bits: usize) -> Result<RSAKeyPair> {
        let mut rng = rand::thread_rng();

        let private_key = RsaPrivateKey::new(&mut rng, bits)?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(RSAKeyPair {
            private_key,
            public_key,
        })
    }

    pub fn decrypt(&self, mode: PaddingMode, cipher_text: &[u8]) -> Result<Vec<u8>> {
        match mode {
            PaddingMode::OAEP => self
                .private_key
                .decrypt(Oaep::new::<sha2::Sha256>(), cipher_text)
                .map_err(|e| anyhow!("RSA key decrypt OAEP failed: {:?}", e)),
            PaddingMode::PKCS1v15 => self
                .private_key
                .decrypt(Pkcs1v15Encrypt, cipher_text)
                .map_err(|e| anyhow!("RSA key pkcs1v15 decrypt failed: {:?}", e)),
        }
    }

    pub fn public_key(&self) -> RSAPublicKey {
        RSAPublicKey {
            public_key: self.public_key.clone(),
        }
    }

    /// Export the public half as SPKI PEM, the encoding peers exchange.
    pub fn public_key_pem(&self) -> Result<String> {
        let res = self.public_key.to_public_key_pem(LineEnding::LF)?;
        Ok(res)
    }
}
