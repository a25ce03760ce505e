// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Crypto
//!
//! This crate encapsulates the primitive crypto operations used by the
//! hybrid request envelope. It never implements a primitive itself: every
//! operation delegates to the RustCrypto crates.
//!
//! ## Components
//!
//! This crate include the following public submodules:
//! - `symmetric`: AES-256-GCM en/decryption and key material generation
//! - `rsa`: RSA public key import and key wrapping
//! - `HashAlgorithm`: digests used for public key pinning

#[macro_use]
extern crate strum;

mod rust;

mod symmetric;
pub use symmetric::*;

mod asymmetric;
pub use asymmetric::*;

mod algorithms;
pub use algorithms::*;

pub mod rand;
