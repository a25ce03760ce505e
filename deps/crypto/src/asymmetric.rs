// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

pub mod rsa {
    pub use crate::rust::rsa::*;

    /// Definations of different Padding mode for encryption. Refer to
    /// <https://datatracker.ietf.org/doc/html/rfc7518#section-4.1> for
    /// more information.
    #[derive(EnumString, AsRefStr, Clone, Copy, Debug, PartialEq)]
    pub enum PaddingMode {
        #[strum(serialize = "RSA-OAEP")]
        OAEP,

        #[strum(serialize = "RSA1_5")]
        PKCS1v15,
    }

    pub const RSA_PUBKEY_LENGTH: usize = 2048;
}
