// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Case-insensitive header access.
//!
//! Header names in this crate come from configuration, and transports do
//! not agree on casing, so every lookup goes through [`HeaderLookup`]
//! instead of indexing a map with a literal.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::{Error, Result};

pub trait HeaderLookup {
    /// Value of the header `name`, compared case-insensitively. Values
    /// that are not visible ASCII are treated as absent.
    fn lookup(&self, name: &str) -> Option<&str>;

    /// Every distinct header name present, in lowercase.
    fn observed_names(&self) -> Vec<String>;
}

impl HeaderLookup for HeaderMap {
    fn lookup(&self, name: &str) -> Option<&str> {
        let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
        self.get(name)?.to_str().ok()
    }

    fn observed_names(&self) -> Vec<String> {
        self.keys().map(|name| name.as_str().to_owned()).collect()
    }
}

/// Insert (replacing) a header whose name is only known at runtime.
pub fn set_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::InvalidHeader(format!("name `{name}`: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidHeader(format!("value of `{name}`: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("X-Client-Init")]
    #[case("x-client-init")]
    #[case("X-CLIENT-INIT")]
    fn lookup_ignores_case(#[case] name: &str) {
        let mut headers = HeaderMap::new();
        set_header(&mut headers, "X-Client-Init", "pem").unwrap();
        assert_eq!(headers.lookup(name), Some("pem"));
    }

    #[test]
    fn lookup_missing_or_invalid_name() {
        let headers = HeaderMap::new();
        assert_eq!(headers.lookup("X-Client-Init"), None);
        assert_eq!(headers.lookup("not a header"), None);
    }

    #[test]
    fn observed_names_are_lowercase() {
        let mut headers = HeaderMap::new();
        set_header(&mut headers, "Content-Type", "text/plain").unwrap();
        set_header(&mut headers, "X-Other", "1").unwrap();
        let mut names = headers.observed_names();
        names.sort();
        assert_eq!(names, vec!["content-type", "x-other"]);
    }

    #[rstest]
    #[case("bad name", "value")]
    #[case("X-Good", "bad\nvalue")]
    fn reject_invalid(#[case] name: &str, #[case] value: &str) {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            set_header(&mut headers, name, value),
            Err(Error::InvalidHeader(_))
        ));
    }
}
