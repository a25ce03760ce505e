// Copyright (c) 2024 The HTTP Envelope Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Endpoint pattern matching.
//!
//! A pattern is one of:
//! - `*`, matching every url;
//! - `prefix/*`, matching any url that contains `prefix`;
//! - a template with one or more `{ignore}` placeholders, each standing for
//!   a single non-empty path segment;
//! - anything else, matching any url that contains it literally.
//!
//! Every shape is a containment test, never a full-string match, so a
//! pattern also matches urls carrying a host, extra segments or a query.

use log::warn;
use regex::Regex;

pub const WILDCARD: &str = "*";

pub const GLOB_SUFFIX: &str = "/*";

pub const PLACEHOLDER: &str = "{ignore}";

const SEGMENT: &str = "[^/]+";

/// Decide whether `url` should be encrypted. A matching skip pattern wins
/// over any include pattern.
pub fn matches<I, S>(url: &str, include_patterns: I, skip_patterns: S) -> bool
where
    I: IntoIterator,
    I::Item: AsRef<str>,
    S: IntoIterator,
    S::Item: AsRef<str>,
{
    if skip_patterns
        .into_iter()
        .any(|pattern| pattern_matches(url, pattern.as_ref()))
    {
        return false;
    }

    include_patterns
        .into_iter()
        .any(|pattern| pattern_matches(url, pattern.as_ref()))
}

/// Test a single pattern against `url`.
pub fn pattern_matches(url: &str, pattern: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(GLOB_SUFFIX) {
        return url.contains(prefix);
    }

    if pattern.contains(PLACEHOLDER) {
        return match template_regex(pattern) {
            Ok(regex) => regex.is_match(url),
            Err(e) => {
                warn!("ignore endpoint pattern `{pattern}`: {e}");
                false
            }
        };
    }

    url.contains(pattern)
}

fn template_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let source = pattern
        .split(PLACEHOLDER)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(SEGMENT);
    Regex::new(&source)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const NONE: [&str; 0] = [];

    #[rstest]
    #[case("*", "/anything", true)]
    #[case("*", "", true)]
    #[case("/v1/users", "https://api.example.com/v1/users?page=2", true)]
    #[case("/v1/users", "/v1/user", false)]
    #[case("/v1/public/*", "/v1/public/data", true)]
    #[case("/v1/public/*", "https://h/v1/public", true)]
    #[case("/v1/public/*", "/v1/private/data", false)]
    #[case("v1/{ignore}/users", "v1/MT1/users", true)]
    #[case("v1/{ignore}/users", "v1/MT2/users", true)]
    #[case("v1/{ignore}/users", "https://h/api/v1/MT2/users/7", true)]
    #[case("v1/{ignore}/users", "v1/users", false)]
    #[case("v1/{ignore}/users", "v1/a/b/users", false)]
    #[case("v1/{ignore}/orders/{ignore}", "v1/t1/orders/42", true)]
    #[case("v1/{ignore}/orders/{ignore}", "v1/t1/orders/", false)]
    #[case("v1.{ignore}/x", "v1.a/x", true)]
    #[case("v1.{ignore}/x", "v1Za/x", false)]
    fn single_pattern(#[case] pattern: &str, #[case] url: &str, #[case] expected: bool) {
        assert_eq!(matches(url, [pattern], NONE), expected);
    }

    #[rstest]
    #[case("/v1/public/data", false)]
    #[case("/v1/private/data", true)]
    fn skip_wins(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(matches(url, ["*"], ["/v1/public/*"]), expected);
    }

    #[test]
    fn skip_without_include_match() {
        assert!(!matches("/v1/public/data", ["/v1/private"], ["/v1/public"]));
    }

    #[test]
    fn empty_include_never_matches() {
        assert!(!matches("/v1/users", NONE, NONE));
        let include: Vec<String> = Vec::new();
        let skip: Vec<String> = Vec::new();
        assert!(!matches("/v1/users", &include, &skip));
    }
}
