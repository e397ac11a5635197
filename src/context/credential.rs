use axum::http::{header::AUTHORIZATION, HeaderMap};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*bearer\s+([A-Za-z0-9\-._~+/]+=*)\s*$").expect("bearer pattern is valid")
});

/// Bearer token presented by the caller.
///
/// The token is never printed by `Debug` so it cannot end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Extracts the bearer token from the `Authorization` header.
///
/// A missing header, a non-UTF-8 value or a value that does not match
/// `Bearer <token>` all mean an anonymous caller and yield `None`.
#[must_use]
pub fn extract_credential(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    parse_bearer(value)
}

fn parse_bearer(value: &str) -> Option<Credential> {
    BEARER
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map(|token| Credential(token.as_str().to_string()))
}
