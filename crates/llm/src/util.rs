//! Shared helpers for provider adapters.

use cw_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type. Timeout
/// errors map to `Error::Timeout`; everything else to `Error::Http`.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve an API key from a named environment variable.
pub fn resolve_api_key(env_var: &str) -> Result<String, Error> {
    std::env::var(env_var)
        .map_err(|_| Error::Auth(format!("environment variable '{env_var}' not set")))
}
