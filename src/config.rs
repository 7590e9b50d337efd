//! Service endpoint and credential configuration.
//!
//! Everything the client needs to reach the service lives in an explicit
//! [`ServiceConfig`] passed to the constructor. There is no process-wide
//! mutable state.

use std::{env, fmt};

use crate::prelude::*;

/// Environment variable naming the service endpoint.
pub const ENDPOINT_VAR: &str = "DOCINTEL_ENDPOINT";

/// Environment variable naming the API key.
pub const KEY_VAR: &str = "DOCINTEL_KEY";

/// An opaque API credential.
///
/// The wrapped secret is only reachable through [`Credential::expose`], for
/// building the authentication header. It never appears in `Debug` output
/// and must never be logged.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for use in an authentication header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(***)")
    }
}

/// Configuration for talking to the document-analysis service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Base URL of the service, without a trailing slash. For example,
    /// `https://myresource.cognitiveservices.azure.com`.
    pub endpoint: String,

    /// The API key sent with every request.
    pub credential: Credential,
}

impl ServiceConfig {
    /// Build a configuration from explicit values, falling back to the
    /// `DOCINTEL_ENDPOINT` and `DOCINTEL_KEY` environment variables.
    pub fn from_env_or(
        endpoint: Option<String>,
        key: Option<String>,
    ) -> Result<ServiceConfig> {
        let endpoint = endpoint
            .or_else(|| env::var(ENDPOINT_VAR).ok())
            .ok_or_else(|| {
                anyhow!(
                    "no service endpoint configured (set {} or pass --endpoint)",
                    ENDPOINT_VAR
                )
            })?;
        let key = key.or_else(|| env::var(KEY_VAR).ok()).ok_or_else(|| {
            anyhow!("no API key configured (set {} or pass --key)", KEY_VAR)
        })?;
        Ok(ServiceConfig {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            credential: Credential::new(key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = ServiceConfig {
            endpoint: "https://example.test".to_owned(),
            credential: Credential::new("very-secret-key"),
        };
        let debugged = format!("{:?}", config);
        assert!(!debugged.contains("very-secret-key"));
        assert!(debugged.contains("Credential(***)"));
    }

    #[test]
    fn explicit_values_win_and_trailing_slashes_are_trimmed() {
        let config = ServiceConfig::from_env_or(
            Some("https://example.test/".to_owned()),
            Some("k".to_owned()),
        )
        .unwrap();
        assert_eq!(config.endpoint, "https://example.test");
        assert_eq!(config.credential.expose(), "k");
    }
}
