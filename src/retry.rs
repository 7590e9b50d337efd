//! Support utilities for [`keen_retry`]'s retry API.

use keen_retry::RetryResult;
use reqwest::StatusCode;

use crate::lro::LroError;

/// Is this error a known transient error?
///
/// We only classify an error as transient once we understand it well enough
/// to expect a retry to help. Everything else is fatal, so we never spend an
/// exponential-backoff cycle on an error that cannot resolve.
pub trait IsKnownTransient {
    /// Is this error likely to be transient?
    fn is_known_transient(&self) -> bool;
}

impl IsKnownTransient for StatusCode {
    fn is_known_transient(&self) -> bool {
        *self == StatusCode::REQUEST_TIMEOUT
            || *self == StatusCode::TOO_MANY_REQUESTS
            || self.is_server_error()
    }
}

impl IsKnownTransient for reqwest::Error {
    fn is_known_transient(&self) -> bool {
        match self.status() {
            Some(status) => status.is_known_transient(),
            // No status means the failure happened below the HTTP layer
            // (DNS, connect, TLS, mid-body disconnect). `reqwest` doesn't
            // expose enough detail to pick these apart, so treat them all as
            // worth another attempt.
            None => true,
        }
    }
}

impl IsKnownTransient for LroError {
    fn is_known_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Convert a [`Result`] into a [`RetryResult`], classifying errors using
/// [`IsKnownTransient`].
pub trait IntoRetryResult<T, E> {
    /// Split `Err` values into `Transient` and `Fatal` retry outcomes.
    fn into_retry_result(self) -> RetryResult<(), (), T, E>;
}

impl<T, E> IntoRetryResult<T, E> for Result<T, E>
where
    E: IsKnownTransient,
{
    fn into_retry_result(self) -> RetryResult<(), (), T, E> {
        match self {
            Ok(output) => RetryResult::Ok {
                reported_input: (),
                output,
            },
            Err(error) if error.is_known_transient() => RetryResult::Transient {
                input: (),
                error,
            },
            Err(error) => RetryResult::Fatal { input: (), error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_errors_are_transient() {
        assert!(StatusCode::TOO_MANY_REQUESTS.is_known_transient());
        assert!(StatusCode::REQUEST_TIMEOUT.is_known_transient());
        assert!(StatusCode::INTERNAL_SERVER_ERROR.is_known_transient());
        assert!(StatusCode::SERVICE_UNAVAILABLE.is_known_transient());
    }

    #[test]
    fn client_errors_are_fatal() {
        assert!(!StatusCode::BAD_REQUEST.is_known_transient());
        assert!(!StatusCode::UNAUTHORIZED.is_known_transient());
        assert!(!StatusCode::NOT_FOUND.is_known_transient());
    }

    #[test]
    fn lro_errors_classify_by_retryability() {
        assert!(LroError::transport("connection reset", true).is_known_transient());
        assert!(!LroError::transport("400 Bad Request", false).is_known_transient());
        assert!(
            !LroError::InvalidOperation {
                id: "op-1".to_owned()
            }
            .is_known_transient()
        );
    }
}
