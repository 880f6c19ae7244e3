use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `corrwatch`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum CorrwatchError {
    #[error("FetchError: {0}")]
    Fetch(#[from] FetchError),

    #[error("PersistenceError: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("ConfigError: {0}")]
    Config(#[from] ConfigError),
}

/// Failure to obtain a usable quote from the upstream price API.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected content type: {0}")]
    ContentType(String),

    #[error("malformed quote payload: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Determine if retrying the same request on a later cycle may succeed.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        // Request URLs carry query parameters that must not reach logs
        let error = error.without_url();
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Malformed(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Failure of the sample store.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl PersistenceError {
    /// Determine if the store may accept the same operation on a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
                Self::Unavailable(error.to_string())
            }
            _ => Self::Storage(error.to_string()),
        }
    }
}

/// Invalid or missing configuration, reported once at start-up.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_is_transient() {
        struct TestCase {
            input: FetchError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: timeouts are retried on the next tick
                input: FetchError::Timeout("operation timed out".to_string()),
                expected: true,
            },
            TestCase {
                // TC1: connection failures are retried
                input: FetchError::Network("connection refused".to_string()),
                expected: true,
            },
            TestCase {
                // TC2: rate limiting is transient
                input: FetchError::Status {
                    status: 429,
                    body: "API limit reached".to_string(),
                },
                expected: true,
            },
            TestCase {
                // TC3: server side failure is transient
                input: FetchError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                },
                expected: true,
            },
            TestCase {
                // TC4: rejected credentials are not
                input: FetchError::Status {
                    status: 401,
                    body: "Invalid API key".to_string(),
                },
                expected: false,
            },
            TestCase {
                // TC5: unknown symbol answered with an all-zero quote
                input: FetchError::Malformed("current price 0 is not positive".to_string()),
                expected: false,
            },
            TestCase {
                // TC6: html error page instead of json
                input: FetchError::ContentType("text/html".to_string()),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_transient();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_persistence_error_from_rusqlite() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let error = PersistenceError::from(busy);
        assert!(matches!(error, PersistenceError::Unavailable(_)));
        assert!(error.is_transient());

        let other = PersistenceError::from(rusqlite::Error::InvalidQuery);
        assert!(matches!(other, PersistenceError::Storage(_)));
        assert!(!other.is_transient());
    }

    #[test]
    fn test_corrwatch_error_from() {
        let error = CorrwatchError::from(ConfigError::Missing("FINNHUB_API_KEY".to_string()));
        assert_eq!(
            error.to_string(),
            "ConfigError: missing required setting: FINNHUB_API_KEY"
        );
    }
}
