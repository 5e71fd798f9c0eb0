//! Typed error hierarchy for the order bridge.
//!
//! One enum per external boundary:
//! - `SourceError`: order platform API failures
//! - `LedgerError`: spreadsheet ledger reads and writes
//! - `StoreError`: relational shadow store
//! - `NotifyError`: chat webhook / bot delivery
//! - `ConfigError`: configuration loading

use thiserror::Error;

/// Response codes returned by the order platform, with their descriptions.
pub const SOURCE_RESPONSE_CODES: &[(i64, &str)] = &[
    (-1, "invalid API key or secret"),
    (-2, "invalid access token"),
    (-5, "permission denied"),
    (-6, "plan does not allow this call"),
    (-7, "request limit exceeded"),
    (-10, "invalid or missing parameters"),
    (-11, "requested data does not exist"),
    (-19, "internal processing error"),
    (-98, "unknown service"),
    (-99, "unknown method"),
    (-999, "service under maintenance"),
    (200, "success"),
];

/// Look up the description of an order platform response code.
pub fn describe_source_code(code: i64) -> &'static str {
    SOURCE_RESPONSE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, desc)| *desc)
        .unwrap_or("unknown response code")
}

/// Errors from the order platform API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Order API request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Order API returned code {code}: {description}")]
    Api { code: i64, description: &'static str },

    #[error("Order API rejected the access token (code {code})")]
    TokenExpired { code: i64 },

    #[error("Order API response could not be decoded: {0}")]
    Decode(String),
}

impl SourceError {
    /// Build the error for a non-success response code.
    pub fn from_code(code: i64, token_error_codes: &[i64]) -> Self {
        if token_error_codes.contains(&code) {
            SourceError::TokenExpired { code }
        } else {
            SourceError::Api {
                code,
                description: describe_source_code(code),
            }
        }
    }
}

/// Errors from the spreadsheet ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger request for {range} failed: {source}")]
    Transport {
        range: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Ledger returned HTTP {status} for {range}: {body}")]
    Status {
        range: String,
        status: u16,
        body: String,
    },

    #[error("Invalid ledger range: {0}")]
    InvalidRange(String),

    #[error("Ledger token refresh failed: {0}")]
    Auth(String),
}

/// Errors from the relational shadow store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Line number row is missing; run `orderbridge init` first")]
    LineNumberMissing,

    #[error("{kind} record {id} not found")]
    RecordNotFound { kind: &'static str, id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Errors from notification delivery.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid column '{column}' in range {range}: {message}")]
    InvalidColumn {
        range: String,
        column: String,
        message: String,
    },

    #[error("Invalid value {value} for {key}: {message}")]
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_known_and_unknown_codes() {
        assert_eq!(describe_source_code(-7), "request limit exceeded");
        assert_eq!(describe_source_code(200), "success");
        assert_eq!(describe_source_code(12345), "unknown response code");
    }

    #[test]
    fn token_codes_map_to_token_expired() {
        let err = SourceError::from_code(-2, &[-2]);
        assert!(matches!(err, SourceError::TokenExpired { code: -2 }));

        let err = SourceError::from_code(-999, &[-2]);
        match &err {
            SourceError::Api { code, description } => {
                assert_eq!(*code, -999);
                assert_eq!(*description, "service under maintenance");
            }
            _ => panic!("Expected Api variant"),
        }
        assert!(err.to_string().contains("-999"));
    }

    #[test]
    fn store_error_record_not_found_carries_id() {
        let err = StoreError::RecordNotFound {
            kind: "order",
            id: 42,
        };
        assert!(err.to_string().contains("order record 42"));
    }

    #[test]
    fn config_error_invalid_column_is_matchable() {
        let err = ConfigError::InvalidColumn {
            range: "order".into(),
            column: "1A".into(),
            message: "not a column letter".into(),
        };
        assert!(matches!(err, ConfigError::InvalidColumn { .. }));
        assert!(err.to_string().contains("1A"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&SourceError::Decode("x".into()));
        assert_std_error(&LedgerError::InvalidRange("x".into()));
        assert_std_error(&StoreError::LineNumberMissing);
        assert_std_error(&NotifyError::Rejected {
            status: 500,
            body: String::new(),
        });
    }
}
