//! Error types for the phpIPAM provider
//!
//! This module defines all error types used throughout the crate.

use crate::model::Kind;
use thiserror::Error;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the phpIPAM provider
#[derive(Error, Debug)]
pub enum Error {
    /// Lookup by id or unique field found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// A singular lookup matched zero or several entities
    #[error("Ambiguous result: {0}")]
    Ambiguous(String),

    /// No usable search criteria, or malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A custom field key that the remote schema does not declare
    #[error("Custom field {field} not found in schema for {kind}")]
    UnknownField {
        /// Entity kind the write targeted
        kind: Kind,
        /// Offending key
        field: String,
    },

    /// A custom field value that is neither a string nor null
    #[error("Custom field {field} holds a non-string value, which is not supported ({found})")]
    FieldType {
        /// Custom field key
        field: String,
        /// JSON rendering of the value that was found
        found: String,
    },

    /// A parent-scoped listing came back empty
    #[error("Empty scope: {0}")]
    EmptyScope(String),

    /// Error reported by the phpIPAM API envelope
    #[error("Error from API ({code}): {message}")]
    Api {
        /// Code field of the response envelope
        code: u16,
        /// Message field of the response envelope
        message: String,
    },

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an ambiguous result error
    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::Ambiguous(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an unknown custom field error
    pub fn unknown_field(kind: Kind, field: impl Into<String>) -> Self {
        Self::UnknownField {
            kind,
            field: field.into(),
        }
    }

    /// Create a custom field type error
    pub fn field_type(field: impl Into<String>, found: &serde_json::Value) -> Self {
        Self::FieldType {
            field: field.into(),
            found: found.to_string(),
        }
    }

    /// Create an empty scope error
    pub fn empty_scope(msg: impl Into<String>) -> Self {
        Self::EmptyScope(msg.into())
    }

    /// Create an API envelope error
    pub fn api(code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means the remote entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable snake_case name of the variant, for callers that branch on it
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Ambiguous(_) => "ambiguous",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnknownField { .. } => "unknown_field",
            Self::FieldType { .. } => "field_type",
            Self::EmptyScope(_) => "empty_scope",
            Self::Api { .. } => "api",
            Self::Authentication(_) => "authentication",
            Self::Http(_) => "http",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_message_names_kind_and_field() {
        let err = Error::unknown_field(Kind::Vlan, "Rack");
        assert_eq!(
            err.to_string(),
            "Custom field Rack not found in schema for vlans"
        );
    }

    #[test]
    fn test_field_type_renders_value() {
        let err = Error::field_type("count", &serde_json::json!(5));
        assert!(err.to_string().contains("count"));
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::not_found("x").is_not_found());
        assert!(!Error::ambiguous("x").is_not_found());
        assert!(!Error::api(404, "x").is_not_found());
    }

    #[test]
    fn test_kind_names_variant() {
        assert_eq!(Error::not_found("x").kind(), "not_found");
        assert_eq!(Error::unknown_field(Kind::Address, "colour").kind(), "unknown_field");
        assert_eq!(Error::field_type("n", &serde_json::json!(1)).kind(), "field_type");
        assert_eq!(Error::api(500, "boom").kind(), "api");
        assert_eq!(Error::from(anyhow::anyhow!("wrapped")).kind(), "other");
    }
}
