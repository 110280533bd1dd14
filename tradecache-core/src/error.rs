//! Error types for tradecache operations

use crate::ResourceType;
use thiserror::Error;

/// Store access errors, classified by whether a retry can help.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection setup failed: {reason}")]
    ConnectionSetup { reason: String },

    #[error("Transient store failure during {operation}: {reason}")]
    Transient { operation: String, reason: String },

    #[error("Store rejected {operation}: {reason}")]
    Operation { operation: String, reason: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<StoreError>,
    },
}

impl StoreError {
    /// Build a transient error for the named operation.
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Build a non-retryable rejection for the named operation.
    pub fn operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the failure may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Key schema misuse. These indicate a programming error upstream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Missing required parameter '{field}' for {resource_type}")]
    MissingParameter {
        resource_type: ResourceType,
        field: String,
    },

    #[error("Unknown resource type: {name}")]
    UnknownResourceType { name: String },
}

/// Model codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported type for encoding: {reason}")]
    UnsupportedType { reason: String },

    #[error("Failed to decode {record_type}: {reason}")]
    Decode { record_type: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Record validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all tradecache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TradeCacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Result type alias for tradecache operations.
pub type TradeCacheResult<T> = Result<T, TradeCacheError>;

// =============================================================================
// TESTS
// =============================================================================
