//! Provisioner client errors

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Extension key carrying the failure reason code
pub const EXTENSION_ERROR_REASON: &str = "error_reason";
/// Extension key carrying the component blamed for the failure
pub const EXTENSION_ERROR_COMPONENT: &str = "error_component";
/// Extension key carrying the provisioner step that failed
pub const EXTENSION_ERROR_STEP: &str = "error_step";

/// Errors that can occur when talking to the provisioner
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Provisioner returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// GraphQL error returned in the response envelope
    #[error("GraphQL error: {0}")]
    GraphQl(#[from] GraphQlError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response had neither data nor errors
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A single GraphQL error with its extensions
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl GraphQlError {
    /// Create an error with the given message and no extensions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a string extension
    #[must_use]
    pub fn with_extension(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extensions
            .insert(key.to_string(), serde_json::Value::String(value.into()));
        self
    }

    fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).and_then(serde_json::Value::as_str)
    }

    /// `error_reason` extension, if present
    pub fn reason(&self) -> Option<&str> {
        self.extension(EXTENSION_ERROR_REASON)
    }

    /// `error_component` extension, if present
    pub fn component(&self) -> Option<&str> {
        self.extension(EXTENSION_ERROR_COMPONENT)
    }

    /// `error_step` extension, if present
    pub fn step(&self) -> Option<&str> {
        self.extension(EXTENSION_ERROR_STEP)
    }
}

impl fmt::Display for GraphQlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GraphQlError {}
