//! Unified application error model and mapping helpers.
//! Every failure a request can hit is one of these variants; the HTTP layer maps
//! them to a status plus a small JSON body and never swallows them.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    AlreadyExists { code: String, message: String },
    NotFound { code: String, message: String },
    DestinationMissing { code: String, message: String },
    MissingFile { code: String, message: String },
    MissingDestination { code: String, message: String },
    NotAllowed { code: String, message: String },
    Unauthenticated { code: String, message: String },
    MalformedRequest { code: String, message: String },
    /// A state document could not be written. In-memory state is left untouched.
    Persist { code: String, message: String },
    Io { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::AlreadyExists { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::DestinationMissing { code, .. }
            | AppError::MissingFile { code, .. }
            | AppError::MissingDestination { code, .. }
            | AppError::NotAllowed { code, .. }
            | AppError::Unauthenticated { code, .. }
            | AppError::MalformedRequest { code, .. }
            | AppError::Persist { code, .. }
            | AppError::Io { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::AlreadyExists { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::DestinationMissing { message, .. }
            | AppError::MissingFile { message, .. }
            | AppError::MissingDestination { message, .. }
            | AppError::NotAllowed { message, .. }
            | AppError::Unauthenticated { message, .. }
            | AppError::MalformedRequest { message, .. }
            | AppError::Persist { message, .. }
            | AppError::Io { message, .. } => message.as_str(),
        }
    }

    pub fn already_exists(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::AlreadyExists { code: code.into(), message: msg.into() } }
    pub fn not_found(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn destination_missing(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::DestinationMissing { code: code.into(), message: msg.into() } }
    pub fn missing_file(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::MissingFile { code: code.into(), message: msg.into() } }
    pub fn missing_destination(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::MissingDestination { code: code.into(), message: msg.into() } }
    pub fn not_allowed(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::NotAllowed { code: code.into(), message: msg.into() } }
    pub fn unauthenticated(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn malformed(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::MalformedRequest { code: code.into(), message: msg.into() } }
    pub fn persist(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Persist { code: code.into(), message: msg.into() } }
    pub fn io(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Io { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::AlreadyExists { .. } => 409,
            AppError::NotFound { .. } => 404,
            AppError::DestinationMissing { .. } => 409,
            AppError::MissingFile { .. } => 409,
            AppError::MissingDestination { .. } => 400,
            AppError::NotAllowed { .. } => 400,
            AppError::Unauthenticated { .. } => 401,
            AppError::MalformedRequest { .. } => 400,
            AppError::Persist { .. } => 500,
            AppError::Io { .. } => 500,
        }
    }

    /// True for the conditions that abort a request server-side rather than
    /// reporting a client-visible precondition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Persist { .. } | AppError::Io { .. })
    }

    /// JSON body shape used by the HTTP layer.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.http_status(),
            "code": self.code_str(),
            "error": self.message(),
        })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io { code: "io_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
