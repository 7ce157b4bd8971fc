use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the content services and page assembly.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid environment configuration.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A primary page subject does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Rejected form or query input.
    #[error("Invalid input: {}", join_field_errors(.errors))]
    Validation { errors: Vec<FieldError> },
}

/// Errors from the SQLite store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot open database: {message}")]
    Connection { message: String },

    #[error("Database query error: {message}")]
    Query { message: String },

    #[error("Schema migration error: {message}")]
    Migration { message: String },

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// A single field-level validation message reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{field} - {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        AppError::Validation { errors: vec![err] }
    }
}

impl AppError {
    /// Shorthand for a missing primary subject.
    pub fn not_found(kind: impl Into<String>, id: impl ToString) -> Self {
        AppError::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Whether this error should render as a "not found" page.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a service call.
pub type AppResult<T> = Result<T, AppError>;

/// Result of a storage call.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "bad flag".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid configuration: bad flag");

        let err = AppError::not_found("Patient", 7);
        assert_eq!(err.to_string(), "Patient not found: 7");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_validation_error_display() {
        let err = AppError::Validation {
            errors: vec![
                FieldError::new("sort", "Unknown sort key: height"),
                FieldError::new("features", "Select a valid choice"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Invalid input: sort - Unknown sort key: height; features - Select a valid choice"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot open database: failed to connect");

        let err = StorageError::Query {
            message: "syntax error".to_string(),
        };
        assert_eq!(err.to_string(), "Database query error: syntax error");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Schema migration error: version mismatch");
    }

    #[test]
    fn test_field_error_conversion_to_app_error() {
        let app_err: AppError = FieldError::new("study_session_id", "No session id").into();
        match app_err {
            AppError::Validation { errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "study_session_id");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::Query {
            message: "locked".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }
}
