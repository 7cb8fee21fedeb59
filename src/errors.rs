use http::StatusCode;
use rust_decimal::Decimal;
use sea_orm::error::{DbErr, SqlErr};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Incompatible units: cannot convert {from} to {to}")]
    IncompatibleUnits { from: String, to: String },

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Batch {stock_batch_id} is already registered to recall {recall_id}")]
    DuplicateBatch { recall_id: Uuid, stock_batch_id: Uuid },

    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    #[error("Negative balance: recovered {recovered} exceeds affected {affected}")]
    NegativeBalance { affected: Decimal, recovered: Decimal },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Wraps a sea-orm error; used with `map_err`.
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// Shorthand for an illegal state-machine move.
    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        ServiceError::InvalidTransition {
            entity: entity.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// True when the error is the "referenced entity missing" kind.
    ///
    /// Traversal treats this as a dead end rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    /// True when a database error was raised by a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ServiceError::DatabaseError(err) => {
                matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
            }
            _ => false,
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::IncompatibleUnits { .. } => "incompatible_units",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::DuplicateBatch { .. } => "duplicate_batch",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NegativeBalance { .. } => "negative_balance",
            Self::ValidationError(_) => "validation_error",
            Self::ConcurrentModification(_) => "concurrent_modification",
        }
    }

    /// Returns the HTTP status code an API layer should answer with.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::IncompatibleUnits { .. } => StatusCode::BAD_REQUEST,
            Self::DuplicateBatch { .. } | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::InvalidTransition { .. }
            | Self::InsufficientStock(_)
            | Self::NegativeBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for external callers.
    /// Database errors return a generic message so driver details stay internal.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Concurrent modification for ID {}", id)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::IncompatibleUnits {
                from: "kg".into(),
                to: "ml".into()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::DuplicateBatch {
                recall_id: Uuid::nil(),
                stock_batch_id: Uuid::nil()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::invalid_transition("recall", "closed", "active").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::db_error(DbErr::Custom("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::db_error(DbErr::Custom("connection reset".into())).response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::NotFound("Stock batch abc".into()).response_message(),
            "Not found: Stock batch abc"
        );
    }

    #[test]
    fn negative_balance_message_names_both_figures() {
        let err = ServiceError::NegativeBalance {
            affected: dec!(10),
            recovered: dec!(12),
        };
        assert_eq!(err.kind(), "negative_balance");
        assert_eq!(
            err.to_string(),
            "Negative balance: recovered 12 exceeds affected 10"
        );
    }

    #[test]
    fn not_found_is_detected() {
        assert!(ServiceError::NotFound("x".into()).is_not_found());
        assert!(!ServiceError::ValidationError("x".into()).is_not_found());
        assert!(!ServiceError::ValidationError("x".into()).is_unique_violation());
    }
}
