use crate::payments::error::PaymentError;
use std::fmt;

/// Database error classification
#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    /// Connection pool is exhausted
    PoolExhausted,
    /// Record not found
    NotFound,
    /// Query execution error
    QueryError { message: String },
    /// Database connection error
    ConnectionError { message: String },
    /// Unknown error
    Unknown { message: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub is_retryable: bool,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        let is_retryable = matches!(
            kind,
            DatabaseErrorKind::PoolExhausted | DatabaseErrorKind::ConnectionError { .. }
        );
        Self { kind, is_retryable }
    }

    /// Map SQLx error to our custom error type
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound),
            sqlx::Error::PoolTimedOut => Self::new(DatabaseErrorKind::PoolExhausted),
            sqlx::Error::PoolClosed => Self::new(DatabaseErrorKind::ConnectionError {
                message: "Connection pool is closed".to_string(),
            }),
            sqlx::Error::Database(db_err) => Self::new(DatabaseErrorKind::QueryError {
                message: db_err.message().to_string(),
            }),
            sqlx::Error::Io(io_err) => Self::new(DatabaseErrorKind::ConnectionError {
                message: io_err.to_string(),
            }),
            other => Self::new(DatabaseErrorKind::Unknown {
                message: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::PoolExhausted => {
                write!(f, "Database connection pool exhausted")
            }
            DatabaseErrorKind::NotFound => write!(f, "Record not found"),
            DatabaseErrorKind::QueryError { message } => {
                write!(f, "Database query failed: {}", message)
            }
            DatabaseErrorKind::ConnectionError { message } => {
                write!(f, "Database connection error: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => write!(f, "Database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<DatabaseError> for PaymentError {
    fn from(err: DatabaseError) -> Self {
        PaymentError::ProviderError {
            provider: "audit_log".to_string(),
            message: err.to_string(),
        }
    }
}
