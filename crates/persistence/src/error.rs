//! Mapping of database errors onto the domain store error.

use domain::store::StoreError;

/// PostgreSQL `undefined_column`
const UNDEFINED_COLUMN: &str = "42703";

/// PostgreSQL `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

pub fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some(UNDEFINED_COLUMN) => return StoreError::UnknownColumn(db_err.message().to_string()),
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(db_err.message().to_string()),
            _ => {}
        }
    }
    tracing::error!(error = %err, "Database error");
    StoreError::Database(err.to_string())
}
