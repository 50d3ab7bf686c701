//! Shared Diesel error mapping for the repositories.
//!
//! Each port error enum exposes `connection` and `query` constructors; these
//! helpers translate pool and Diesel failures into whichever pair the caller
//! passes, logging the database detail at debug level only.

use tracing::debug;

use super::pool::PoolError;

/// Map pool errors into a repository-specific connection error constructor.
pub fn map_basic_pool_error<E, C>(error: PoolError, connection: C) -> E
where
    C: FnOnce(String) -> E,
{
    let message = match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    };
    connection(message)
}

/// Map Diesel errors into query/connection constructors.
///
/// Closed connections and serialization conflicts are reported as connection
/// errors so services answer 503 rather than 500.
pub fn map_basic_diesel_error<E, Q, C>(error: diesel::result::Error, query: Q, connection: C) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => query("record not found"),
        DieselError::QueryBuilderError(_) => query("database query error"),
        DieselError::DeserializationError(_) => query("stored row could not be decoded"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error")
        }
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            connection("database serialization conflict")
        }
        _ => query("database error"),
    }
}

/// Convert a stored row count into the port's `u64`.
pub fn row_count(rows: usize) -> u64 {
    u64::try_from(rows).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};
    use rstest::rstest;

    use super::*;
    use crate::domain::ports::LedgerRepositoryError;

    fn map(error: DieselError) -> LedgerRepositoryError {
        map_basic_diesel_error(
            error,
            LedgerRepositoryError::query,
            LedgerRepositoryError::connection,
        )
    }

    #[rstest]
    fn pool_errors_become_connection_errors() {
        let err: LedgerRepositoryError =
            map_basic_pool_error(PoolError::checkout("refused"), LedgerRepositoryError::connection);
        assert_eq!(err, LedgerRepositoryError::connection("refused"));
    }

    #[rstest]
    #[case(DieselError::NotFound, LedgerRepositoryError::query("record not found"))]
    #[case(
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, Box::new("gone".to_owned())),
        LedgerRepositoryError::connection("database connection error")
    )]
    #[case(
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, Box::new("retry".to_owned())),
        LedgerRepositoryError::connection("database serialization conflict")
    )]
    #[case(
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, Box::new("dup".to_owned())),
        LedgerRepositoryError::query("database error")
    )]
    fn diesel_errors_map_by_kind(#[case] error: DieselError, #[case] expected: LedgerRepositoryError) {
        assert_eq!(map(error), expected);
    }
}
