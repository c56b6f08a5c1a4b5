//! Shared Diesel error mapping for the SQLite adapters.

use tracing::debug;

/// Map a Diesel failure onto an adapter error.
///
/// Closed connections go to `connection`; everything else goes to
/// `statement`, which callers pick per operation (a write or a query
/// constructor).
pub(super) fn map_diesel_error<E, S, C>(
    error: diesel::result::Error,
    statement: S,
    connection: C,
) -> E
where
    S: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(%error, "diesel operation failed"),
    }

    match error {
        DieselError::NotFound => statement("record not found"),
        DieselError::QueryBuilderError(_) => statement("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error")
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            statement("duplicate key")
        }
        DieselError::DeserializationError(_) => statement("unreadable column value"),
        _ => statement("database error"),
    }
}
