//! Database error classification.
//!
//! Errors are split into transient (caller may retry) and permanent
//! (never retry) using vendor error codes — SQLSTATE for the sqlx
//! drivers — not message text. No retry happens inside this subsystem;
//! the classification travels upward with the error.

use feature_common::{DbErrorClass, FeatureError};

/// SQLSTATE class prefixes that indicate a transient condition:
/// connection failures (08), operator intervention / query cancel (57),
/// and transaction rollbacks such as serialization failures and
/// deadlocks (40).
const TRANSIENT_SQLSTATE_PREFIXES: &[&str] = &["08", "40", "57"];

/// Classify a raw SQLSTATE code.
pub fn classify_sqlstate(code: &str) -> DbErrorClass {
    if TRANSIENT_SQLSTATE_PREFIXES
        .iter()
        .any(|p| code.starts_with(p))
    {
        DbErrorClass::Transient
    } else {
        DbErrorClass::Permanent
    }
}

/// Classify a sqlx error.
pub fn classify(err: &sqlx::Error) -> DbErrorClass {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => classify_sqlstate(&code),
            None => DbErrorClass::Permanent,
        },
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => DbErrorClass::Transient,
        _ => DbErrorClass::Permanent,
    }
}

/// Convert a sqlx error into the classified [`FeatureError`].
pub fn to_feature_error(err: sqlx::Error) -> FeatureError {
    let class = classify(&err);
    FeatureError::Database {
        message: err.to_string(),
        class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_sqlstates() {
        // Connection failure, serialization failure, deadlock, cancel.
        for code in ["08006", "40001", "40P01", "57014"] {
            assert_eq!(classify_sqlstate(code), DbErrorClass::Transient, "{}", code);
        }
    }

    #[test]
    fn test_permanent_sqlstates() {
        // Unique violation, syntax error, undefined column.
        for code in ["23505", "42601", "42703"] {
            assert_eq!(classify_sqlstate(code), DbErrorClass::Permanent, "{}", code);
        }
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        assert_eq!(classify(&sqlx::Error::PoolTimedOut), DbErrorClass::Transient);
    }

    #[test]
    fn test_row_not_found_is_permanent() {
        assert_eq!(classify(&sqlx::Error::RowNotFound), DbErrorClass::Permanent);
    }

    #[test]
    fn test_conversion_carries_class() {
        let err = to_feature_error(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert_eq!(err.status_code(), 500);
    }
}
