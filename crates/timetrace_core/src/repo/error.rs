//! Repository error taxonomy.
//!
//! # Invariants
//! - Targeted update/delete/lookup-by-key on a missing row yields `NotFound`;
//!   generic `find` returns `None` instead.
//! - Nothing in this layer retries; every error reaches the caller.

use crate::db::DbError;
use crate::model::{EntityId, ValidationError};
use crate::repo::entity::Entity;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// Input failed a field-level rule; nothing was written.
    Validation(ValidationError),
    /// Referenced parent row does not exist; nothing was written.
    ReferentialIntegrity {
        entity: &'static str,
        field: &'static str,
        id: EntityId,
    },
    /// Targeted row does not exist.
    NotFound { entity: &'static str, key: String },
    /// Update carried a stale `row_version`.
    ConcurrencyConflict {
        entity: &'static str,
        id: EntityId,
        row_version: i64,
    },
    /// Store-level failure, including constraint violations.
    Persistence(DbError),
    /// Configuration value required by a derived field is not set.
    MissingConfiguration { index: String, key: String },
    /// Persisted data cannot be converted to a valid model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl RepoError {
    pub(crate) fn not_found<E: Entity>(key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: E::NAME,
            key: key.into(),
        }
    }

    pub(crate) fn missing_parent<E: Entity>(field: &'static str, id: EntityId) -> Self {
        Self::ReferentialIntegrity {
            entity: E::NAME,
            field,
            id,
        }
    }

    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ReferentialIntegrity { .. } => "referential_integrity",
            Self::NotFound { .. } => "not_found",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::Persistence(_) => "persistence",
            Self::MissingConfiguration { .. } => "missing_configuration",
            Self::InvalidData(_) => "invalid_data",
            Self::UninitializedConnection { .. } => "uninitialized_connection",
            Self::MissingRequiredTable(_) => "missing_table",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::ReferentialIntegrity { field, id, .. } => {
                write!(f, "{field} does not exist: {id}")
            }
            Self::NotFound { entity, key } => write!(f, "{entity} does not exist: {key}"),
            Self::ConcurrencyConflict {
                entity,
                id,
                row_version,
            } => write!(
                f,
                "{entity} {id} was modified concurrently (stale row_version {row_version})"
            ),
            Self::Persistence(err) => write!(f, "{err}"),
            Self::MissingConfiguration { index, key } => write!(
                f,
                "configuration value is not set: index=`{index}` key=`{key}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Persistence(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Persistence(DbError::from(value))
    }
}
