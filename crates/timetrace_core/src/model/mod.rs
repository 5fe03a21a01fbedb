//! Domain model for processes, images and configuration settings.
//!
//! # Responsibility
//! - Define the records persisted by the repository layer.
//! - Own field-level validation rules, independent of storage.
//!
//! # Invariants
//! - An id of `0` means "not persisted yet"; stored rows always have `id > 0`.
//! - `row_version` is the optimistic concurrency token. It is assigned by the
//!   store and only compared on update, never interpreted.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod configuration;
pub mod image;
pub mod process;

/// Store-generated row identifier.
pub type EntityId = i64;

/// Id carried by records that have not been inserted yet.
pub const UNSAVED_ID: EntityId = 0;

pub const PROCESS_NAME_MAX_CHARS: usize = 50;
pub const PROCESS_DETAIL_DESCRIPTION_MAX_CHARS: usize = 255;
pub const SETTING_INDEX_MAX_CHARS: usize = 50;
pub const SETTING_KEY_MAX_CHARS: usize = 255;
pub const SETTING_VALUE_MAX_CHARS: usize = 50;

/// Field-level rule violation detected before any store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty or whitespace only.
    Required { field: &'static str },
    /// Field is longer than allowed (measured in characters).
    TooLong {
        field: &'static str,
        max_chars: usize,
    },
    /// Foreign key is `0`.
    MissingReference { field: &'static str },
    /// Page number and size are 1-based and must be non-zero.
    InvalidPagination { page: u32, page_size: u32 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Required { field } => write!(f, "{field} is required"),
            Self::TooLong { field, max_chars } => {
                write!(f, "{field} cannot exceed {max_chars} characters")
            }
            Self::MissingReference { field } => write!(f, "{field} is required"),
            Self::InvalidPagination { page, page_size } => write!(
                f,
                "page and page_size must be at least 1 (page={page}, page_size={page_size})"
            ),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    require_max_chars(field, value, max_chars)
}

pub(crate) fn require_max_chars(
    field: &'static str,
    value: &str,
    max_chars: usize,
) -> Result<(), ValidationError> {
    if value.chars().count() > max_chars {
        return Err(ValidationError::TooLong { field, max_chars });
    }
    Ok(())
}

pub(crate) fn require_reference(field: &'static str, id: EntityId) -> Result<(), ValidationError> {
    if id == UNSAVED_ID {
        return Err(ValidationError::MissingReference { field });
    }
    Ok(())
}
