//! Process and process detail records.
//!
//! # Invariants
//! - `Process::name` is non-blank, at most 50 characters, unique.
//! - `ProcessDetail::process_id` is non-zero; `description` is non-blank and
//!   at most 255 characters.

use super::{
    require_reference, require_text, EntityId, ValidationError,
    PROCESS_DETAIL_DESCRIPTION_MAX_CHARS, PROCESS_NAME_MAX_CHARS, UNSAVED_ID,
};
use serde::{Deserialize, Serialize};

/// Top-level tracked process. Owns its details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub id: EntityId,
    pub name: String,
    pub row_version: i64,
    /// Epoch milliseconds, maintained by the store.
    pub updated_at: i64,
}

impl Process {
    /// Creates an unsaved process.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            name: name.into(),
            row_version: 0,
            updated_at: 0,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != UNSAVED_ID
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name, PROCESS_NAME_MAX_CHARS)
    }
}

/// One recorded step of a process. Owns its images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDetail {
    pub id: EntityId,
    pub description: String,
    pub process_id: EntityId,
    pub row_version: i64,
    /// Epoch milliseconds, maintained by the store. Used by date-range queries.
    pub updated_at: i64,
}

impl ProcessDetail {
    /// Creates an unsaved detail. `process_id` may be `0` when the owning
    /// process is inserted in the same call.
    pub fn new(process_id: EntityId, description: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            description: description.into(),
            process_id,
            row_version: 0,
            updated_at: 0,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != UNSAVED_ID
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_reference("process_id", self.process_id)?;
        self.validate_description()
    }

    /// Checks the description alone, for details whose parent is not
    /// inserted yet.
    pub fn validate_description(&self) -> Result<(), ValidationError> {
        require_text(
            "description",
            &self.description,
            PROCESS_DETAIL_DESCRIPTION_MAX_CHARS,
        )
    }
}

/// Read model pairing a process with all of its details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessWithDetails {
    pub process: Process,
    pub details: Vec<ProcessDetail>,
}
