//! Keyed configuration records.
//!
//! # Invariants
//! - `ConfigurationSetting::index` is unique, non-blank, at most 50 chars.
//! - A detail key is unique within its setting, non-blank, at most 255 chars.
//! - A detail value is optional and at most 50 chars.
//! - Every newly created setting owns one `Default` detail with no value.

use super::{
    require_max_chars, require_reference, require_text, EntityId, ValidationError,
    SETTING_INDEX_MAX_CHARS, SETTING_KEY_MAX_CHARS, SETTING_VALUE_MAX_CHARS, UNSAVED_ID,
};
use serde::{Deserialize, Serialize};

/// Key of the detail attached to every newly created setting.
pub const DEFAULT_DETAIL_KEY: &str = "Default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSetting {
    pub id: EntityId,
    pub index: String,
    pub row_version: i64,
    pub updated_at: i64,
}

impl ConfigurationSetting {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            id: UNSAVED_ID,
            index: index.into(),
            row_version: 0,
            updated_at: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("index", &self.index, SETTING_INDEX_MAX_CHARS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSettingDetail {
    pub id: EntityId,
    pub key: String,
    pub value: Option<String>,
    pub configuration_setting_id: EntityId,
    pub row_version: i64,
    pub updated_at: i64,
}

impl ConfigurationSettingDetail {
    pub fn new(
        configuration_setting_id: EntityId,
        key: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        Self {
            id: UNSAVED_ID,
            key: key.into(),
            value,
            configuration_setting_id,
            row_version: 0,
            updated_at: 0,
        }
    }

    /// Builds the `Default` detail attached to a freshly created setting.
    pub fn default_for(configuration_setting_id: EntityId) -> Self {
        Self::new(configuration_setting_id, DEFAULT_DETAIL_KEY, None)
    }

    pub fn is_default(&self) -> bool {
        self.key == DEFAULT_DETAIL_KEY
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_reference("configuration_setting_id", self.configuration_setting_id)?;
        require_text("key", &self.key, SETTING_KEY_MAX_CHARS)?;
        match self.value.as_deref() {
            Some(value) => require_max_chars("value", value, SETTING_VALUE_MAX_CHARS),
            None => Ok(()),
        }
    }
}
