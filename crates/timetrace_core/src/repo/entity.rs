//! Table mapping for persisted models.
//!
//! # Responsibility
//! - Describe, once per model, its table, writable columns and row decoding.
//! - Keep the generic repository free of entity-specific knowledge.
//!
//! # Invariants
//! - Every mapped table has an `INTEGER PRIMARY KEY` named `id` and
//!   store-maintained `row_version` / `updated_at` columns.
//! - `column_values` yields values in the exact order of `COLUMNS`.

use crate::model::configuration::{ConfigurationSetting, ConfigurationSettingDetail};
use crate::model::image::Image;
use crate::model::process::{Process, ProcessDetail};
use crate::model::EntityId;
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::Row;
use uuid::Uuid;

/// A model stored as one row of one table.
pub trait Entity: Sized {
    /// Human-readable name used in errors and log events.
    const NAME: &'static str;
    const TABLE: &'static str;
    /// Columns written by insert and update, excluding `id`, `row_version`
    /// and `updated_at`.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> EntityId;
    fn row_version(&self) -> i64;
    fn column_values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> RepoResult<Self>;
}

impl Entity for Process {
    const NAME: &'static str = "process";
    const TABLE: &'static str = "process";
    const COLUMNS: &'static [&'static str] = &["name"];

    fn id(&self) -> EntityId {
        self.id
    }

    fn row_version(&self) -> i64 {
        self.row_version
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone())]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            row_version: row.get("row_version")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl Entity for ProcessDetail {
    const NAME: &'static str = "process detail";
    const TABLE: &'static str = "process_detail";
    const COLUMNS: &'static [&'static str] = &["description", "process_id"];

    fn id(&self) -> EntityId {
        self.id
    }

    fn row_version(&self) -> i64 {
        self.row_version
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.description.clone()),
            Value::Integer(self.process_id),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            description: row.get("description")?,
            process_id: row.get("process_id")?,
            row_version: row.get("row_version")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl Entity for Image {
    const NAME: &'static str = "image";
    const TABLE: &'static str = "image";
    const COLUMNS: &'static [&'static str] =
        &["name", "image_path", "image_guid", "process_detail_id"];

    fn id(&self) -> EntityId {
        self.id
    }

    fn row_version(&self) -> i64 {
        self.row_version
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            optional_text(self.image_path.as_deref()),
            Value::Text(self.image_guid.to_string()),
            Value::Integer(self.process_detail_id),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let guid_text: String = row.get("image_guid")?;
        let image_guid = Uuid::parse_str(&guid_text).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{guid_text}` in image.image_guid"))
        })?;

        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            image_path: row.get("image_path")?,
            image_guid,
            process_detail_id: row.get("process_detail_id")?,
            row_version: row.get("row_version")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl Entity for ConfigurationSetting {
    const NAME: &'static str = "configuration setting";
    const TABLE: &'static str = "configuration_setting";
    const COLUMNS: &'static [&'static str] = &["setting_index"];

    fn id(&self) -> EntityId {
        self.id
    }

    fn row_version(&self) -> i64 {
        self.row_version
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::Text(self.index.clone())]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            index: row.get("setting_index")?,
            row_version: row.get("row_version")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl Entity for ConfigurationSettingDetail {
    const NAME: &'static str = "configuration setting detail";
    const TABLE: &'static str = "configuration_setting_detail";
    const COLUMNS: &'static [&'static str] =
        &["setting_key", "setting_value", "configuration_setting_id"];

    fn id(&self) -> EntityId {
        self.id
    }

    fn row_version(&self) -> i64 {
        self.row_version
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.key.clone()),
            optional_text(self.value.as_deref()),
            Value::Integer(self.configuration_setting_id),
        ]
    }

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            key: row.get("setting_key")?,
            value: row.get("setting_value")?,
            configuration_setting_id: row.get("configuration_setting_id")?,
            row_version: row.get("row_version")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}
