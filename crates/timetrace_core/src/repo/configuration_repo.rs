//! Keyed configuration store.
//!
//! # Responsibility
//! - Persist configuration settings (by index) and their key/value details.
//! - Answer value lookups by `(index, key)` for other repositories.
//!
//! # Invariants
//! - A setting is created at most once per index; creation attaches exactly
//!   one `Default` detail in the same transaction.
//! - Adding an existing `(index, key)` pair updates its value in place.
//! - Deleting a setting deletes its details first, atomically.
//! - Targeted updates/deletes on absent rows fail with `NotFound`.

use crate::config::RepositoryOptions;
use crate::model::configuration::{ConfigurationSetting, ConfigurationSettingDetail};
use crate::repo::base::{RepositoryBase, SqliteRepository};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::filter::Filter;
use log::info;
use rusqlite::Connection;
use std::collections::BTreeMap;

/// Repository interface for configuration settings and details.
pub trait ConfigurationRepository {
    /// Returns the setting with `index`, creating it (plus its `Default`
    /// detail) when absent.
    fn add_configuration_setting(&self, index: &str) -> RepoResult<ConfigurationSetting>;
    /// Sets `key = value` under `index`, creating the setting if needed.
    ///
    /// An existing detail with the same key is updated instead of duplicated.
    fn add_configuration_setting_detail(
        &self,
        index: &str,
        key: &str,
        value: Option<&str>,
    ) -> RepoResult<ConfigurationSettingDetail>;
    /// Inserts a detail for an already persisted setting.
    ///
    /// # Errors
    /// - `ReferentialIntegrity` when `configuration_setting_id` is unknown.
    fn insert_configuration_setting_detail(
        &self,
        detail: &ConfigurationSettingDetail,
    ) -> RepoResult<ConfigurationSettingDetail>;
    fn get_configuration_setting(&self, index: &str) -> RepoResult<Option<ConfigurationSetting>>;
    /// Returns the value stored under `(index, key)`, or `None`.
    fn fetch_configuration_setting_value_by_key_index(
        &self,
        index: &str,
        key: &str,
    ) -> RepoResult<Option<String>>;
    /// Returns every key/value pair of `index`; empty when the setting is absent.
    fn fetch_configuration_setting_key_value_by_index(
        &self,
        index: &str,
    ) -> RepoResult<BTreeMap<String, Option<String>>>;
    fn fetch_all_configuration_setting_indexes(&self) -> RepoResult<Vec<String>>;
    fn update_configuration_setting(
        &self,
        setting: &ConfigurationSetting,
    ) -> RepoResult<ConfigurationSetting>;
    /// Renames a setting index.
    fn update_configuration_setting_index(
        &self,
        index: &str,
        new_index: &str,
    ) -> RepoResult<ConfigurationSetting>;
    fn update_configuration_setting_detail(
        &self,
        detail: &ConfigurationSettingDetail,
    ) -> RepoResult<ConfigurationSettingDetail>;
    /// Renames the detail `key` of setting `index`.
    fn update_configuration_setting_detail_key(
        &self,
        index: &str,
        key: &str,
        new_key: &str,
    ) -> RepoResult<ConfigurationSettingDetail>;
    fn update_configuration_setting_detail_value(
        &self,
        index: &str,
        key: &str,
        new_value: Option<&str>,
    ) -> RepoResult<ConfigurationSettingDetail>;
    /// Deletes the setting `index` and its details. Returns rows removed.
    fn delete_configuration_setting_index(&self, index: &str) -> RepoResult<usize>;
    /// Deletes a persisted setting and its details. Returns rows removed.
    fn delete_configuration_setting(&self, setting: &ConfigurationSetting) -> RepoResult<usize>;
    fn delete_configuration_setting_detail(&self, index: &str, key: &str) -> RepoResult<()>;
    fn delete_configuration_setting_detail_entity(
        &self,
        detail: &ConfigurationSettingDetail,
    ) -> RepoResult<()>;
}

/// SQLite-backed configuration repository.
#[derive(Debug, Clone, Copy)]
pub struct SqliteConfigurationRepository<'conn> {
    base: SqliteRepository<'conn>,
}

impl<'conn> SqliteConfigurationRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection, options: &RepositoryOptions) -> RepoResult<Self> {
        Ok(Self::with_base(SqliteRepository::try_new(conn, options)?))
    }

    pub(crate) fn with_base(base: SqliteRepository<'conn>) -> Self {
        Self { base }
    }

    fn find_detail(
        &self,
        index: &str,
        key: &str,
    ) -> RepoResult<Option<ConfigurationSettingDetail>> {
        self.base.find(&detail_filter(index, key))
    }

    fn require_detail(&self, index: &str, key: &str) -> RepoResult<ConfigurationSettingDetail> {
        self.find_detail(index, key)?.ok_or_else(|| {
            RepoError::not_found::<ConfigurationSettingDetail>(format!("index={index} key={key}"))
        })
    }

    fn require_setting(&self, index: &str) -> RepoResult<ConfigurationSetting> {
        self.get_configuration_setting(index)?
            .ok_or_else(|| RepoError::not_found::<ConfigurationSetting>(format!("index={index}")))
    }

    fn remove_setting(&self, setting: &ConfigurationSetting) -> RepoResult<usize> {
        let removed = self.base.atomically(|| {
            let details = self.base.delete_where::<ConfigurationSettingDetail>(&Filter::eq(
                "configuration_setting_id",
                setting.id,
            ))?;
            self.base.delete(setting)?;
            Ok(details + 1)
        })?;
        info!(
            "event=config_setting_delete module=repo status=ok setting_id={} rows={}",
            setting.id, removed
        );
        Ok(removed)
    }
}

impl ConfigurationRepository for SqliteConfigurationRepository<'_> {
    fn add_configuration_setting(&self, index: &str) -> RepoResult<ConfigurationSetting> {
        let setting = ConfigurationSetting::new(index);
        setting.validate()?;
        if let Some(existing) = self.get_configuration_setting(index)? {
            return Ok(existing);
        }

        let stored = self.base.atomically(|| {
            let stored = self.base.add(&setting)?;
            self.base
                .add(&ConfigurationSettingDetail::default_for(stored.id))?;
            Ok(stored)
        })?;
        info!(
            "event=config_setting_add module=repo status=ok setting_id={}",
            stored.id
        );
        Ok(stored)
    }

    fn add_configuration_setting_detail(
        &self,
        index: &str,
        key: &str,
        value: Option<&str>,
    ) -> RepoResult<ConfigurationSettingDetail> {
        let value = value.map(str::to_string);
        self.base.atomically(|| {
            let setting = self.add_configuration_setting(index)?;
            let existing = self.base.find::<ConfigurationSettingDetail>(
                &Filter::eq("configuration_setting_id", setting.id)
                    .and(Filter::eq("setting_key", key.to_string())),
            )?;
            match existing {
                Some(mut detail) => {
                    detail.value = value;
                    detail.validate()?;
                    self.base.update(&detail)
                }
                None => {
                    let detail = ConfigurationSettingDetail::new(setting.id, key, value);
                    detail.validate()?;
                    self.base.add(&detail)
                }
            }
        })
    }

    fn insert_configuration_setting_detail(
        &self,
        detail: &ConfigurationSettingDetail,
    ) -> RepoResult<ConfigurationSettingDetail> {
        detail.validate()?;
        if self
            .base
            .get_by_id::<ConfigurationSetting>(detail.configuration_setting_id)?
            .is_none()
        {
            return Err(RepoError::missing_parent::<ConfigurationSettingDetail>(
                "configuration_setting_id",
                detail.configuration_setting_id,
            ));
        }
        self.base.add(detail)
    }

    fn get_configuration_setting(&self, index: &str) -> RepoResult<Option<ConfigurationSetting>> {
        self.base
            .find(&Filter::eq("setting_index", index.to_string()))
    }

    fn fetch_configuration_setting_value_by_key_index(
        &self,
        index: &str,
        key: &str,
    ) -> RepoResult<Option<String>> {
        Ok(self.find_detail(index, key)?.and_then(|detail| detail.value))
    }

    fn fetch_configuration_setting_key_value_by_index(
        &self,
        index: &str,
    ) -> RepoResult<BTreeMap<String, Option<String>>> {
        let details = self
            .base
            .find_all::<ConfigurationSettingDetail>(&details_of_index(index))?;
        Ok(details
            .into_iter()
            .map(|detail| (detail.key, detail.value))
            .collect())
    }

    fn fetch_all_configuration_setting_indexes(&self) -> RepoResult<Vec<String>> {
        let settings = self.base.fetch_all::<ConfigurationSetting>()?;
        Ok(settings.into_iter().map(|setting| setting.index).collect())
    }

    fn update_configuration_setting(
        &self,
        setting: &ConfigurationSetting,
    ) -> RepoResult<ConfigurationSetting> {
        setting.validate()?;
        self.base.update(setting)
    }

    fn update_configuration_setting_index(
        &self,
        index: &str,
        new_index: &str,
    ) -> RepoResult<ConfigurationSetting> {
        let mut setting = self.require_setting(index)?;
        setting.index = new_index.to_string();
        self.update_configuration_setting(&setting)
    }

    fn update_configuration_setting_detail(
        &self,
        detail: &ConfigurationSettingDetail,
    ) -> RepoResult<ConfigurationSettingDetail> {
        detail.validate()?;
        self.base.update(detail)
    }

    fn update_configuration_setting_detail_key(
        &self,
        index: &str,
        key: &str,
        new_key: &str,
    ) -> RepoResult<ConfigurationSettingDetail> {
        let mut detail = self.require_detail(index, key)?;
        detail.key = new_key.to_string();
        self.update_configuration_setting_detail(&detail)
    }

    fn update_configuration_setting_detail_value(
        &self,
        index: &str,
        key: &str,
        new_value: Option<&str>,
    ) -> RepoResult<ConfigurationSettingDetail> {
        let mut detail = self.require_detail(index, key)?;
        detail.value = new_value.map(str::to_string);
        self.update_configuration_setting_detail(&detail)
    }

    fn delete_configuration_setting_index(&self, index: &str) -> RepoResult<usize> {
        let setting = self.require_setting(index)?;
        self.remove_setting(&setting)
    }

    fn delete_configuration_setting(&self, setting: &ConfigurationSetting) -> RepoResult<usize> {
        self.remove_setting(setting)
    }

    fn delete_configuration_setting_detail(&self, index: &str, key: &str) -> RepoResult<()> {
        let detail = self.require_detail(index, key)?;
        self.base.delete(&detail)
    }

    fn delete_configuration_setting_detail_entity(
        &self,
        detail: &ConfigurationSettingDetail,
    ) -> RepoResult<()> {
        self.base.delete(detail)
    }
}

fn details_of_index(index: &str) -> Filter {
    Filter::related(
        "configuration_setting_id",
        "configuration_setting",
        Filter::eq("setting_index", index.to_string()),
    )
}

fn detail_filter(index: &str, key: &str) -> Filter {
    details_of_index(index).and(Filter::eq("setting_key", key.to_string()))
}
