//! Image persistence with derived identity and storage path.
//!
//! # Responsibility
//! - Assign a fresh guid and compute `name` / `image_path` for every insert.
//! - Recompute stored paths in bounded batches when the base path changes.
//!
//! # Invariants
//! - `process_detail_id` is checked (non-zero, existing) before any write.
//! - The base path comes from the configured image path setting; when it is
//!   unset the call fails with `MissingConfiguration` before any write.
//! - `file_name = "{guid}_{%Y%m%d%H%M%S}.jpg"` in local time, and
//!   `file_path = "{base}/{file_name}"` with trailing separators trimmed.
//! - Path recomputation never changes `image_guid` or `name`; afterwards the
//!   timestamp in `image_path` may differ from the one in `name`.
//! - One timestamp is taken per call and shared by every image it touches.

use crate::config::{ImagePathSetting, RepositoryOptions};
use crate::model::image::Image;
use crate::model::process::ProcessDetail;
use crate::model::EntityId;
use crate::repo::base::{RepositoryBase, SqliteRepository};
use crate::repo::configuration_repo::{ConfigurationRepository, SqliteConfigurationRepository};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::filter::Filter;
use chrono::{Local, NaiveDateTime};
use log::info;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::time::Instant;
use uuid::Uuid;

const PATH_SEPARATORS: &[char] = &['/', '\\'];

/// File name and full path derived for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImagePath {
    pub file_name: String,
    pub file_path: String,
}

/// Builds the file name and path for `guid` captured at `at`.
pub fn resolve_image_path(base_path: &str, guid: Uuid, at: NaiveDateTime) -> ResolvedImagePath {
    let file_name = format!("{guid}_{}.jpg", at.format("%Y%m%d%H%M%S"));
    let file_path = format!(
        "{}/{file_name}",
        base_path.trim_end_matches(PATH_SEPARATORS)
    );
    ResolvedImagePath {
        file_name,
        file_path,
    }
}

/// Repository interface for images.
pub trait ImageRepository {
    /// Inserts one image with a generated guid, name and path.
    ///
    /// # Errors
    /// - `ReferentialIntegrity` when `process_detail_id` is zero or unknown.
    /// - `MissingConfiguration` when the image base path is not set.
    fn add_image(&self, image: &Image) -> RepoResult<Image>;
    /// Inserts all images in one commit. Any invalid element fails the call
    /// before a row is written.
    fn add_images(&self, images: &mut [Image]) -> RepoResult<bool>;
    /// Computes the name and path a new image with `guid` would get now.
    fn create_image_path_and_name(&self, guid: Uuid) -> RepoResult<ResolvedImagePath>;
    fn delete_image(&self, image: &Image) -> RepoResult<usize>;
    fn delete_images(&self, images: &[Image]) -> RepoResult<usize>;
    fn delete_images_for_detail(&self, process_detail_id: EntityId) -> RepoResult<usize>;
    fn delete_images_where(&self, filter: &Filter) -> RepoResult<usize>;
    /// Deletes every image in bounded, independently committed batches.
    fn delete_all_images(&self) -> RepoResult<usize>;
    /// Recomputes `image_path` for every stored image. Returns rows updated.
    fn update_all_image_paths(&self) -> RepoResult<usize>;
    fn get_image(&self, id: EntityId) -> RepoResult<Option<Image>>;
    fn get_images(&self, filter: &Filter, page: u32, page_size: u32) -> RepoResult<Vec<Image>>;
    fn get_images_for_detail(
        &self,
        process_detail_id: EntityId,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Image>>;
    fn get_images_for_details(
        &self,
        process_detail_ids: &[EntityId],
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Image>>;
}

/// SQLite-backed image repository.
#[derive(Debug, Clone)]
pub struct SqliteImageRepository<'conn> {
    base: SqliteRepository<'conn>,
    configuration: SqliteConfigurationRepository<'conn>,
    image_path_setting: ImagePathSetting,
}

impl<'conn> SqliteImageRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection, options: &RepositoryOptions) -> RepoResult<Self> {
        Ok(Self::with_base(
            SqliteRepository::try_new(conn, options)?,
            options,
        ))
    }

    pub(crate) fn with_base(base: SqliteRepository<'conn>, options: &RepositoryOptions) -> Self {
        Self {
            base,
            configuration: SqliteConfigurationRepository::with_base(base),
            image_path_setting: options.image_path_setting.clone(),
        }
    }

    fn image_base_path(&self) -> RepoResult<String> {
        let ImagePathSetting { index, key } = &self.image_path_setting;
        self.configuration
            .fetch_configuration_setting_value_by_key_index(index, key)?
            .filter(|path| !path.trim().is_empty())
            .ok_or_else(|| RepoError::MissingConfiguration {
                index: index.clone(),
                key: key.clone(),
            })
    }

    fn ensure_detail_exists(&self, process_detail_id: EntityId) -> RepoResult<()> {
        let missing = || RepoError::missing_parent::<Image>("process_detail_id", process_detail_id);
        if process_detail_id == 0 {
            return Err(missing());
        }
        match self.base.get_by_id::<ProcessDetail>(process_detail_id)? {
            Some(_) => Ok(()),
            None => Err(missing()),
        }
    }

    fn stamp(image: &mut Image, base_path: &str, at: NaiveDateTime) {
        image.image_guid = Uuid::new_v4();
        let resolved = resolve_image_path(base_path, image.image_guid, at);
        image.name = resolved.file_name;
        image.image_path = Some(resolved.file_path);
    }
}

impl ImageRepository for SqliteImageRepository<'_> {
    fn add_image(&self, image: &Image) -> RepoResult<Image> {
        self.ensure_detail_exists(image.process_detail_id)?;
        let base_path = self.image_base_path()?;

        let mut prepared = image.clone();
        Self::stamp(&mut prepared, &base_path, Local::now().naive_local());
        self.base.add(&prepared)
    }

    fn add_images(&self, images: &mut [Image]) -> RepoResult<bool> {
        if images.is_empty() {
            return Ok(false);
        }
        let detail_ids: BTreeSet<EntityId> =
            images.iter().map(|image| image.process_detail_id).collect();
        for process_detail_id in detail_ids {
            self.ensure_detail_exists(process_detail_id)?;
        }
        let base_path = self.image_base_path()?;

        let at = Local::now().naive_local();
        for image in images.iter_mut() {
            Self::stamp(image, &base_path, at);
        }
        self.base.add_all(images)
    }

    fn create_image_path_and_name(&self, guid: Uuid) -> RepoResult<ResolvedImagePath> {
        let base_path = self.image_base_path()?;
        Ok(resolve_image_path(
            &base_path,
            guid,
            Local::now().naive_local(),
        ))
    }

    fn delete_image(&self, image: &Image) -> RepoResult<usize> {
        self.base.delete(image)?;
        Ok(1)
    }

    fn delete_images(&self, images: &[Image]) -> RepoResult<usize> {
        self.base.delete_many(images)
    }

    fn delete_images_for_detail(&self, process_detail_id: EntityId) -> RepoResult<usize> {
        self.delete_images_where(&Filter::eq("process_detail_id", process_detail_id))
    }

    fn delete_images_where(&self, filter: &Filter) -> RepoResult<usize> {
        self.base.delete_where::<Image>(filter)
    }

    fn delete_all_images(&self) -> RepoResult<usize> {
        self.base.delete_all::<Image>()
    }

    fn update_all_image_paths(&self) -> RepoResult<usize> {
        let started_at = Instant::now();
        let base_path = self.image_base_path()?;
        let batch_size = self.base.batch_size();

        let at = Local::now().naive_local();
        let mut page = 1;
        let mut updated = 0;
        loop {
            let mut images = self.base.fetch_page::<Image>(batch_size, page)?;
            if images.is_empty() {
                break;
            }
            for image in images.iter_mut() {
                let resolved = resolve_image_path(&base_path, image.image_guid, at);
                image.image_path = Some(resolved.file_path);
            }
            self.base.update_all(&mut images)?;
            updated += images.len();
            if images.len() < batch_size as usize {
                break;
            }
            page += 1;
        }

        info!(
            "event=image_paths_update module=repo status=ok rows={} duration_ms={}",
            updated,
            started_at.elapsed().as_millis()
        );
        Ok(updated)
    }

    fn get_image(&self, id: EntityId) -> RepoResult<Option<Image>> {
        self.base.get_by_id(id)
    }

    fn get_images(&self, filter: &Filter, page: u32, page_size: u32) -> RepoResult<Vec<Image>> {
        self.base.find_page(filter, page_size, page)
    }

    fn get_images_for_detail(
        &self,
        process_detail_id: EntityId,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Image>> {
        self.get_images(
            &Filter::eq("process_detail_id", process_detail_id),
            page,
            page_size,
        )
    }

    fn get_images_for_details(
        &self,
        process_detail_ids: &[EntityId],
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Image>> {
        self.get_images(
            &Filter::one_of("process_detail_id", process_detail_ids.iter().copied()),
            page,
            page_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_image_path;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn sample_time() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(7, 8, 9)
            .unwrap()
    }

    #[test]
    fn resolves_name_and_path() {
        let guid = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap();
        let resolved = resolve_image_path("/data/images", guid, sample_time());
        assert_eq!(
            resolved.file_name,
            "6f9619ff-8b86-d011-b42d-00c04fc964ff_20240305070809.jpg"
        );
        assert_eq!(
            resolved.file_path,
            "/data/images/6f9619ff-8b86-d011-b42d-00c04fc964ff_20240305070809.jpg"
        );
    }

    #[test]
    fn trims_trailing_separators() {
        let guid = Uuid::nil();
        let expected = format!("C:\\img/{guid}_20240305070809.jpg");
        assert_eq!(
            resolve_image_path("C:\\img\\", guid, sample_time()).file_path,
            expected
        );
        assert_eq!(
            resolve_image_path("C:\\img//", guid, sample_time()).file_path,
            expected
        );
    }
}
