//! Process hierarchy orchestration.
//!
//! # Responsibility
//! - Validate and persist processes and process details.
//! - Run the ordered multi-entity cascades over
//!   `Process -> ProcessDetail -> Image`.
//!
//! # Invariants
//! - Deletes always remove images first, then details, then processes.
//! - Every insert and update is validated before the store is touched.
//! - Detail inserts and updates require an existing parent process.
//! - `CascadeMode::Sequential` commits each step on its own; a failure after
//!   an earlier step is logged with `status=partial`.
//! - `CascadeMode::Atomic` runs the whole cascade in one transaction.

use crate::config::{CascadeMode, RepositoryOptions};
use crate::model::image::Image;
use crate::model::process::{Process, ProcessDetail, ProcessWithDetails};
use crate::model::EntityId;
use crate::repo::base::{RepositoryBase, SqliteRepository};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::filter::{CompareOp, Filter};
use crate::repo::image_repo::{ImageRepository, SqliteImageRepository};
use log::{error, info};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Page size for paged queries when the caller has no better choice.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Rows touched per table by one cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub images: usize,
    pub details: usize,
    pub processes: usize,
}

impl CascadeSummary {
    pub fn total(&self) -> usize {
        self.images + self.details + self.processes
    }
}

/// Repository interface for processes and their details.
pub trait ProcessRepository {
    fn add_process(&self, process: &Process) -> RepoResult<Process>;
    fn add_processes(&self, processes: &mut [Process]) -> RepoResult<bool>;
    /// # Errors
    /// - `ReferentialIntegrity` when the parent process does not exist.
    fn add_process_detail(&self, detail: &ProcessDetail) -> RepoResult<ProcessDetail>;
    fn add_process_details(&self, details: &mut [ProcessDetail]) -> RepoResult<bool>;
    /// Inserts `process`, then every detail with its `process_id` stamped.
    fn add_process_with_details(
        &self,
        process: &Process,
        details: &mut [ProcessDetail],
    ) -> RepoResult<Process>;
    fn update_process(&self, process: &Process) -> RepoResult<Process>;
    /// # Errors
    /// - `ReferentialIntegrity` when `process_id` names no process.
    fn update_process_detail(&self, detail: &ProcessDetail) -> RepoResult<ProcessDetail>;
    fn update_processes(&self, processes: &mut [Process]) -> RepoResult<()>;
    fn update_process_details(&self, details: &mut [ProcessDetail]) -> RepoResult<()>;
    /// Deletes the process with its details and their images.
    fn delete_process(&self, process: &Process) -> RepoResult<CascadeSummary>;
    fn delete_process_by_id(&self, process_id: EntityId) -> RepoResult<CascadeSummary>;
    fn delete_processes(&self, processes: &[Process]) -> RepoResult<CascadeSummary>;
    /// Empties the image, detail and process tables in that order.
    fn delete_all_processes(&self) -> RepoResult<CascadeSummary>;
    fn delete_process_detail(&self, detail: &ProcessDetail) -> RepoResult<CascadeSummary>;
    fn delete_process_details(&self, details: &[ProcessDetail]) -> RepoResult<CascadeSummary>;
    fn delete_process_details_by_process_id(
        &self,
        process_id: EntityId,
    ) -> RepoResult<CascadeSummary>;
    fn get_process(&self, process_id: EntityId) -> RepoResult<Option<Process>>;
    fn get_process_by_name(&self, name: &str) -> RepoResult<Option<Process>>;
    /// Pages are 1-based; pass [`DEFAULT_PAGE_SIZE`] absent a preference.
    fn get_processes(&self, page: u32, page_size: u32) -> RepoResult<Vec<Process>>;
    /// Returns one page of processes, each with all of its details.
    fn get_processes_with_details(
        &self,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<ProcessWithDetails>>;
    fn get_process_detail(
        &self,
        process_detail_id: EntityId,
    ) -> RepoResult<Option<ProcessDetail>>;
    fn get_process_details(
        &self,
        process_id: EntityId,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<ProcessDetail>>;
    /// Details with `start_ms <= updated_at < end_ms`.
    fn get_process_details_by_date_range(
        &self,
        start_ms: i64,
        end_ms: i64,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<ProcessDetail>>;
    fn get_images_for_process(
        &self,
        process_id: EntityId,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Image>>;
}

/// SQLite-backed process repository.
#[derive(Debug, Clone)]
pub struct SqliteProcessRepository<'conn> {
    base: SqliteRepository<'conn>,
    images: SqliteImageRepository<'conn>,
    cascade_mode: CascadeMode,
}

impl<'conn> SqliteProcessRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection, options: &RepositoryOptions) -> RepoResult<Self> {
        let base = SqliteRepository::try_new(conn, options)?;
        Ok(Self {
            base,
            images: SqliteImageRepository::with_base(base, options),
            cascade_mode: options.cascade_mode,
        })
    }

    /// Image repository sharing this repository's connection and options.
    pub fn images(&self) -> &SqliteImageRepository<'conn> {
        &self.images
    }

    pub fn cascade_mode(&self) -> CascadeMode {
        self.cascade_mode
    }

    /// Runs `steps` in the configured cascade scope and logs the outcome.
    fn run_cascade<T>(
        &self,
        event: &'static str,
        steps: impl FnOnce(&mut CascadeSummary) -> RepoResult<T>,
    ) -> RepoResult<(T, CascadeSummary)> {
        let started_at = Instant::now();
        let mut summary = CascadeSummary::default();
        let result = match self.cascade_mode {
            CascadeMode::Sequential => steps(&mut summary),
            CascadeMode::Atomic => self.base.atomically(|| steps(&mut summary)),
        };

        match result {
            Ok(value) => {
                info!(
                    "event={} module=repo status=ok images={} details={} processes={} duration_ms={}",
                    event,
                    summary.images,
                    summary.details,
                    summary.processes,
                    started_at.elapsed().as_millis()
                );
                Ok((value, summary))
            }
            Err(err) => {
                if self.cascade_mode == CascadeMode::Sequential && summary.total() > 0 {
                    error!(
                        "event={} module=repo status=partial error_code={} images={} details={} processes={} duration_ms={}",
                        event,
                        err.code(),
                        summary.images,
                        summary.details,
                        summary.processes,
                        started_at.elapsed().as_millis()
                    );
                } else {
                    error!(
                        "event={} module=repo status=error error_code={} duration_ms={}",
                        event,
                        err.code(),
                        started_at.elapsed().as_millis()
                    );
                }
                Err(err)
            }
        }
    }

    fn require_process(&self, process_id: EntityId) -> RepoResult<()> {
        match self.get_process(process_id)? {
            Some(_) => Ok(()),
            None => Err(RepoError::not_found::<Process>(format!("id={process_id}"))),
        }
    }

    fn require_detail(&self, process_detail_id: EntityId) -> RepoResult<()> {
        match self.get_process_detail(process_detail_id)? {
            Some(_) => Ok(()),
            None => Err(RepoError::not_found::<ProcessDetail>(format!(
                "id={process_detail_id}"
            ))),
        }
    }

    fn ensure_parent_exists(&self, process_id: EntityId) -> RepoResult<()> {
        match self.get_process(process_id)? {
            Some(_) => Ok(()),
            None => Err(RepoError::missing_parent::<ProcessDetail>(
                "process_id",
                process_id,
            )),
        }
    }

    fn ensure_parents_exist(&self, details: &[ProcessDetail]) -> RepoResult<()> {
        let parents: BTreeSet<EntityId> = details.iter().map(|detail| detail.process_id).collect();
        for process_id in parents {
            self.ensure_parent_exists(process_id)?;
        }
        Ok(())
    }

    fn cascade_process(
        &self,
        process_id: EntityId,
        summary: &mut CascadeSummary,
    ) -> RepoResult<()> {
        summary.images += self
            .images
            .delete_images_where(&images_of_process(process_id))?;
        summary.details += self
            .base
            .delete_where::<ProcessDetail>(&Filter::eq("process_id", process_id))?;
        let removed = self
            .base
            .delete_where::<Process>(&Filter::eq("id", process_id))?;
        if removed == 0 {
            return Err(RepoError::not_found::<Process>(format!("id={process_id}")));
        }
        summary.processes += removed;
        Ok(())
    }
}

impl ProcessRepository for SqliteProcessRepository<'_> {
    fn add_process(&self, process: &Process) -> RepoResult<Process> {
        process.validate()?;
        self.base.add(process)
    }

    fn add_processes(&self, processes: &mut [Process]) -> RepoResult<bool> {
        for process in processes.iter() {
            process.validate()?;
        }
        self.base.add_all(processes)
    }

    fn add_process_detail(&self, detail: &ProcessDetail) -> RepoResult<ProcessDetail> {
        detail.validate()?;
        self.ensure_parent_exists(detail.process_id)?;
        self.base.add(detail)
    }

    fn add_process_details(&self, details: &mut [ProcessDetail]) -> RepoResult<bool> {
        for detail in details.iter() {
            detail.validate()?;
        }
        self.ensure_parents_exist(details)?;
        self.base.add_all(details)
    }

    fn add_process_with_details(
        &self,
        process: &Process,
        details: &mut [ProcessDetail],
    ) -> RepoResult<Process> {
        process.validate()?;
        for detail in details.iter() {
            detail.validate_description()?;
        }

        let (stored, _) = self.run_cascade("process_add_with_details", |summary| {
            let stored = self.base.add(process)?;
            summary.processes += 1;
            for detail in details.iter_mut() {
                detail.process_id = stored.id;
            }
            self.base.add_all(&mut *details)?;
            summary.details += details.len();
            Ok(stored)
        })?;
        Ok(stored)
    }

    fn update_process(&self, process: &Process) -> RepoResult<Process> {
        process.validate()?;
        self.base.update(process)
    }

    fn update_process_detail(&self, detail: &ProcessDetail) -> RepoResult<ProcessDetail> {
        detail.validate()?;
        self.ensure_parent_exists(detail.process_id)?;
        self.base.update(detail)
    }

    fn update_processes(&self, processes: &mut [Process]) -> RepoResult<()> {
        for process in processes.iter() {
            process.validate()?;
        }
        self.base.update_all(processes)
    }

    fn update_process_details(&self, details: &mut [ProcessDetail]) -> RepoResult<()> {
        for detail in details.iter() {
            detail.validate()?;
        }
        self.ensure_parents_exist(details)?;
        self.base.update_all(details)
    }

    fn delete_process(&self, process: &Process) -> RepoResult<CascadeSummary> {
        self.delete_process_by_id(process.id)
    }

    fn delete_process_by_id(&self, process_id: EntityId) -> RepoResult<CascadeSummary> {
        self.require_process(process_id)?;
        let ((), summary) = self.run_cascade("process_delete", |summary| {
            self.cascade_process(process_id, summary)
        })?;
        Ok(summary)
    }

    fn delete_processes(&self, processes: &[Process]) -> RepoResult<CascadeSummary> {
        for process in processes {
            self.require_process(process.id)?;
        }
        let ((), summary) = self.run_cascade("processes_delete", |summary| {
            for process in processes {
                self.cascade_process(process.id, summary)?;
            }
            Ok(())
        })?;
        Ok(summary)
    }

    fn delete_all_processes(&self) -> RepoResult<CascadeSummary> {
        let ((), summary) = self.run_cascade("processes_delete_all", |summary| {
            summary.images += self.images.delete_all_images()?;
            summary.details += self.base.delete_all::<ProcessDetail>()?;
            summary.processes += self.base.delete_all::<Process>()?;
            Ok(())
        })?;
        Ok(summary)
    }

    fn delete_process_detail(&self, detail: &ProcessDetail) -> RepoResult<CascadeSummary> {
        self.require_detail(detail.id)?;
        let ((), summary) = self.run_cascade("process_detail_delete", |summary| {
            summary.images += self.images.delete_images_for_detail(detail.id)?;
            self.base.delete(detail)?;
            summary.details += 1;
            Ok(())
        })?;
        Ok(summary)
    }

    fn delete_process_details(&self, details: &[ProcessDetail]) -> RepoResult<CascadeSummary> {
        for detail in details {
            self.require_detail(detail.id)?;
        }
        let ((), summary) = self.run_cascade("process_details_delete", |summary| {
            let ids = details.iter().map(|detail| detail.id);
            summary.images += self
                .images
                .delete_images_where(&Filter::one_of("process_detail_id", ids))?;
            summary.details += self.base.delete_many(details)?;
            Ok(())
        })?;
        Ok(summary)
    }

    fn delete_process_details_by_process_id(
        &self,
        process_id: EntityId,
    ) -> RepoResult<CascadeSummary> {
        let ((), summary) = self.run_cascade("process_details_delete", |summary| {
            summary.images += self
                .images
                .delete_images_where(&images_of_process(process_id))?;
            summary.details += self
                .base
                .delete_where::<ProcessDetail>(&Filter::eq("process_id", process_id))?;
            Ok(())
        })?;
        Ok(summary)
    }

    fn get_process(&self, process_id: EntityId) -> RepoResult<Option<Process>> {
        self.base.get_by_id(process_id)
    }

    fn get_process_by_name(&self, name: &str) -> RepoResult<Option<Process>> {
        self.base.find(&Filter::eq("name", name.to_string()))
    }

    fn get_processes(&self, page: u32, page_size: u32) -> RepoResult<Vec<Process>> {
        self.base.fetch_page(page_size, page)
    }

    fn get_processes_with_details(
        &self,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<ProcessWithDetails>> {
        let processes = self.get_processes(page, page_size)?;
        let ids = processes.iter().map(|process| process.id);
        let details = self
            .base
            .find_all::<ProcessDetail>(&Filter::one_of("process_id", ids))?;

        let mut by_process: BTreeMap<EntityId, Vec<ProcessDetail>> = BTreeMap::new();
        for detail in details {
            by_process.entry(detail.process_id).or_default().push(detail);
        }

        Ok(processes
            .into_iter()
            .map(|process| ProcessWithDetails {
                details: by_process.remove(&process.id).unwrap_or_default(),
                process,
            })
            .collect())
    }

    fn get_process_detail(
        &self,
        process_detail_id: EntityId,
    ) -> RepoResult<Option<ProcessDetail>> {
        self.base.get_by_id(process_detail_id)
    }

    fn get_process_details(
        &self,
        process_id: EntityId,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<ProcessDetail>> {
        self.base
            .find_page(&Filter::eq("process_id", process_id), page_size, page)
    }

    fn get_process_details_by_date_range(
        &self,
        start_ms: i64,
        end_ms: i64,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<ProcessDetail>> {
        let filter = Filter::compare("updated_at", CompareOp::Ge, start_ms)
            .and(Filter::compare("updated_at", CompareOp::Lt, end_ms));
        self.base.find_page(&filter, page_size, page)
    }

    fn get_images_for_process(
        &self,
        process_id: EntityId,
        page: u32,
        page_size: u32,
    ) -> RepoResult<Vec<Image>> {
        self.images
            .get_images(&images_of_process(process_id), page, page_size)
    }
}

/// Images whose detail belongs to `process_id`.
fn images_of_process(process_id: EntityId) -> Filter {
    Filter::related(
        "process_detail_id",
        "process_detail",
        Filter::eq("process_id", process_id),
    )
}

#[cfg(test)]
mod tests {
    use super::{images_of_process, CascadeSummary};

    #[test]
    fn summary_total_adds_all_tables() {
        let summary = CascadeSummary {
            images: 2,
            details: 1,
            processes: 1,
        };
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn process_images_filter_joins_through_details() {
        let (sql, _) = images_of_process(9).to_sql();
        assert_eq!(
            sql,
            "process_detail_id IN (SELECT id FROM process_detail WHERE process_id = ?)"
        );
    }
}
