//! Core persistence logic for timetrace.
//! This crate owns the process/image hierarchy and its keyed configuration.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{CascadeMode, ConfigError, CoreConfig, ImagePathSetting, RepositoryOptions};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError, DbResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::configuration::{ConfigurationSetting, ConfigurationSettingDetail};
pub use model::image::Image;
pub use model::process::{Process, ProcessDetail, ProcessWithDetails};
pub use model::{EntityId, ValidationError};
pub use repo::{
    CascadeSummary, ConfigurationRepository, Filter, ImageRepository, ProcessRepository,
    RepoError, RepoResult, RepositoryBase, SqliteConfigurationRepository, SqliteImageRepository,
    SqliteProcessRepository, SqliteRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
