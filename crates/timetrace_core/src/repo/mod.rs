//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Provide one generic CRUD/query engine (`base`) over any [`Entity`].
//! - Build the configuration, image and process repositories on top of it.
//!
//! # Invariants
//! - Repository writes run model validation before persistence.
//! - Repository APIs return semantic errors (`NotFound`,
//!   `ReferentialIntegrity`, `ConcurrencyConflict`) in addition to store
//!   errors.
//! - Every repository is built with `try_new(conn, &options)` and rejects
//!   connections that are not fully migrated.

pub mod base;
pub mod configuration_repo;
pub mod entity;
pub mod error;
pub mod filter;
pub mod image_repo;
pub mod process_repo;

pub use base::{RepositoryBase, SqliteRepository};
pub use configuration_repo::{ConfigurationRepository, SqliteConfigurationRepository};
pub use entity::Entity;
pub use error::{RepoError, RepoResult};
pub use filter::{CompareOp, Filter};
pub use image_repo::{resolve_image_path, ImageRepository, ResolvedImagePath, SqliteImageRepository};
pub use process_repo::{
    CascadeSummary, ProcessRepository, SqliteProcessRepository, DEFAULT_PAGE_SIZE,
};
