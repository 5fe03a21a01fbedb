//! Generic repository core.
//!
//! # Responsibility
//! - Provide CRUD, existence, predicate-query and pagination primitives for
//!   any [`Entity`].
//! - Own optimistic concurrency checks and transaction scoping.
//!
//! # Invariants
//! - Single-row writes commit immediately unless an enclosing transaction is
//!   open, in which case they join it.
//! - Batch inserts, updates and deletes by list are atomic per call.
//! - Paged reads are ordered by `id ASC`; pages are 1-based.
//! - `delete_all` is bounded-batch and not atomic as a whole.

use crate::config::RepositoryOptions;
use crate::db::migrations::{current_user_version, latest_version, REQUIRED_TABLES};
use crate::model::{EntityId, ValidationError};
use crate::repo::entity::Entity;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::filter::Filter;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

const NOW_MS_SQL: &str = "(strftime('%s', 'now') * 1000)";

/// Entity-agnostic persistence contract.
pub trait RepositoryBase {
    /// Inserts one row and returns it with generated fields populated.
    fn add<E: Entity>(&self, entity: &E) -> RepoResult<E>;
    /// Inserts all rows in one commit, writing generated fields back.
    ///
    /// Returns `true` when at least one row was persisted.
    fn add_all<E: Entity>(&self, entities: &mut [E]) -> RepoResult<bool>;
    /// Replaces all writable columns of the row with the same id.
    ///
    /// # Errors
    /// - `ConcurrencyConflict` when `row_version` is stale.
    /// - `NotFound` when no row has this id.
    fn update<E: Entity>(&self, entity: &E) -> RepoResult<E>;
    /// Updates all rows in one commit; on any failure none is updated.
    fn update_all<E: Entity>(&self, entities: &mut [E]) -> RepoResult<()>;
    fn delete<E: Entity>(&self, entity: &E) -> RepoResult<()>;
    /// Deletes all listed rows in one commit. Returns the number removed.
    fn delete_many<E: Entity>(&self, entities: &[E]) -> RepoResult<usize>;
    fn delete_where<E: Entity>(&self, filter: &Filter) -> RepoResult<usize>;
    /// Deletes every row of `E` in bounded batches.
    ///
    /// Each batch commits on its own: a failure part-way leaves the rows of
    /// earlier batches deleted and the rest in place.
    fn delete_all<E: Entity>(&self) -> RepoResult<usize>;
    fn exists_where<E: Entity>(&self, filter: &Filter) -> RepoResult<bool>;
    fn exists<E: Entity>(&self, entity: &E) -> RepoResult<bool>;
    /// Returns the first match by id, or `None`.
    fn find<E: Entity>(&self, filter: &Filter) -> RepoResult<Option<E>>;
    fn find_all<E: Entity>(&self, filter: &Filter) -> RepoResult<Vec<E>>;
    /// Returns page `page` (1-based) of at most `page_size` matches.
    fn find_page<E: Entity>(
        &self,
        filter: &Filter,
        page_size: u32,
        page: u32,
    ) -> RepoResult<Vec<E>>;
    fn fetch_all<E: Entity>(&self) -> RepoResult<Vec<E>>;
    fn fetch_page<E: Entity>(&self, page_size: u32, page: u32) -> RepoResult<Vec<E>>;
    fn count_where<E: Entity>(&self, filter: &Filter) -> RepoResult<u64>;
}

/// SQLite-backed generic repository.
#[derive(Debug, Clone, Copy)]
pub struct SqliteRepository<'conn> {
    conn: &'conn Connection,
    batch_size: u32,
}

impl<'conn> SqliteRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection, options: &RepositoryOptions) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self {
            conn,
            batch_size: options.batch_size.max(1),
        })
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Runs `op` in one transaction, or inside the already open one.
    ///
    /// The transaction rolls back when `op` fails.
    pub fn atomically<T>(&self, op: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
        if !self.conn.is_autocommit() {
            return op();
        }
        let tx = self.conn.unchecked_transaction()?;
        let value = op()?;
        tx.commit()?;
        Ok(value)
    }

    /// Loads one row by id.
    pub fn get_by_id<E: Entity>(&self, id: EntityId) -> RepoResult<Option<E>> {
        self.find(&Filter::eq("id", id))
    }

    fn insert_row<E: Entity>(&self, entity: &E) -> RepoResult<E> {
        let placeholders = vec!["?"; E::COLUMNS.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders});",
            E::TABLE,
            E::COLUMNS.join(", ")
        );
        self.conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(entity.column_values()))?;
        let id = self.conn.last_insert_rowid();
        self.reload::<E>(id)
    }

    fn update_row<E: Entity>(&self, entity: &E) -> RepoResult<E> {
        let assignments = E::COLUMNS
            .iter()
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {}
             SET {assignments},
                 row_version = row_version + 1,
                 updated_at = {NOW_MS_SQL}
             WHERE id = ? AND row_version = ?;",
            E::TABLE
        );
        let mut binds = entity.column_values();
        binds.push(Value::Integer(entity.id()));
        binds.push(Value::Integer(entity.row_version()));

        let changed = self
            .conn
            .prepare_cached(&sql)?
            .execute(params_from_iter(binds))?;
        if changed == 0 {
            if self.id_exists::<E>(entity.id())? {
                return Err(RepoError::ConcurrencyConflict {
                    entity: E::NAME,
                    id: entity.id(),
                    row_version: entity.row_version(),
                });
            }
            return Err(RepoError::not_found::<E>(format!("id={}", entity.id())));
        }

        self.reload::<E>(entity.id())
    }

    fn delete_row<E: Entity>(&self, id: EntityId) -> RepoResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1;", E::TABLE);
        let changed = self.conn.prepare_cached(&sql)?.execute([id])?;
        if changed == 0 {
            return Err(RepoError::not_found::<E>(format!("id={id}")));
        }
        Ok(())
    }

    fn reload<E: Entity>(&self, id: EntityId) -> RepoResult<E> {
        self.get_by_id::<E>(id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("{} {id} vanished after write", E::NAME))
        })
    }

    fn id_exists<E: Entity>(&self, id: EntityId) -> RepoResult<bool> {
        self.exists_where::<E>(&Filter::eq("id", id))
    }

    fn select<E: Entity>(
        &self,
        filter: &Filter,
        window: Option<(i64, i64)>,
    ) -> RepoResult<Vec<E>> {
        let (where_sql, mut binds) = filter.to_sql();
        let mut sql = format!("SELECT * FROM {} WHERE {where_sql} ORDER BY id ASC", E::TABLE);
        if let Some((limit, offset)) = window {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(Value::Integer(limit));
            binds.push(Value::Integer(offset));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(E::from_row(row)?);
        }
        Ok(entities)
    }
}

impl RepositoryBase for SqliteRepository<'_> {
    fn add<E: Entity>(&self, entity: &E) -> RepoResult<E> {
        self.insert_row(entity)
    }

    fn add_all<E: Entity>(&self, entities: &mut [E]) -> RepoResult<bool> {
        if entities.is_empty() {
            return Ok(false);
        }
        let stored = self.atomically(|| {
            entities
                .iter()
                .map(|entity| self.insert_row(entity))
                .collect::<RepoResult<Vec<E>>>()
        })?;
        for (slot, fresh) in entities.iter_mut().zip(stored) {
            *slot = fresh;
        }
        Ok(true)
    }

    fn update<E: Entity>(&self, entity: &E) -> RepoResult<E> {
        self.update_row(entity)
    }

    fn update_all<E: Entity>(&self, entities: &mut [E]) -> RepoResult<()> {
        let stored = self.atomically(|| {
            entities
                .iter()
                .map(|entity| self.update_row(entity))
                .collect::<RepoResult<Vec<E>>>()
        })?;
        for (slot, fresh) in entities.iter_mut().zip(stored) {
            *slot = fresh;
        }
        Ok(())
    }

    fn delete<E: Entity>(&self, entity: &E) -> RepoResult<()> {
        self.delete_row::<E>(entity.id())
    }

    fn delete_many<E: Entity>(&self, entities: &[E]) -> RepoResult<usize> {
        self.atomically(|| {
            for entity in entities {
                self.delete_row::<E>(entity.id())?;
            }
            Ok(entities.len())
        })
    }

    fn delete_where<E: Entity>(&self, filter: &Filter) -> RepoResult<usize> {
        let (where_sql, binds) = filter.to_sql();
        let sql = format!("DELETE FROM {} WHERE {where_sql};", E::TABLE);
        self.atomically(|| Ok(self.conn.execute(&sql, params_from_iter(binds))?))
    }

    fn delete_all<E: Entity>(&self) -> RepoResult<usize> {
        let sql = format!(
            "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} ORDER BY id LIMIT ?1);",
            table = E::TABLE
        );
        let limit = i64::from(self.batch_size);
        let mut total = 0;
        loop {
            let deleted = self.atomically(|| Ok(self.conn.execute(&sql, [limit])?))?;
            total += deleted;
            debug!(
                "event=delete_all_batch module=repo status=ok table={} rows={} total={}",
                E::TABLE,
                deleted,
                total
            );
            if deleted < self.batch_size as usize {
                break;
            }
        }
        Ok(total)
    }

    fn exists_where<E: Entity>(&self, filter: &Filter) -> RepoResult<bool> {
        let (where_sql, binds) = filter.to_sql();
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {where_sql});",
            E::TABLE
        );
        let exists: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(exists == 1)
    }

    fn exists<E: Entity>(&self, entity: &E) -> RepoResult<bool> {
        self.id_exists::<E>(entity.id())
    }

    fn find<E: Entity>(&self, filter: &Filter) -> RepoResult<Option<E>> {
        Ok(self.select(filter, Some((1, 0)))?.into_iter().next())
    }

    fn find_all<E: Entity>(&self, filter: &Filter) -> RepoResult<Vec<E>> {
        self.select(filter, None)
    }

    fn find_page<E: Entity>(
        &self,
        filter: &Filter,
        page_size: u32,
        page: u32,
    ) -> RepoResult<Vec<E>> {
        let window = page_window(page_size, page)?;
        self.select(filter, Some(window))
    }

    fn fetch_all<E: Entity>(&self) -> RepoResult<Vec<E>> {
        self.select(&Filter::All, None)
    }

    fn fetch_page<E: Entity>(&self, page_size: u32, page: u32) -> RepoResult<Vec<E>> {
        self.find_page(&Filter::All, page_size, page)
    }

    fn count_where<E: Entity>(&self, filter: &Filter) -> RepoResult<u64> {
        let (where_sql, binds) = filter.to_sql();
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {where_sql};", E::TABLE);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Converts a 1-based page request into `(limit, offset)`.
pub(crate) fn page_window(page_size: u32, page: u32) -> RepoResult<(i64, i64)> {
    if page == 0 || page_size == 0 {
        return Err(ValidationError::InvalidPagination { page, page_size }.into());
    }
    let limit = i64::from(page_size);
    Ok((limit, limit.saturating_mul(i64::from(page) - 1)))
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::page_window;
    use crate::model::ValidationError;
    use crate::repo::error::RepoError;

    #[test]
    fn page_window_is_one_based() {
        assert_eq!(page_window(10, 1).unwrap(), (10, 0));
        assert_eq!(page_window(10, 3).unwrap(), (10, 20));
    }

    #[test]
    fn page_window_rejects_zero() {
        for (page_size, page) in [(0, 1), (10, 0)] {
            let err = page_window(page_size, page).unwrap_err();
            assert!(matches!(
                err,
                RepoError::Validation(ValidationError::InvalidPagination { .. })
            ));
        }
    }
}
