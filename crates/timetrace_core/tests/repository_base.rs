use std::collections::BTreeSet;
use timetrace_core::db::open_db_in_memory;
use timetrace_core::repo::CompareOp;
use timetrace_core::{
    DbError, Filter, Process, RepoError, RepositoryBase, RepositoryOptions, SqliteRepository,
    ValidationError,
};

fn seed_processes(repo: &SqliteRepository<'_>, count: usize) -> Vec<Process> {
    let mut processes: Vec<Process> = (0..count)
        .map(|n| Process::new(format!("process-{n:03}")))
        .collect();
    assert!(repo.add_all(&mut processes).unwrap());
    processes
}

#[test]
fn add_populates_generated_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let stored = repo.add(&Process::new("P1")).unwrap();
    assert!(stored.id > 0);
    assert_eq!(stored.row_version, 1);
    assert!(stored.updated_at > 0);
    assert!(repo.exists(&stored).unwrap());
}

#[test]
fn add_all_writes_ids_back_and_reports_empty_input() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let processes = seed_processes(&repo, 3);
    let ids: BTreeSet<i64> = processes.iter().map(|process| process.id).collect();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&0));

    let mut empty: Vec<Process> = Vec::new();
    assert!(!repo.add_all(&mut empty).unwrap());
}

#[test]
fn add_all_is_atomic_on_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let mut processes = vec![Process::new("dup"), Process::new("dup")];
    let err = repo.add_all(&mut processes).unwrap_err();
    match err {
        RepoError::Persistence(db_err) => assert!(db_err.is_constraint_violation()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(repo.count_where::<Process>(&Filter::All).unwrap(), 0);
}

#[test]
fn duplicate_insert_is_constraint_violation() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    repo.add(&Process::new("P1")).unwrap();
    let err = repo.add(&Process::new("P1")).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Persistence(DbError::ConstraintViolation { .. })
    ));
}

#[test]
fn update_bumps_row_version_and_detects_stale_token() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let stored = repo.add(&Process::new("P1")).unwrap();
    let mut renamed = stored.clone();
    renamed.name = "P1-renamed".to_string();
    let updated = repo.update(&renamed).unwrap();
    assert_eq!(updated.row_version, stored.row_version + 1);
    assert_eq!(updated.name, "P1-renamed");

    let mut stale = stored.clone();
    stale.name = "stale".to_string();
    let err = repo.update(&stale).unwrap_err();
    match err {
        RepoError::ConcurrencyConflict {
            entity,
            id,
            row_version,
        } => {
            assert_eq!(entity, "process");
            assert_eq!(id, stored.id);
            assert_eq!(row_version, stored.row_version);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn update_missing_row_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let mut ghost = Process::new("ghost");
    ghost.id = 42;
    ghost.row_version = 1;
    let err = repo.update(&ghost).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { entity: "process", .. }));
    assert_eq!(err.to_string(), "process does not exist: id=42");
}

#[test]
fn update_all_rolls_back_whole_batch_on_conflict() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let mut processes = seed_processes(&repo, 3);
    for process in processes.iter_mut() {
        process.name.push_str("-v2");
    }
    processes[2].row_version = 99;

    let err = repo.update_all(&mut processes).unwrap_err();
    assert!(matches!(err, RepoError::ConcurrencyConflict { .. }));

    let stored = repo.fetch_all::<Process>().unwrap();
    assert!(stored.iter().all(|process| !process.name.ends_with("-v2")));
    assert!(stored.iter().all(|process| process.row_version == 1));
}

#[test]
fn update_all_refreshes_tokens() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let mut processes = seed_processes(&repo, 2);
    repo.update_all(&mut processes).unwrap();
    assert!(processes.iter().all(|process| process.row_version == 2));

    // Refreshed tokens allow a second round without conflict.
    repo.update_all(&mut processes).unwrap();
    assert!(processes.iter().all(|process| process.row_version == 3));
}

#[test]
fn find_returns_none_for_zero_matches() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let found = repo
        .find::<Process>(&Filter::eq("name", "nobody".to_string()))
        .unwrap();
    assert!(found.is_none());
    assert!(!repo
        .exists_where::<Process>(&Filter::eq("name", "nobody".to_string()))
        .unwrap());
}

#[test]
fn find_page_partitions_matches() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();
    seed_processes(&repo, 10);

    let filter = Filter::compare("name", CompareOp::Like, "process-%".to_string());
    let first = repo.find_page::<Process>(&filter, 5, 1).unwrap();
    let second = repo.find_page::<Process>(&filter, 5, 2).unwrap();
    let third = repo.find_page::<Process>(&filter, 5, 3).unwrap();

    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);
    assert!(third.is_empty());

    let all = repo.find_all::<Process>(&filter).unwrap();
    let paged: Vec<i64> = first.iter().chain(second.iter()).map(|p| p.id).collect();
    let unpaged: Vec<i64> = all.iter().map(|p| p.id).collect();
    assert_eq!(paged, unpaged);
}

#[test]
fn paging_rejects_zero_page_or_size() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let err = repo.fetch_page::<Process>(10, 0).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::InvalidPagination { page: 0, page_size: 10 })
    ));
    assert!(repo.fetch_page::<Process>(0, 1).is_err());
}

#[test]
fn delete_many_is_atomic_when_one_row_is_missing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let mut processes = seed_processes(&repo, 3);
    processes[1].id = 999;

    let err = repo.delete_many(&processes).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
    assert_eq!(repo.count_where::<Process>(&Filter::All).unwrap(), 3);
}

#[test]
fn delete_where_removes_matching_rows_only() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();
    let processes = seed_processes(&repo, 4);

    let removed = repo
        .delete_where::<Process>(&Filter::one_of(
            "id",
            [processes[0].id, processes[3].id],
        ))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(repo.count_where::<Process>(&Filter::All).unwrap(), 2);
}

#[test]
fn delete_all_loops_over_small_batches() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions {
        batch_size: 3,
        ..RepositoryOptions::default()
    };
    let repo = SqliteRepository::try_new(&conn, &options).unwrap();
    seed_processes(&repo, 10);

    assert_eq!(repo.delete_all::<Process>().unwrap(), 10);
    assert_eq!(repo.count_where::<Process>(&Filter::All).unwrap(), 0);
    assert_eq!(repo.delete_all::<Process>().unwrap(), 0);
}

#[test]
fn atomically_joins_enclosing_transaction() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteRepository::try_new(&conn, &RepositoryOptions::default()).unwrap();

    let result: Result<(), RepoError> = repo.atomically(|| {
        repo.add(&Process::new("inner-1"))?;
        repo.atomically(|| repo.add(&Process::new("inner-2")))?;
        Err(RepoError::InvalidData("abort".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(repo.count_where::<Process>(&Filter::All).unwrap(), 0);
}
