use rusqlite::Connection;
use timetrace_core::db::open_db_in_memory;
use timetrace_core::{
    ConfigurationRepository, Filter, Image, ImagePathSetting, ImageRepository, Process,
    ProcessDetail, ProcessRepository, RepoError, RepositoryBase, RepositoryOptions,
    SqliteConfigurationRepository, SqliteImageRepository, SqliteProcessRepository,
    SqliteRepository,
};
use uuid::Uuid;

const BASE_PATH: &str = "/data/images";

fn set_base_path(conn: &Connection, options: &RepositoryOptions, path: &str) {
    let config = SqliteConfigurationRepository::try_new(conn, options).unwrap();
    let ImagePathSetting { index, key } = &options.image_path_setting;
    config
        .add_configuration_setting_detail(index, key, Some(path))
        .unwrap();
}

fn seed_detail(conn: &Connection, options: &RepositoryOptions, description: &str) -> ProcessDetail {
    let processes = SqliteProcessRepository::try_new(conn, options).unwrap();
    let process = match processes.get_process_by_name("P1").unwrap() {
        Some(process) => process,
        None => processes.add_process(&Process::new("P1")).unwrap(),
    };
    processes
        .add_process_detail(&ProcessDetail::new(process.id, description))
        .unwrap()
}

fn image_count(conn: &Connection) -> u64 {
    SqliteRepository::try_new(conn, &RepositoryOptions::default())
        .unwrap()
        .count_where::<Image>(&Filter::All)
        .unwrap()
}

fn assert_path_shape(image: &Image, base: &str) {
    let path = image.image_path.as_deref().unwrap();
    let guid = image.image_guid.to_string();
    assert!(path.starts_with(&format!("{base}/{guid}_")), "{path}");
    assert!(path.ends_with(".jpg"));
    assert_eq!(image.name.len(), guid.len() + 1 + 14 + 4);
    assert!(image.name[guid.len() + 1..guid.len() + 15]
        .chars()
        .all(|c| c.is_ascii_digit()));
    assert!(path.ends_with(&image.name));
}

#[test]
fn add_image_assigns_guid_name_and_path() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions::default();
    set_base_path(&conn, &options, BASE_PATH);
    let detail = seed_detail(&conn, &options, "D1");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let stored = repo.add_image(&Image::new(detail.id)).unwrap();
    assert!(stored.id > 0);
    assert!(!stored.image_guid.is_nil());
    assert_path_shape(&stored, BASE_PATH);

    let loaded = repo.get_image(stored.id).unwrap().unwrap();
    assert_eq!(loaded, stored);
}

#[test]
fn add_image_rejects_zero_or_missing_detail_before_writing() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions::default();
    set_base_path(&conn, &options, BASE_PATH);
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    for process_detail_id in [0, 404] {
        let err = repo.add_image(&Image::new(process_detail_id)).unwrap_err();
        match err {
            RepoError::ReferentialIntegrity { field, id, .. } => {
                assert_eq!(field, "process_detail_id");
                assert_eq!(id, process_detail_id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(image_count(&conn), 0);
}

#[test]
fn add_image_without_base_path_is_missing_configuration() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions::default();
    let detail = seed_detail(&conn, &options, "D1");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let err = repo.add_image(&Image::new(detail.id)).unwrap_err();
    match err {
        RepoError::MissingConfiguration { index, key } => {
            assert_eq!(index, "FilePath");
            assert_eq!(key, "ImagePath");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(image_count(&conn), 0);
}

#[test]
fn custom_image_path_setting_and_trailing_separator() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions {
        image_path_setting: ImagePathSetting {
            index: "Storage".to_string(),
            key: "Pictures".to_string(),
        },
        ..RepositoryOptions::default()
    };
    set_base_path(&conn, &options, "/mnt/pictures/");
    let detail = seed_detail(&conn, &options, "D1");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let stored = repo.add_image(&Image::new(detail.id)).unwrap();
    assert_path_shape(&stored, "/mnt/pictures");

    let resolved = repo.create_image_path_and_name(Uuid::new_v4()).unwrap();
    assert!(resolved.file_path.starts_with("/mnt/pictures/"));
    assert!(resolved.file_path.ends_with(&resolved.file_name));
}

#[test]
fn add_images_is_all_or_nothing() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions::default();
    set_base_path(&conn, &options, BASE_PATH);
    let detail = seed_detail(&conn, &options, "D1");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let mut mixed = vec![Image::new(detail.id), Image::new(0)];
    assert!(matches!(
        repo.add_images(&mut mixed).unwrap_err(),
        RepoError::ReferentialIntegrity { .. }
    ));
    assert_eq!(image_count(&conn), 0);

    let mut images = vec![Image::new(detail.id), Image::new(detail.id)];
    assert!(repo.add_images(&mut images).unwrap());
    assert!(images.iter().all(|image| image.id > 0));
    assert_ne!(images[0].image_guid, images[1].image_guid);
    assert_eq!(image_count(&conn), 2);
}

#[test]
fn update_all_image_paths_rewrites_every_path_and_keeps_guids() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions {
        batch_size: 2,
        ..RepositoryOptions::default()
    };
    set_base_path(&conn, &options, "/old");
    let detail = seed_detail(&conn, &options, "D1");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let mut images: Vec<Image> = (0..5).map(|_| Image::new(detail.id)).collect();
    repo.add_images(&mut images).unwrap();

    set_base_path(&conn, &options, "/new");
    assert_eq!(repo.update_all_image_paths().unwrap(), 5);

    let reloaded = repo.get_images(&Filter::All, 1, 10).unwrap();
    assert_eq!(reloaded.len(), 5);
    for (before, after) in images.iter().zip(reloaded.iter()) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.image_guid, after.image_guid);
        assert!(after.image_path.as_deref().unwrap().starts_with("/new/"));
        assert_eq!(after.row_version, before.row_version + 1);
    }
}

fn path_stamp(path: &str) -> &str {
    let stem = path.trim_end_matches(".jpg");
    &stem[stem.len() - 14..]
}

#[test]
fn update_all_image_paths_uses_one_timestamp_and_keeps_names() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions {
        batch_size: 1,
        ..RepositoryOptions::default()
    };
    set_base_path(&conn, &options, "/old");
    let detail = seed_detail(&conn, &options, "D1");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let mut images: Vec<Image> = (0..4).map(|_| Image::new(detail.id)).collect();
    repo.add_images(&mut images).unwrap();

    set_base_path(&conn, &options, "/new");
    assert_eq!(repo.update_all_image_paths().unwrap(), 4);

    let reloaded = repo.get_images(&Filter::All, 1, 10).unwrap();
    let first_stamp = path_stamp(reloaded[0].image_path.as_deref().unwrap());
    for (before, after) in images.iter().zip(reloaded.iter()) {
        let path = after.image_path.as_deref().unwrap();
        assert_eq!(path_stamp(path), first_stamp);
        assert_eq!(after.name, before.name);
        assert!(path.starts_with(&format!("/new/{}_", after.image_guid)));
    }
}

#[test]
fn queries_and_deletes_by_detail() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions::default();
    set_base_path(&conn, &options, BASE_PATH);
    let first = seed_detail(&conn, &options, "D1");
    let second = seed_detail(&conn, &options, "D2");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let mut images = vec![
        Image::new(first.id),
        Image::new(first.id),
        Image::new(second.id),
    ];
    repo.add_images(&mut images).unwrap();

    assert_eq!(repo.get_images_for_detail(first.id, 1, 10).unwrap().len(), 2);
    assert_eq!(repo.get_images_for_detail(first.id, 1, 1).unwrap().len(), 1);
    assert_eq!(
        repo.get_images_for_details(&[first.id, second.id], 1, 10)
            .unwrap()
            .len(),
        3
    );

    assert_eq!(repo.delete_images_for_detail(first.id).unwrap(), 2);
    assert_eq!(repo.delete_image(&images[2]).unwrap(), 1);
    assert!(matches!(
        repo.delete_image(&images[2]).unwrap_err(),
        RepoError::NotFound { entity: "image", .. }
    ));
    assert_eq!(image_count(&conn), 0);
}

#[test]
fn delete_all_images_in_batches() {
    let conn = open_db_in_memory().unwrap();
    let options = RepositoryOptions {
        batch_size: 4,
        ..RepositoryOptions::default()
    };
    set_base_path(&conn, &options, BASE_PATH);
    let detail = seed_detail(&conn, &options, "D1");
    let repo = SqliteImageRepository::try_new(&conn, &options).unwrap();

    let mut images: Vec<Image> = (0..9).map(|_| Image::new(detail.id)).collect();
    repo.add_images(&mut images).unwrap();

    assert_eq!(repo.delete_images(&images[..2]).unwrap(), 2);
    assert_eq!(repo.delete_all_images().unwrap(), 7);
    assert_eq!(image_count(&conn), 0);
}
