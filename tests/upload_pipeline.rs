mod common;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shoebox::models::{Album, AlbumChanges, NewAlbum, Photo};
use shoebox::services::catalog::Catalog;
use shoebox::services::naming::{
    FilenameResolver, NameRegistry, NameScope, RenamedFile, ResolveError,
};
use shoebox::services::storage::{QuotaError, StorageAccountant};
use shoebox::services::upload::{IncomingFile, PhotoUpload, UploadError, UploadTransaction};
use shoebox::utils::file::FileManager;
use tempfile::TempDir;
use time::OffsetDateTime;

use common::{image_bytes, is_renamed_from};

/// In-memory records with switchable failures.
#[derive(Default)]
struct FakeCatalog {
    photos: Mutex<Vec<String>>,
    covers: Mutex<Vec<(i64, String)>>,
    all_names_taken: bool,
    fail_inserts: bool,
    /// `(dir, name)`: a directory appears at `dir/name` right after the
    /// lookup of `name`, so writing that file fails.
    squat: Option<(PathBuf, String)>,
}

impl FakeCatalog {
    fn failing() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    fn saturated() -> Self {
        Self {
            all_names_taken: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl NameRegistry for FakeCatalog {
    async fn photo_name_taken(&self, filename: &str) -> Result<bool, sqlx::Error> {
        if let Some((dir, name)) = &self.squat
            && name == filename
        {
            std::fs::create_dir_all(dir.join(name)).unwrap();
            return Ok(false);
        }
        Ok(self.all_names_taken || self.photos.lock().unwrap().iter().any(|n| n == filename))
    }

    async fn cover_name_taken(
        &self,
        filename: &str,
        except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        Ok(self
            .covers
            .lock()
            .unwrap()
            .iter()
            .any(|(id, n)| n == filename && Some(*id) != except_album))
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn album_title_taken(
        &self,
        _title: &str,
        _except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        Ok(false)
    }

    async fn insert_photo(
        &self,
        album_id: Option<i64>,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<Photo, sqlx::Error> {
        if self.fail_inserts {
            return Err(sqlx::Error::Protocol("insert rejected".to_string()));
        }
        let mut photos = self.photos.lock().unwrap();
        photos.push(filename.to_string());
        Ok(Photo {
            id: photos.len() as i64,
            album_id,
            filename: filename.to_string(),
            caption: caption.map(str::to_string),
            uploaded_at: OffsetDateTime::now_utc(),
        })
    }

    async fn insert_album(
        &self,
        new_album: &NewAlbum,
        cover_filename: &str,
    ) -> Result<Album, sqlx::Error> {
        if self.fail_inserts {
            return Err(sqlx::Error::Protocol("insert rejected".to_string()));
        }
        let mut covers = self.covers.lock().unwrap();
        let id = covers.len() as i64 + 2;
        covers.push((id, cover_filename.to_string()));
        Ok(Album {
            id,
            title: new_album.title.clone(),
            description: new_album.description.clone(),
            cover_filename: cover_filename.to_string(),
            password_hash: new_album.password_hash.clone(),
        })
    }

    async fn update_album(
        &self,
        album_id: i64,
        changes: &AlbumChanges,
    ) -> Result<Album, sqlx::Error> {
        if self.fail_inserts {
            return Err(sqlx::Error::Protocol("update rejected".to_string()));
        }
        Ok(Album {
            id: album_id,
            title: changes.title.clone().unwrap_or_else(|| "Album".to_string()),
            description: None,
            cover_filename: changes.cover_filename.clone().unwrap_or_default(),
            password_hash: None,
        })
    }
}

fn pipeline(dir: &Path, ceiling: u64, catalog: impl Into<Arc<FakeCatalog>>) -> UploadTransaction {
    let catalog: Arc<FakeCatalog> = catalog.into();
    UploadTransaction::new(
        StorageAccountant::new(dir, ceiling),
        FilenameResolver::new(dir, catalog.clone()),
        catalog,
    )
}

fn photo(name: &str, size: usize) -> PhotoUpload {
    PhotoUpload {
        file: IncomingFile::new(name, image_bytes(size)),
        caption: None,
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test_log::test(tokio::test)]
async fn accountant_reports_headroom() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("existing.png"), image_bytes(900)).unwrap();
    let accountant = StorageAccountant::new(dir.path(), 1000);

    assert_eq!(accountant.current_usage().await.unwrap(), 900);
    match accountant.ensure_fits(150, 0).await {
        Err(QuotaError::Exceeded(quota)) => {
            assert_eq!(quota.headroom(), 100);
            assert_eq!(quota.usage, 900);
        }
        other => panic!("expected quota rejection, got {other:?}"),
    }
    assert_eq!(accountant.ensure_fits(100, 0).await.unwrap(), 900);
    // replacing a 200 byte file frees its space
    assert!(accountant.ensure_fits(250, 200).await.is_ok());
    assert!(!accountant.would_exceed(900, 300, 200));
    assert!(accountant.would_exceed(900, 301, 200));
}

#[test_log::test(tokio::test)]
async fn accountant_treats_missing_directory_as_empty() {
    let dir = TempDir::new().unwrap();
    let accountant = StorageAccountant::new(dir.path().join("not-there"), 10);

    assert_eq!(accountant.current_usage().await.unwrap(), 0);
}

#[test_log::test(tokio::test)]
async fn permanent_collision_gives_up_after_five_attempts() {
    let dir = TempDir::new().unwrap();
    let resolver = FilenameResolver::new(dir.path(), Arc::new(FakeCatalog::saturated()));

    let err = resolver
        .resolve("busy.png", NameScope::Photos)
        .await
        .unwrap_err();

    match err {
        ResolveError::Conflict { original, attempts } => {
            assert_eq!(original, "busy.png");
            assert_eq!(attempts, 5);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn name_held_by_a_photo_record_is_renamed() {
    let dir = TempDir::new().unwrap();
    let catalog = FakeCatalog::default();
    catalog.photos.lock().unwrap().push("photo.jpg".to_string());
    let resolver = FilenameResolver::new(dir.path(), Arc::new(catalog));

    let resolved = resolver.resolve("photo.jpg", NameScope::Photos).await.unwrap();

    assert!(is_renamed_from(&resolved.name, "photo", ".jpg"), "got {}", resolved.name);
    assert_eq!(
        resolved.rename(),
        Some(RenamedFile {
            original: "photo.jpg".to_string(),
            stored_as: resolved.name.clone(),
        })
    );
}

#[test_log::test(tokio::test)]
async fn usage_returns_to_baseline_after_delete() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("base.png"), image_bytes(40)).unwrap();
    let uploads = pipeline(dir.path(), 1_000_000, FakeCatalog::default());
    let before = uploads.accountant().current_usage().await.unwrap();

    let report = uploads
        .upload_photos(None, NameScope::Photos, vec![photo("extra.gif", 300)])
        .await
        .unwrap();
    assert_eq!(report.success_count, 1);
    assert_eq!(uploads.accountant().current_usage().await.unwrap(), before + 300);

    let stored = &report.uploaded[0].photo.filename;
    assert!(FileManager::remove_file(&dir.path().join(stored)).await.unwrap());
    assert_eq!(uploads.accountant().current_usage().await.unwrap(), before);
}

#[test_log::test(tokio::test)]
async fn empty_sanitized_name_is_invalid() {
    let dir = TempDir::new().unwrap();
    let resolver = FilenameResolver::new(dir.path(), Arc::new(FakeCatalog::default()));

    let err = resolver.resolve("../..", NameScope::Photos).await.unwrap_err();
    assert!(matches!(err, ResolveError::InvalidName(_)));
}

#[test_log::test(tokio::test)]
async fn reserved_names_are_not_handed_out_twice() {
    let dir = TempDir::new().unwrap();
    let resolver = FilenameResolver::new(dir.path(), Arc::new(FakeCatalog::default()));

    let held = resolver.resolve("same.png", NameScope::Photos).await.unwrap();
    assert_eq!(held.name, "same.png");
    assert!(!held.was_renamed());

    let second = resolver.resolve("same.png", NameScope::Photos).await.unwrap();
    assert!(second.was_renamed());
    assert!(is_renamed_from(&second.name, "same", ".png"), "got {}", second.name);

    drop(held);
    assert!(!resolver.reservations().is_reserved("same.png"));
    let third = resolver.resolve("same.png", NameScope::Photos).await.unwrap();
    assert_eq!(third.name, "same.png");
}

#[test_log::test(tokio::test)]
async fn concurrent_resolutions_get_distinct_names() {
    let dir = TempDir::new().unwrap();
    let resolver = Arc::new(FilenameResolver::new(
        dir.path(),
        Arc::new(FakeCatalog::default()),
    ));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let resolver = Arc::clone(&resolver);
        tasks.spawn(async move { resolver.resolve("race.jpg", NameScope::Photos).await });
    }

    let mut held = Vec::new();
    while let Some(result) = tasks.join_next().await {
        held.push(result.unwrap().unwrap());
    }
    let names: HashSet<&str> = held.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names.len(), 4);
    assert!(names.contains("race.jpg"));
}

#[test_log::test(tokio::test)]
async fn album_may_keep_its_own_cover_name() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cover.png"), b"old").unwrap();
    let catalog = FakeCatalog::default();
    catalog.covers.lock().unwrap().push((7, "cover.png".to_string()));
    let resolver = FilenameResolver::new(dir.path(), Arc::new(catalog));

    let own = resolver
        .resolve(
            "cover.png",
            NameScope::CoverOf {
                album_id: 7,
                keep: Some("cover.png"),
            },
        )
        .await
        .unwrap();
    assert_eq!(own.name, "cover.png");
    drop(own);

    let other = resolver
        .resolve(
            "cover.png",
            NameScope::CoverOf {
                album_id: 8,
                keep: None,
            },
        )
        .await
        .unwrap();
    assert!(other.was_renamed());
}

#[test_log::test(tokio::test)]
async fn failed_record_insert_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let uploads = pipeline(dir.path(), 1_000_000, FakeCatalog::failing());

    let report = uploads
        .upload_photos(Some(1), NameScope::PhotosAndCovers, vec![photo("orphan.png", 64)])
        .await
        .unwrap();

    assert_eq!(report.success_count, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(files_in(dir.path()).is_empty());
}

#[test_log::test(tokio::test)]
async fn failed_write_is_reported_and_batch_continues() {
    let dir = TempDir::new().unwrap();
    let catalog = Arc::new(FakeCatalog {
        squat: Some((dir.path().to_path_buf(), "blocked.png".to_string())),
        ..FakeCatalog::default()
    });
    let uploads = pipeline(dir.path(), 1_000_000, Arc::clone(&catalog));

    let report = uploads
        .upload_photos(
            Some(1),
            NameScope::PhotosAndCovers,
            vec![photo("blocked.png", 32), photo("fine.png", 32)],
        )
        .await
        .unwrap();

    assert_eq!(report.success_count, 1);
    assert_eq!(report.uploaded[0].photo.filename, "fine.png");
    assert_eq!(report.errors, ["Server error uploading \"blocked.png\"."]);
    assert_eq!(*catalog.photos.lock().unwrap(), ["fine.png"]);
    // only the squatting directory and the good upload remain
    assert!(dir.path().join("blocked.png").is_dir());
    assert_eq!(files_in(dir.path()), ["blocked.png", "fine.png"]);
}

#[test_log::test(tokio::test)]
async fn failed_album_insert_removes_cover() {
    let dir = TempDir::new().unwrap();
    let uploads = pipeline(dir.path(), 1_000_000, FakeCatalog::failing());

    let result = uploads
        .create_album(
            NewAlbum {
                title: "Broken".to_string(),
                description: None,
                password_hash: None,
            },
            IncomingFile::new("broken.png", image_bytes(64)),
        )
        .await;

    assert!(matches!(result, Err(UploadError::Db(_))));
    assert!(files_in(dir.path()).is_empty());
}

#[test_log::test(tokio::test)]
async fn batch_is_checked_as_a_whole() {
    let dir = TempDir::new().unwrap();
    let uploads = pipeline(dir.path(), 100, FakeCatalog::default());

    let result = uploads
        .upload_photos(
            None,
            NameScope::Photos,
            vec![photo("a.png", 60), photo("b.png", 60)],
        )
        .await;

    match result {
        Err(UploadError::Quota(quota)) => {
            assert_eq!(quota.incoming, 120);
            assert_eq!(quota.headroom(), 100);
        }
        other => panic!("expected quota rejection, got {other:?}"),
    }
    assert!(files_in(dir.path()).is_empty());
}

#[test_log::test(tokio::test)]
async fn cover_replacement_counts_the_old_cover_as_freed() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("old.png"), image_bytes(80)).unwrap();
    let uploads = pipeline(dir.path(), 100, FakeCatalog::default());
    let album = Album {
        id: 3,
        title: "Swap".to_string(),
        description: None,
        cover_filename: "old.png".to_string(),
        password_hash: None,
    };

    let outcome = uploads
        .update_album(
            &album,
            AlbumChanges::default(),
            Some(IncomingFile::new("new.png", image_bytes(90))),
        )
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.album.cover_filename, "new.png");
    assert!(outcome.warnings.is_empty());
    assert_eq!(files_in(dir.path()), ["new.png"]);
}

#[test_log::test(tokio::test)]
async fn failed_cover_update_keeps_in_place_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("keep.png"), b"old").unwrap();
    let uploads = pipeline(dir.path(), 1_000_000, FakeCatalog::failing());
    let album = Album {
        id: 4,
        title: "Keep".to_string(),
        description: None,
        cover_filename: "keep.png".to_string(),
        password_hash: None,
    };

    let result = uploads
        .update_album(
            &album,
            AlbumChanges::default(),
            Some(IncomingFile::new("keep.png", image_bytes(16))),
        )
        .await;

    assert!(matches!(result, Err(UploadError::Db(_))));
    assert_eq!(files_in(dir.path()), ["keep.png"]);
}

#[test]
fn sanitizing_matches_stored_name_rules() {
    use shoebox::services::naming::sanitize_filename;

    assert_eq!(sanitize_filename("My Photo.JPG"), "My_Photo.JPG");
    assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
    assert_eq!(sanitize_filename("C:\\Users\\me\\pic.png"), "C_Users_me_pic.png");
    assert_eq!(
        sanitize_filename("con.png"),
        if cfg!(windows) { "_con.png" } else { "con.png" }
    );
    assert_eq!(sanitize_filename("résumé.gif"), "resume.gif");
    assert_eq!(sanitize_filename("Ｐｈｏｔｏ.png"), "Photo.png");
    assert_eq!(sanitize_filename("..."), "");
}
