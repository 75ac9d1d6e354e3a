#![allow(dead_code)]

use std::path::Path;
use std::sync::Once;

use reqwest::multipart;
use serde_json::Value;
use shoebox::config::{AppConfig, GalleryMode};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub fn init_tracing_once() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("shoebox=debug")
            .with_test_writer()
            .init();
    });
}

/// A running app with its own upload directory.
pub struct TestApp {
    /// Format: `http://127.0.0.1:8492`
    pub address: String,
    pub client: reqwest::Client,
    pub pool: SqlitePool,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    pub fn upload_path(&self) -> &Path {
        self.upload_dir.path()
    }

    /// Names of all files in the upload directory, sorted.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.upload_path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.upload_path().join(name).is_file()
    }

    /// Creates an album through the API and returns its JSON.
    pub async fn create_album(&self, title: &str, cover_name: &str, password: Option<&str>) -> Value {
        let mut form = multipart::Form::new()
            .text("title", title.to_string())
            .text("description", format!("About {title}"))
            .part("cover", image_part(cover_name, 128));
        if let Some(password) = password {
            form = form.text("password", password.to_string());
        }

        let response = self
            .client
            .post(self.url("/api/albums"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to create album");
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        response.json::<Value>().await.unwrap()["album"].clone()
    }

    /// Uploads photos with matching captions to `path` and returns the response.
    pub async fn upload(&self, path: &str, files: &[(&str, usize)]) -> reqwest::Response {
        let mut form = multipart::Form::new();
        for (i, (name, size)) in files.iter().enumerate() {
            form = form
                .part("photos", image_part(name, *size))
                .text("captions", format!("caption {i}"));
        }
        self.client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to upload photos")
    }
}

/// Spawns the albums layout with default limits.
pub async fn spawn_app(pool: SqlitePool) -> TestApp {
    spawn_app_with(pool, |_| {}).await
}

/// Spawns the single-gallery layout.
pub async fn spawn_single_gallery(pool: SqlitePool) -> TestApp {
    spawn_app_with(pool, |config| config.mode = GalleryMode::Single).await
}

/// Spawns the app after letting `tweak` adjust the configuration.
pub async fn spawn_app_with(pool: SqlitePool, tweak: impl FnOnce(&mut AppConfig)) -> TestApp {
    init_tracing_once();

    let upload_dir = TempDir::new().expect("Failed to create upload dir");
    let mut config = AppConfig::new(upload_dir.path());
    tweak(&mut config);
    shoebox::prepare_storage(&config)
        .await
        .expect("Failed to prepare storage");

    // Randomly choose an available port
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port at localhost");
    let port = listener.local_addr().unwrap().port();

    let app_pool = pool.clone();
    tokio::spawn(async move {
        axum::serve(listener, shoebox::app(app_pool, config))
            .await
            .unwrap();
    });

    let address = format!("http://127.0.0.1:{port}");

    // Wait for server to be ready
    let client = reqwest::Client::new();
    for _ in 0..10 {
        if client
            .get(format!("{address}/health-check"))
            .send()
            .await
            .is_ok()
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    TestApp {
        address,
        client,
        pool,
        upload_dir,
    }
}

/// Filler bytes standing in for image content; only the name is checked.
pub fn image_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub fn image_part(name: &str, size: usize) -> multipart::Part {
    multipart::Part::bytes(image_bytes(size))
        .file_name(name.to_string())
        .mime_str("image/png")
        .unwrap()
}

/// Returns true if `name` is `<stem>_<6 hex><ext>`.
pub fn is_renamed_from(name: &str, stem: &str, ext: &str) -> bool {
    let Some(middle) = name
        .strip_prefix(&format!("{stem}_"))
        .and_then(|rest| rest.strip_suffix(ext))
    else {
        return false;
    };
    middle.len() == 6 && middle.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}
