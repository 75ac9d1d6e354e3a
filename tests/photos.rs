mod common;

use reqwest::{StatusCode, multipart};
use serde_json::{Value, json};
use sqlx::SqlitePool;

use common::{image_part, is_renamed_from, spawn_app, spawn_app_with};

#[sqlx::test]
async fn batch_upload_stores_files_and_captions(pool: SqlitePool) {
    let app = spawn_app(pool).await;

    let response = app
        .upload("/api/albums/1/photos", &[("one.png", 10), ("Two.JPG", 20)])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let report: Value = response.json().await.unwrap();
    assert_eq!(report["success_count"], 2);
    assert!(report["renamed"].as_array().unwrap().is_empty());
    assert!(report["errors"].as_array().unwrap().is_empty());
    assert_eq!(report["uploaded"][0]["caption"], "caption 0");
    assert_eq!(report["uploaded"][1]["filename"], "Two.JPG");
    assert_eq!(report["uploaded"][1]["album_id"], 1);
    assert_eq!(report["uploaded"][1]["url"], "/uploads/Two.JPG");

    assert!(app.has_file("one.png"));
    assert!(app.has_file("Two.JPG"));
}

#[sqlx::test]
async fn colliding_name_is_renamed(pool: SqlitePool) {
    let app = spawn_app(pool).await;
    app.upload("/api/albums/1/photos", &[("photo.jpg", 10)]).await;

    let report: Value = app
        .upload("/api/albums/1/photos", &[("photo.jpg", 12)])
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(report["success_count"], 1);
    let stored = report["uploaded"][0]["filename"].as_str().unwrap();
    assert!(is_renamed_from(stored, "photo", ".jpg"), "got {stored}");
    assert_eq!(
        report["renamed"],
        json!([{ "original": "photo.jpg", "stored_as": stored }])
    );
    assert!(app.has_file("photo.jpg"));
    assert!(app.has_file(stored));
}

#[sqlx::test]
async fn names_are_sanitized(pool: SqlitePool) {
    let app = spawn_app(pool).await;

    let report: Value = app
        .upload("/api/albums/1/photos", &[("../../etc/my holiday.png", 10)])
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(report["uploaded"][0]["filename"], "etc_my_holiday.png");
    assert!(app.has_file("etc_my_holiday.png"));
}

#[sqlx::test]
async fn in_batch_duplicates_are_skipped(pool: SqlitePool) {
    let app = spawn_app(pool).await;

    let report: Value = app
        .upload(
            "/api/albums/1/photos",
            &[("same.png", 10), ("same.png", 11), ("other.png", 12)],
        )
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(report["success_count"], 2);
    assert_eq!(report["duplicates"], json!(["same.png"]));
    assert_eq!(
        app.stored_files(),
        ["default_cover.png", "other.png", "same.png"]
    );
}

#[sqlx::test]
async fn invalid_items_do_not_stop_the_batch(pool: SqlitePool) {
    let app = spawn_app(pool).await;

    let report: Value = app
        .upload(
            "/api/albums/1/photos",
            &[("notes.txt", 10), ("empty.png", 0), ("ok.gif", 10)],
        )
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(report["success_count"], 1);
    assert_eq!(report["errors"].as_array().unwrap().len(), 2);
    assert!(app.has_file("ok.gif"));
    assert!(!app.has_file("notes.txt"));
    assert!(!app.has_file("empty.png"));
}

#[sqlx::test]
async fn batch_over_quota_writes_nothing(pool: SqlitePool) {
    let app = spawn_app_with(pool, |config| config.max_total_storage_bytes = 10_000).await;

    let response = app.upload("/api/albums/1/photos", &[("first.png", 5_000)]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let before = app.stored_files();

    let response = app
        .upload(
            "/api/albums/1/photos",
            &[("second.png", 3_000), ("third.png", 3_000)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::INSUFFICIENT_STORAGE);

    let body: Value = response.json().await.unwrap();
    assert!(body["headroom_bytes"].as_u64().unwrap() < 5_000);
    assert!(body["message"].as_str().unwrap().contains("storage limit"));
    assert_eq!(app.stored_files(), before);
}

#[sqlx::test]
async fn oversized_request_is_rejected(pool: SqlitePool) {
    let app = spawn_app_with(pool, |config| config.max_request_bytes = 1024).await;

    let response = app.upload("/api/albums/1/photos", &[("big.png", 8 * 1024)]).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!app.has_file("big.png"));
}

#[sqlx::test]
async fn caption_count_must_match(pool: SqlitePool) {
    let app = spawn_app(pool).await;

    let form = multipart::Form::new()
        .part("photos", image_part("a.png", 10))
        .part("photos", image_part("b.png", 10))
        .text("captions", "only one");
    let response = app
        .client
        .post(app.url("/api/albums/1/photos"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored_files(), ["default_cover.png"]);
}

#[sqlx::test]
async fn upload_without_photos_is_rejected(pool: SqlitePool) {
    let app = spawn_app(pool).await;

    let form = multipart::Form::new().text("captions", "lonely caption");
    let response = app
        .client
        .post(app.url("/api/albums/1/photos"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test]
async fn listing_is_newest_first_and_paginated(pool: SqlitePool) {
    let app = spawn_app(pool).await;
    for i in 0..16 {
        app.upload("/api/albums/1/photos", &[(&format!("p{i:02}.png"), 4)])
            .await;
    }

    let first: Value = app
        .client
        .get(app.url("/api/albums/1/photos"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["pagination"]["total"], 16);
    assert_eq!(first["pagination"]["total_pages"], 2);
    assert_eq!(first["data"].as_array().unwrap().len(), 15);
    assert_eq!(first["data"][0]["filename"], "p15.png");
    assert_eq!(first["data"][0]["url"], "/uploads/p15.png");

    let second: Value = app
        .client
        .get(app.url("/api/albums/1/photos?page=abc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["pagination"]["page"], 1);

    let last: Value = app
        .client
        .get(app.url("/api/albums/1/photos?page=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(last["data"].as_array().unwrap().len(), 1);
    assert_eq!(last["data"][0]["filename"], "p00.png");
}

#[sqlx::test]
async fn caption_can_be_edited_and_cleared(pool: SqlitePool) {
    let app = spawn_app(pool).await;
    let report: Value = app
        .upload("/api/albums/1/photos", &[("c.png", 4)])
        .await
        .json()
        .await
        .unwrap();
    let photo_id = report["uploaded"][0]["id"].as_i64().unwrap();

    let photo: Value = app
        .client
        .patch(app.url(&format!("/api/albums/1/photos/{photo_id}")))
        .json(&json!({ "caption": "  sunset  " }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(photo["caption"], "sunset");

    let photo: Value = app
        .client
        .patch(app.url(&format!("/api/albums/1/photos/{photo_id}")))
        .json(&json!({ "caption": "" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(photo["caption"].is_null());
}

#[sqlx::test]
async fn photo_of_another_album_is_forbidden(pool: SqlitePool) {
    let app = spawn_app(pool).await;
    let other = app.create_album("Other", "other.png", None).await["id"]
        .as_i64()
        .unwrap();
    let report: Value = app
        .upload(&format!("/api/albums/{other}/photos"), &[("x.png", 4)])
        .await
        .json()
        .await
        .unwrap();
    let photo_id = report["uploaded"][0]["id"].as_i64().unwrap();

    let response = app
        .client
        .delete(app.url(&format!("/api/albums/1/photos/{photo_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.has_file("x.png"));

    let response = app
        .client
        .delete(app.url("/api/albums/1/photos/9999"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test]
async fn deleting_photo_removes_record_and_file(pool: SqlitePool) {
    let app = spawn_app(pool).await;
    let report: Value = app
        .upload("/api/albums/1/photos", &[("gone.png", 4)])
        .await
        .json()
        .await
        .unwrap();
    let photo_id = report["uploaded"][0]["id"].as_i64().unwrap();

    let response = app
        .client
        .delete(app.url(&format!("/api/albums/1/photos/{photo_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!app.has_file("gone.png"));

    let response = app
        .client
        .delete(app.url(&format!("/api/albums/1/photos/{photo_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test]
async fn delete_all_and_random(pool: SqlitePool) {
    let app = spawn_app(pool).await;

    let random: Value = app
        .client
        .get(app.url("/api/albums/1/photos/random"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(random.is_null());

    app.upload("/api/albums/1/photos", &[("r1.png", 4), ("r2.png", 4)])
        .await;
    let random: Value = app
        .client
        .get(app.url("/api/albums/1/photos/random"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let name = random["filename"].as_str().unwrap();
    assert!(name == "r1.png" || name == "r2.png");

    let body: Value = app
        .client
        .delete(app.url("/api/albums/1/photos"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted"], 2);
    assert_eq!(app.stored_files(), ["default_cover.png"]);
}
