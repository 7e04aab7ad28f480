//! Integration tests for the REST API: upload, view, tags, listing, delete.

use std::path::Path;

use image_vault::container::frame;
use image_vault::crypto::{derive_key, encrypt_cbc, IV_LEN};
use image_vault::metadata::ImageMeta;
use image_vault::server::{build_router, AppState};
use image_vault::ImageStore;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

const MAX_UPLOAD: usize = 64 * 1024;

/// Start a server over a fresh storage directory. Returns (base_url, storage dir).
async fn start_test_server() -> (String, TempDir) {
    let storage = tempfile::tempdir().expect("Failed to create temp dir");
    let public = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(public.path().join("index.html"), "<h1>vault</h1>").unwrap();

    let store = ImageStore::open(storage.path()).expect("Failed to open store");
    let app = build_router(AppState::new(store, 4), public.path(), MAX_UPLOAD);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = public;
    });

    (format!("http://{}", addr), storage)
}

fn upload_form(file_name: &str, bytes: &[u8], key: &str) -> Form {
    let part = Part::bytes(bytes.to_vec())
        .file_name(file_name.to_string())
        .mime_str("image/jpeg")
        .unwrap();
    Form::new().part("image", part).text("key", key.to_string())
}

/// Upload and return the new id
async fn upload(base_url: &str, form: Form) -> String {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/encrypt", base_url))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200, "Upload failed");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    body["id"].as_str().unwrap().to_string()
}

/// Container with a fixed IV, so a wrong key is guaranteed to fail unpadding
fn write_fixed_container(dir: &Path, id: &str) {
    let iv = [0xa5u8; IV_LEN];
    let ciphertext = encrypt_cbc(&derive_key(b"hunter2"), &iv, b"FAKE JPEG DATA 1234567890");
    let meta = ImageMeta::new(id, "fixed.jpg", "image/jpeg", 25);
    let data = frame(&meta, &iv, &ciphertext).unwrap();
    std::fs::write(dir.join(format!("{}.enc", id)), data).unwrap();
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_upload_and_decrypt() {
    let (base_url, _storage) = start_test_server().await;
    let form = upload_form("cat.jpg", b"\xff\xd8\xffcat pixels", "pass1234")
        .text("tags", "Pets, cats");
    let id = upload(&base_url, form).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/api/decrypt/{}", base_url, id))
        .json(&json!({ "key": "pass1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["image"], "data:image/jpeg;base64,/9j/Y2F0IHBpeGVscw==");
    assert_eq!(body["metadata"]["id"], id.as_str());
    assert_eq!(body["metadata"]["originalName"], "cat.jpg");
    assert_eq!(body["metadata"]["tags"], json!(["pets", "cats"]));
}

#[tokio::test]
async fn test_wrong_key_is_unauthorized() {
    let (base_url, storage) = start_test_server().await;
    write_fixed_container(storage.path(), "fixed1");
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/decrypt/fixed1", base_url))
        .json(&json!({ "key": "hunter3" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid decryption key");

    let resp = client
        .post(format!("{}/api/decrypt/fixed1", base_url))
        .json(&json!({ "key": "hunter2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_malformed_container_is_unprocessable() {
    let (base_url, storage) = start_test_server().await;
    // Length prefix claims far more metadata than the file holds
    std::fs::write(storage.path().join("broken.enc"), [0x00, 0x00, 0xff, 0xff, b'{']).unwrap();
    let client = reqwest::Client::new();

    for route in ["decrypt/broken", "thumbnail/broken", "images/broken/download"] {
        let resp = client
            .post(format!("{}/api/{}", base_url, route))
            .json(&json!({ "key": "hunter2" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 422, "route {}", route);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Corrupted image container");
    }
}

#[tokio::test]
async fn test_upload_validation() {
    let (base_url, _storage) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/encrypt", base_url))
        .multipart(upload_form("cat.jpg", b"pixels", "abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Encryption key must be at least 4 characters");

    let resp = client
        .post(format!("{}/api/encrypt", base_url))
        .multipart(upload_form("notes.txt", b"text", "pass1234"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/encrypt", base_url))
        .multipart(Form::new().text("key", "pass1234"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/encrypt", base_url))
        .multipart(upload_form("big.jpg", &vec![0u8; MAX_UPLOAD * 2], "pass1234"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
}

#[tokio::test]
async fn test_missing_key_and_unknown_image() {
    let (base_url, _storage) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/decrypt/nope", base_url))
        .json(&json!({ "key": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Decryption key is required");

    let resp = client
        .post(format!("{}/api/decrypt/nope", base_url))
        .json(&json!({ "key": "pass1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Image not found");
}

#[tokio::test]
async fn test_update_tags() {
    let (base_url, _storage) = start_test_server().await;
    let id = upload(&base_url, upload_form("dog.jpg", b"dog pixels", "pass1234")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/images/{}/tags", base_url, id))
        .json(&json!({ "key": "pass1234", "tags": ["Beach", "beach", " 2024 "] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["tags"], json!(["beach", "2024"]));

    let resp = client
        .get(format!("{}/api/images?tag=BEACH", base_url))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(body["images"][0]["id"], id.as_str());

    let resp = client
        .post(format!("{}/api/decrypt/{}", base_url, id))
        .json(&json!({ "key": "pass1234" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["image"], "data:image/jpeg;base64,ZG9nIHBpeGVscw==");
    assert!(body["metadata"]["updatedAt"].is_string());
}

#[tokio::test]
async fn test_albums_and_listing() {
    let (base_url, _storage) = start_test_server().await;
    upload(&base_url, upload_form("a.jpg", b"one", "pass1234")).await;
    let trip_form = upload_form("b.jpg", b"two", "pass1234").text("album", "trip");
    let trip_id = upload(&base_url, trip_form).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/api/albums", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body["albums"],
        json!([{ "name": "default", "imageCount": 1 }, { "name": "trip", "imageCount": 1 }])
    );

    let body: Value = client
        .get(format!("{}/api/albums/trip/images", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["images"].as_array().unwrap().len(), 1);
    assert_eq!(body["images"][0]["id"], trip_id.as_str());
    assert_eq!(body["images"][0]["album"], "trip");

    let resp = client
        .get(format!("{}/api/albums/missing/images", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = client
        .get(format!("{}/api/images?perPage=1&page=2", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["page"], 2);
    assert_eq!(body["perPage"], 1);
    assert_eq!(body["images"].as_array().unwrap().len(), 1);

    let body: Value = client
        .post(format!("{}/api/thumbnail/{}", base_url, trip_id))
        .json(&json!({ "key": "pass1234" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["metadata"]["album"], "trip");
    assert_eq!(body["thumbnail"], "data:image/jpeg;base64,dHdv");
}

#[tokio::test]
async fn test_download_and_delete() {
    let (base_url, storage) = start_test_server().await;
    let id = upload(&base_url, upload_form("my photo.jpg", b"raw bytes", "pass1234")).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/images/{}/download", base_url, id))
        .json(&json!({ "key": "pass1234" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"my_photo.jpg\""
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"raw bytes");

    let resp = client
        .delete(format!("{}/api/images/{}", base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!storage.path().join(format!("{}.enc", id)).exists());

    let resp = client
        .delete(format!("{}/api/images/{}", base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_static_frontend_fallback() {
    let (base_url, _storage) = start_test_server().await;

    let resp = reqwest::get(format!("{}/index.html", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "<h1>vault</h1>");
}
