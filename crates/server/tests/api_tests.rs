//! Integration tests for HTTP API endpoints.

mod common;

use axum::http::StatusCode;
use common::{TestServer, md5_hex, seeded_bytes};
use depot_core::ContentKey;
use depot_storage::BlobStore;
use serde_json::Value;

fn content_key(file: &Value) -> ContentKey {
    ContentKey::parse(file["contentKey"].as_str().unwrap()).unwrap()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server.json("GET", "/health", None).await;
    assert_eq!(response.status, StatusCode::OK);

    let body = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "filesystem");
    assert!(body["version"].is_string());
}

// ============================================================================
// Single-shot upload
// ============================================================================

#[tokio::test]
async fn test_upload_returns_file_descriptor() {
    let server = TestServer::new().await;
    let data = seeded_bytes(1, 4096);

    let response = server.upload("report.PDF", &data).await;
    assert_eq!(response.status, StatusCode::OK);

    let file = response.json();
    assert_eq!(file["name"], "report.PDF");
    assert_eq!(file["extension"], ".PDF");
    assert_eq!(file["size"], 4096);
    assert_eq!(file["hash"], md5_hex(&data));
    assert_eq!(file["isDir"], false);
    assert_eq!(file["uploaderId"], 0);
    assert!(file["createdAt"].is_string());

    let key = content_key(&file);
    assert!(server.storage().exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_upload_same_content_shares_blob() {
    let server = TestServer::new().await;
    let data = seeded_bytes(2, 1000);

    let first = server.upload("a.bin", &data).await.json();
    let second = server.upload_declared("b.bin", &data).await.json();

    assert_ne!(first["id"], second["id"]);
    assert_eq!(first["contentKey"], second["contentKey"]);
    assert_eq!(second["name"], "b.bin");
}

#[tokio::test]
async fn test_upload_dedup_hit_skips_body() {
    let server = TestServer::new().await;
    let data = seeded_bytes(3, 2048);
    let original = server.upload("original.bin", &data).await.json();

    // The declared hash and size match stored content, so the part body is never read
    let uri = format!("/upload?md5={}&size={}", md5_hex(&data), data.len());
    let response = server
        .multipart(&uri, &[], &[], Some(("copy.bin", b"ignored".as_slice())))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let copy = response.json();
    assert_eq!(copy["contentKey"], original["contentKey"]);
    assert_eq!(copy["size"], 2048);
    assert_eq!(copy["hash"], md5_hex(&data));
    assert_eq!(copy["name"], "copy.bin");
}

#[tokio::test]
async fn test_upload_declared_hash_from_header_and_form() {
    let server = TestServer::new().await;
    let data = seeded_bytes(4, 512);
    let original = server.upload("seed.bin", &data).await.json();
    let hash = md5_hex(&data);
    let size = data.len().to_string();

    let via_header = server
        .multipart(
            "/upload",
            &[("x-file-md5", hash.as_str()), ("x-file-size", size.as_str())],
            &[],
            Some(("header.bin", b"ignored".as_slice())),
        )
        .await
        .json();
    assert_eq!(via_header["contentKey"], original["contentKey"]);

    let via_form = server
        .multipart(
            "/upload",
            &[],
            &[("md5", hash.as_str()), ("size", size.as_str())],
            Some(("form.bin", b"ignored".as_slice())),
        )
        .await
        .json();
    assert_eq!(via_form["contentKey"], original["contentKey"]);
}

#[tokio::test]
async fn test_upload_query_hash_takes_precedence() {
    let server = TestServer::new().await;
    let data = seeded_bytes(5, 256);
    let original = server.upload("seed.bin", &data).await.json();

    // Query names the stored content; the header names something unknown
    let uri = format!("/upload?md5={}&size={}", md5_hex(&data), data.len());
    let other = md5_hex(b"something else");
    let response = server
        .multipart(
            &uri,
            &[("x-file-md5", other.as_str())],
            &[],
            Some(("dup.bin", b"ignored".as_slice())),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["contentKey"], original["contentKey"]);
}

#[tokio::test]
async fn test_upload_hash_mismatch_records_computed_hash() {
    let server = TestServer::new().await;
    let data = seeded_bytes(6, 300);
    let wrong = md5_hex(b"not the payload");

    let uri = format!("/upload?md5={wrong}");
    let response = server
        .multipart(&uri, &[], &[], Some(("file.bin", &data[..])))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["hash"], md5_hex(&data));
}

#[tokio::test]
async fn test_upload_rejects_malformed_hash() {
    let server = TestServer::new().await;

    let response = server
        .multipart("/upload?md5=xyz", &[], &[], Some(("file.bin", b"data".as_slice())))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["code"], "bad_request");
}

#[tokio::test]
async fn test_upload_without_file_part() {
    let server = TestServer::new().await;

    let response = server
        .multipart("/upload", &[], &[("name", "orphan.txt")], None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let server = TestServer::with_config(|config| {
        config.server.max_upload_size = 16;
    })
    .await;

    let response = server.upload("big.bin", &seeded_bytes(7, 64)).await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response.json()["code"], "payload_too_large");

    let response = server.upload("small.bin", &seeded_bytes(7, 16)).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_upload_records_uploader() {
    let server = TestServer::new().await;

    let response = server
        .multipart(
            "/upload",
            &[("x-uploader-id", "42")],
            &[],
            Some(("mine.txt", b"owned".as_slice())),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["uploaderId"], 42);

    let response = server
        .multipart(
            "/upload",
            &[("x-uploader-id", "not-a-number")],
            &[],
            Some(("mine.txt", b"owned".as_slice())),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_empty_file() {
    let server = TestServer::new().await;

    let response = server.upload("empty.txt", b"").await;
    assert_eq!(response.status, StatusCode::OK);

    let file = response.json();
    assert_eq!(file["size"], 0);
    assert_eq!(file["hash"], "d41d8cd98f00b204e9800998ecf8427e");
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_full_content() {
    let server = TestServer::new().await;
    let data = seeded_bytes(10, 5000);
    let file = server.upload("data set.csv", &data).await.json();
    let id = file["id"].as_str().unwrap();

    let response = server.download(&format!("/download/{id}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), data.as_ref());
    assert_eq!(response.header("content-length"), Some("5000"));
    assert_eq!(response.header("accept-ranges"), Some("bytes"));
    assert_eq!(
        response.header("content-type"),
        Some("application/octet-stream")
    );
    assert_eq!(response.header("x-file-md5"), Some(md5_hex(&data).as_str()));
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename*=UTF-8''data%20set%2Ecsv")
    );
    assert!(response.header("content-range").is_none());
}

#[tokio::test]
async fn test_download_by_query() {
    let server = TestServer::new().await;
    let file = server.upload("q.txt", b"query download").await.json();
    let id = file["id"].as_str().unwrap();

    let response = server.download(&format!("/download?id={id}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), b"query download");

    let response = server.download("/download", None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_range() {
    let server = TestServer::new().await;
    let data = seeded_bytes(11, 1024);
    let file = server.upload("range.bin", &data).await.json();
    let uri = format!("/download/{}", file["id"].as_str().unwrap());

    let response = server.download(&uri, Some("bytes=100-199")).await;
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.as_ref(), &data[100..200]);
    assert_eq!(response.header("content-length"), Some("100"));
    assert_eq!(response.header("content-range"), Some("bytes 100-199/1024"));

    let response = server.download(&uri, Some("bytes=1000-")).await;
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.as_ref(), &data[1000..]);
    assert_eq!(response.header("content-range"), Some("bytes 1000-1023/1024"));
}

#[tokio::test]
async fn test_download_unsatisfiable_range() {
    let server = TestServer::new().await;
    let file = server.upload("small.bin", &seeded_bytes(12, 10)).await.json();
    let uri = format!("/download/{}", file["id"].as_str().unwrap());

    for range in ["bytes=10-20", "bytes=5-2", "bytes=-5", "items=0-1"] {
        let response = server.download(&uri, Some(range)).await;
        assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
        assert_eq!(response.header("content-range"), Some("bytes */10"), "{range}");
        assert_eq!(response.json()["code"], "range_not_satisfiable");
    }
}

#[tokio::test]
async fn test_download_empty_file() {
    let server = TestServer::new().await;
    let file = server.upload("empty.bin", b"").await.json();
    let uri = format!("/download/{}", file["id"].as_str().unwrap());

    let response = server.download(&uri, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert_eq!(response.header("content-length"), Some("0"));

    let response = server.download(&uri, Some("bytes=0-")).await;
    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.header("content-range"), Some("bytes */0"));
}

#[tokio::test]
async fn test_download_unknown_and_malformed_ids() {
    let server = TestServer::new().await;

    let response = server
        .download("/download/0123456789abcdef0123456789abcdef", None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["code"], "not_found");

    let response = server.download("/download/not-an-id", None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Lookup and delete
// ============================================================================

#[tokio::test]
async fn test_get_file() {
    let server = TestServer::new().await;
    let uploaded = server.upload("info.json", b"{}").await.json();
    let id = uploaded["id"].as_str().unwrap();

    let response = server.json("GET", &format!("/files/{id}"), None).await;
    assert_eq!(response.status, StatusCode::OK);
    let fetched = response.json();
    for field in ["id", "name", "extension", "size", "hash", "contentKey", "isDir", "uploaderId"] {
        assert_eq!(fetched[field], uploaded[field], "{field}");
    }

    let response = server
        .json("GET", "/files/0123456789abcdef0123456789abcdef", None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_keeps_shared_content_until_last_reference() {
    let server = TestServer::new().await;
    let data = seeded_bytes(20, 700);
    let first = server.upload("one.bin", &data).await.json();
    let second = server.upload_declared("two.bin", &data).await.json();
    let key = content_key(&first);

    let response = server
        .json("DELETE", &format!("/delete/{}", first["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["blobDeleted"], false);
    assert_eq!(response.json()["id"], first["id"]);
    assert!(server.storage().exists(&key).await.unwrap());

    // The surviving reference still downloads
    let response = server
        .download(&format!("/download/{}", second["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(response.body.as_ref(), data.as_ref());

    let response = server
        .json("DELETE", &format!("/delete/{}", second["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["blobDeleted"], true);
    assert!(!server.storage().exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_delete_twice_is_not_found() {
    let server = TestServer::new().await;
    let file = server.upload("gone.txt", b"bye").await.json();
    let uri = format!("/delete/{}", file["id"].as_str().unwrap());

    assert_eq!(server.json("DELETE", &uri, None).await.status, StatusCode::OK);
    assert_eq!(
        server.json("DELETE", &uri, None).await.status,
        StatusCode::NOT_FOUND
    );

    let response = server
        .download(&format!("/download/{}", file["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_after_delete_stores_fresh_blob() {
    let server = TestServer::new().await;
    let data = seeded_bytes(21, 128);
    let file = server.upload("cycle.bin", &data).await.json();
    server
        .json("DELETE", &format!("/delete/{}", file["id"].as_str().unwrap()), None)
        .await;

    let again = server.upload("cycle.bin", &data).await.json();
    let key = content_key(&again);
    assert!(server.storage().exists(&key).await.unwrap());

    let response = server
        .download(&format!("/download/{}", again["id"].as_str().unwrap()), None)
        .await;
    assert_eq!(response.body.as_ref(), data.as_ref());
}

// ============================================================================
// Metrics
// ============================================================================

#[tokio::test]
async fn test_metrics_endpoint() {
    depot_server::metrics::register_metrics();
    let server = TestServer::new().await;
    server.upload("counted.txt", b"count me").await;

    let response = server.json("GET", "/metrics", None).await;
    assert_eq!(response.status, StatusCode::OK);
    let text = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(text.contains("depot_files_uploaded_total"));
}

#[tokio::test]
async fn test_metrics_can_be_disabled() {
    let server = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;

    let response = server.json("GET", "/metrics", None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
