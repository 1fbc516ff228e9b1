use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use cadblocks_core::coordinates::CoordinateRecord;
use cadblocks_core::geometry::Point;
use cadblocks_engine::store::memory::MemoryStore;
use cadblocks_engine::store::{NewBlock, RecordStore};
use cadblocks_server::{AppState, UploadSettings, create_router};
use cadblocks_store::{SeaOrmStore, sqlite_url};
use chrono::Utc;
use serde_json::{Value, json};
use tempfile::TempDir;

const PLAN_DXF: &str = "0\nSECTION\n2\nENTITIES\n0\nLINE\n10\n0.0\n20\n0.0\n30\n0.0\n11\n10.0\n21\n0.0\n31\n0.0\n0\nENDSEC\n0\nSECTION\n2\nBLOCKS\n0\nBLOCK\n2\n*Model_Space\n70\n0\n0\nCIRCLE\n10\n1.0\n20\n1.0\n40\n1.0\n0\nENDBLK\n0\nBLOCK\n2\nDetail1\n70\n0\n0\nCIRCLE\n10\n5.0\n20\n5.0\n30\n0.0\n40\n2.0\n0\nENDBLK\n0\nENDSEC\n0\nEOF\n";

fn server_with(store: Arc<dyn RecordStore>, uploads: UploadSettings) -> TestServer {
    let state = AppState::new(store, uploads);
    let router = create_router(state, None).expect("build router");
    TestServer::new(router).expect("start test server")
}

fn dxf_form(file_name: &str, content: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "dxfFile",
        Part::bytes(content.as_bytes().to_vec())
            .file_name(file_name)
            .mime_type("application/dxf"),
    )
}

async fn seed(store: &MemoryStore, names: &[&str]) {
    let file_id = store.create_file("seed.dxf", Utc::now()).await.unwrap();
    for name in names {
        store
            .create_block(NewBlock {
                name: name.to_string(),
                kind: "BLOCK".to_string(),
                coordinates: vec![CoordinateRecord::Circle {
                    center: Point::new(0.0, 0.0),
                    radius: 1.0,
                }],
                file_id,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn root_reports_liveness() {
    let server = server_with(Arc::new(MemoryStore::new()), UploadSettings::default());
    let response = server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "CAD Block Viewer Backend is Live!");
}

#[tokio::test]
async fn upload_then_list_and_fetch() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone(), UploadSettings::default());

    let response = server
        .post("/api/files/upload")
        .multipart(dxf_form("plan.dxf", PLAN_DXF))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, json!({ "message": "DXF processed successfully" }));
    assert_eq!(store.files()[0].name, "plan.dxf");

    let response = server.get("/api/files/blocks").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let page: Value = response.json();
    assert_eq!(page["totalPages"], 1);
    assert_eq!(page["currentPage"], 1);
    let blocks = page["blocks"].as_array().expect("blocks array");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["name"], "plan");
    assert_eq!(blocks[0]["type"], "ENTITIES");
    assert_eq!(
        blocks[0]["coordinates"],
        json!([{
            "type": "LINE",
            "from": { "x": 0.0, "y": 0.0, "z": 0.0 },
            "to": { "x": 10.0, "y": 0.0, "z": 0.0 }
        }])
    );
    assert_eq!(blocks[1]["name"], "plan - Detail1");
    assert_eq!(blocks[1]["type"], "BLOCK");
    assert!(blocks[1]["createdAt"].is_string());

    let id = blocks[1]["id"].as_i64().expect("numeric id");
    let response = server.get(&format!("/api/files/blocks/{id}")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let block: Value = response.json();
    assert_eq!(
        block["coordinates"],
        json!([{
            "type": "CIRCLE",
            "center": { "x": 5.0, "y": 5.0, "z": 0.0 },
            "radius": 2.0
        }])
    );
    assert_eq!(block["file_id"], store.files()[0].id);
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone(), UploadSettings::default());

    let response = server
        .post("/api/files/upload")
        .multipart(MultipartForm::new().add_text("comment", "no file here"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body, json!({ "message": "No file uploaded" }));

    let response = server.post("/api/files/upload").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(store.files().is_empty());
}

#[tokio::test]
async fn unparsable_upload_is_a_server_error() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone(), UploadSettings::default());

    let response = server
        .post("/api/files/upload")
        .multipart(dxf_form("broken.dxf", "not\na\ndrawing\n"))
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["message"], "Error processing the DXF file");
    assert!(body["error"].as_str().is_some_and(|detail| !detail.is_empty()));
    assert!(store.files().is_empty());
}

#[tokio::test]
async fn uploads_are_archived_when_configured() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("uploads");
    let uploads = UploadSettings {
        archive_dir: Some(archive.clone()),
        ..UploadSettings::default()
    };
    let server = server_with(Arc::new(MemoryStore::new()), uploads);

    let response = server
        .post("/api/files/upload")
        .multipart(dxf_form("plan.dxf", PLAN_DXF))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let entries: Vec<_> = std::fs::read_dir(&archive)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries.len(), 1);
    let (millis, name) = entries[0].split_once('_').expect("timestamp prefix");
    assert!(millis.parse::<i64>().is_ok());
    assert_eq!(name, "plan.dxf");
    let saved = std::fs::read_to_string(archive.join(&entries[0])).unwrap();
    assert_eq!(saved, PLAN_DXF);
}

#[tokio::test]
async fn listing_paginates_and_filters() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &["Door", "door frame", "Window", "Stair", "Desk"]).await;
    let server = server_with(store, UploadSettings::default());

    let response = server
        .get("/api/files/blocks")
        .add_query_param("page", 2)
        .add_query_param("pageSize", 2)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let page: Value = response.json();
    assert_eq!(page["totalPages"], 3);
    assert_eq!(page["currentPage"], 2);
    let names: Vec<_> = page["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|block| block["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Window", "Stair"]);

    let response = server
        .get("/api/files/blocks")
        .add_query_param("search", "DOOR")
        .add_query_param("type", "BLOCK")
        .await;
    let page: Value = response.json();
    assert_eq!(page["blocks"].as_array().unwrap().len(), 2);
    assert_eq!(page["totalPages"], 1);

    let response = server
        .get("/api/files/blocks")
        .add_query_param("type", "ENTITIES")
        .await;
    let page: Value = response.json();
    assert!(page["blocks"].as_array().unwrap().is_empty());
    assert_eq!(page["totalPages"], 0);
}

#[tokio::test]
async fn invalid_pagination_is_a_bad_request() {
    let server = server_with(Arc::new(MemoryStore::new()), UploadSettings::default());

    for (key, value) in [("page", "0"), ("pageSize", "0"), ("page", "abc"), ("pageSize", "-5")] {
        let response = server
            .get("/api/files/blocks")
            .add_query_param(key, value)
            .await;
        assert_eq!(
            response.status_code(),
            StatusCode::BAD_REQUEST,
            "{key}={value}"
        );
        let body: Value = response.json();
        assert!(body["message"].is_string());
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn page_size_beyond_the_database_range_is_a_bad_request() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("limits.db");
    let store = SeaOrmStore::connect(&sqlite_url(path.to_str().unwrap()))
        .await
        .unwrap();
    let server = server_with(Arc::new(store), UploadSettings::default());

    for (key, value) in [
        ("pageSize", "9223372036854775808"),
        ("pageSize", "18446744073709551615"),
        ("page", "9223372036854775807"),
    ] {
        let response = server
            .get("/api/files/blocks")
            .add_query_param(key, value)
            .await;
        assert_eq!(
            response.status_code(),
            StatusCode::BAD_REQUEST,
            "{key}={value}"
        );
        let body: Value = response.json();
        assert_eq!(body["message"], "Invalid query parameters.");
        assert!(body["error"].is_string());
    }

    let response = server
        .get("/api/files/blocks")
        .add_query_param("pageSize", "9223372036854775807")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn identical_uploads_create_independent_records() {
    let store = Arc::new(MemoryStore::new());
    let server = server_with(store.clone(), UploadSettings::default());

    for _ in 0..2 {
        let response = server
            .post("/api/files/upload")
            .multipart(dxf_form("plan.dxf", PLAN_DXF))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let files = store.files();
    assert_eq!(files.len(), 2);
    assert_ne!(files[0].id, files[1].id);
    assert!(files.iter().all(|file| file.name == "plan.dxf"));

    let response = server.get("/api/files/blocks").await;
    let page: Value = response.json();
    let blocks = page["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 4);
    let names: Vec<_> = blocks.iter().map(|b| b["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["plan", "plan - Detail1", "plan", "plan - Detail1"]);
    let owners: Vec<_> = blocks.iter().map(|b| b["file_id"].as_i64().unwrap()).collect();
    assert_eq!(owners[0], owners[1]);
    assert_eq!(owners[2], owners[3]);
    assert_ne!(owners[0], owners[2]);
    assert_ne!(blocks[0]["id"], blocks[2]["id"]);
}

#[tokio::test]
async fn missing_or_malformed_ids_are_not_found() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, &["Door"]).await;
    let server = server_with(store, UploadSettings::default());

    for path in ["/api/files/blocks/42", "/api/files/blocks/door"] {
        let response = server.get(path).await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND, "{path}");
        let body: Value = response.json();
        assert_eq!(body, json!({ "message": "Block not found." }));
    }
}

#[tokio::test]
async fn sqlite_backed_service_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("service.db");
    let store = SeaOrmStore::connect(&sqlite_url(path.to_str().unwrap()))
        .await
        .unwrap();
    let server = server_with(Arc::new(store), UploadSettings::default());

    let response = server
        .post("/api/files/upload")
        .multipart(dxf_form("site.plan.dxf", PLAN_DXF))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = server
        .get("/api/files/blocks")
        .add_query_param("search", "detail")
        .await;
    let page: Value = response.json();
    let blocks = page["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["name"], "site.plan - Detail1");

    let id = blocks[0]["id"].as_i64().unwrap();
    let response = server.get(&format!("/api/files/blocks/{id}")).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let block: Value = response.json();
    assert_eq!(block["coordinates"][0]["radius"], 2.0);
}
