use std::sync::Arc;

use cadblocks_core::coordinates::{CoordinateRecord, PolylineKind};
use cadblocks_core::drawing::Entity;
use cadblocks_core::geometry::Point;
use cadblocks_engine::store::memory::MemoryStore;
use cadblocks_engine::store::{BlockFilter, NewBlock, RecordStore, StoreError};
use cadblocks_engine::{BlockQuery, BlockQueryService, DrawingIngestor};
use cadblocks_store::migrations::{Migrator, MigratorTrait};
use cadblocks_store::{SeaOrmStore, establish_connection, sqlite_url};
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> SeaOrmStore {
    let path = dir.path().join("blocks.db");
    let url = sqlite_url(path.to_str().expect("utf-8 temp path"));
    SeaOrmStore::connect(&url).await.expect("connect sqlite")
}

fn every_variant() -> Vec<CoordinateRecord> {
    let mut text = Entity::new("TEXT");
    text.handle = Some("2B".to_string());
    text.extra
        .insert("1".to_string(), serde_json::Value::String("label".to_string()));
    vec![
        CoordinateRecord::Line {
            from: Point::with_z(0.0, 0.0, 0.0),
            to: Point::with_z(10.0, 0.0, 0.0),
        },
        CoordinateRecord::Circle {
            center: Point::new(5.0, 5.0),
            radius: 2.0,
        },
        CoordinateRecord::Arc {
            center: Point::new(1.0, 1.0),
            radius: 0.0,
            start_angle: Some(0.5),
            end_angle: None,
        },
        CoordinateRecord::Polyline {
            kind: PolylineKind::Classic,
            vertices: vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
            closed: None,
        },
        CoordinateRecord::Spline {
            control_points: vec![Point::new(0.0, 0.0), Point::new(2.0, 3.0)],
            degree: None,
        },
        CoordinateRecord::Partial {
            kind: "ELLIPSE".to_string(),
            endpoints: None,
            vertices: None,
            center: Some(Point::new(3.0, 4.0)),
        },
        CoordinateRecord::Raw(Box::new(text)),
    ]
}

#[tokio::test]
async fn stored_coordinates_decode_to_the_same_records() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let file_id = store.create_file("variants.dxf", Utc::now()).await.unwrap();
    let block_id = store
        .create_block(NewBlock {
            name: "variants".to_string(),
            kind: "ENTITIES".to_string(),
            coordinates: every_variant(),
            file_id,
        })
        .await
        .unwrap();

    let block = store
        .find_block_by_id(block_id)
        .await
        .unwrap()
        .expect("block stored");
    assert_eq!(block.coordinates, every_variant());
    assert_eq!(block.kind, "ENTITIES");
    assert_eq!(block.file_id, file_id);
    assert_eq!(block.created_at, block.updated_at);
}

#[tokio::test]
async fn search_is_case_insensitive_and_literal() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let file_id = store.create_file("names.dxf", Utc::now()).await.unwrap();
    for (name, kind) in [
        ("Plan - Door", "BLOCK"),
        ("plan - 50%", "BLOCK"),
        ("plan - 50x", "2"),
        ("site", "ENTITIES"),
    ] {
        store
            .create_block(NewBlock {
                name: name.to_string(),
                kind: kind.to_string(),
                coordinates: Vec::new(),
                file_id,
            })
            .await
            .unwrap();
    }

    let filter = BlockFilter::new(Some("PLAN".to_string()), None);
    let (blocks, total) = store.find_blocks_page(&filter, 10, 0).await.unwrap();
    assert_eq!(total, 3);
    let names: Vec<_> = blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["Plan - Door", "plan - 50%", "plan - 50x"]);

    let filter = BlockFilter::new(Some("50%".to_string()), None);
    let (blocks, total) = store.find_blocks_page(&filter, 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(blocks[0].name, "plan - 50%");

    let filter = BlockFilter::new(Some("plan".to_string()), Some("2".to_string()));
    let (blocks, total) = store.find_blocks_page(&filter, 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(blocks[0].name, "plan - 50x");

    let (page, total) = store
        .find_blocks_page(&BlockFilter::default(), 2, 2)
        .await
        .unwrap();
    assert_eq!(total, 4);
    let names: Vec<_> = page.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["plan - 50x", "site"]);
}

async fn seed_names(store: &dyn RecordStore, names: &[&str]) {
    let file_id = store.create_file("names.dxf", Utc::now()).await.unwrap();
    for name in names {
        store
            .create_block(NewBlock {
                name: name.to_string(),
                kind: "BLOCK".to_string(),
                coordinates: Vec::new(),
                file_id,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn non_ascii_search_matches_the_memory_store() {
    let dir = TempDir::new().unwrap();
    let sqlite = open_store(&dir).await;
    let memory = MemoryStore::new();
    let names = ["ÄRMEL - Tür", "Straße - TÜR", "plan - Door"];
    seed_names(&sqlite, &names).await;
    seed_names(&memory, &names).await;

    for (needle, expected) in [
        ("ärmel", vec!["ÄRMEL - Tür"]),
        ("TÜR", vec!["ÄRMEL - Tür", "Straße - TÜR"]),
        ("straße", vec!["Straße - TÜR"]),
        ("door", vec!["plan - Door"]),
    ] {
        let filter = BlockFilter::new(Some(needle.to_string()), None);
        let (sqlite_blocks, sqlite_total) = sqlite.find_blocks_page(&filter, 10, 0).await.unwrap();
        let (memory_blocks, memory_total) = memory.find_blocks_page(&filter, 10, 0).await.unwrap();

        let sqlite_names: Vec<_> = sqlite_blocks.iter().map(|b| b.name.as_str()).collect();
        let memory_names: Vec<_> = memory_blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(sqlite_names, expected, "sqlite search {needle:?}");
        assert_eq!(memory_names, expected, "memory search {needle:?}");
        assert_eq!(sqlite_total, memory_total, "{needle:?}");
    }
}

#[tokio::test]
async fn oversized_limit_and_offset_do_not_fail() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    seed_names(&store, &["a", "b"]).await;

    let (blocks, total) = store
        .find_blocks_page(&BlockFilter::default(), u64::MAX, 0)
        .await
        .unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(total, 2);

    let (blocks, total) = store
        .find_blocks_page(&BlockFilter::default(), 10, u64::MAX)
        .await
        .unwrap();
    assert!(blocks.is_empty());
    assert_eq!(total, 2);
}

#[tokio::test]
async fn folded_names_are_backfilled_for_existing_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy.db");
    let url = sqlite_url(path.to_str().unwrap());

    {
        let db = establish_connection(&url).await.unwrap();
        Migrator::up(&db, Some(1)).await.unwrap();
        for sql in [
            "INSERT INTO files (id, name, upload_date) VALUES (1, 'old.dxf', '2024-01-01T00:00:00Z')",
            "INSERT INTO blocks (id, name, type, coordinates, file_id, created_at, updated_at) \
             VALUES (1, 'ÄRMEL - Tür', 'BLOCK', '[]', 1, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        ] {
            db.execute(Statement::from_string(DatabaseBackend::Sqlite, sql.to_string()))
                .await
                .unwrap();
        }
    }

    let store = SeaOrmStore::connect(&url).await.unwrap();
    let row = store
        .connection()
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name_folded FROM blocks WHERE id = 1".to_string(),
        ))
        .await
        .unwrap()
        .expect("legacy row");
    let folded: String = row.try_get("", "name_folded").unwrap();
    assert_eq!(folded, "ärmel - tür");
}

#[tokio::test]
async fn blocks_require_an_existing_file() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    let err = store
        .create_block(NewBlock {
            name: "orphan".to_string(),
            kind: "BLOCK".to_string(),
            coordinates: Vec::new(),
            file_id: 77,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingFile(77)));
}

#[tokio::test]
async fn ingested_drawing_survives_reconnect() {
    let dir = TempDir::new().unwrap();
    let source = "0\nSECTION\n2\nENTITIES\n0\nLINE\n10\n0.0\n20\n0.0\n30\n0.0\n11\n10.0\n21\n0.0\n31\n0.0\n0\nENDSEC\n0\nSECTION\n2\nBLOCKS\n0\nBLOCK\n2\nDetail1\n70\n0\n10\n0.0\n20\n0.0\n0\nCIRCLE\n10\n5.0\n20\n5.0\n30\n0.0\n40\n2.0\n0\nENDBLK\n0\nENDSEC\n0\nEOF\n";

    {
        let store = Arc::new(open_store(&dir).await);
        let ingestor = DrawingIngestor::new(store.clone());
        let report = ingestor.ingest_source("plan.dxf", source).await.unwrap();
        assert_eq!(report.blocks.len(), 2);
    }

    // 迁移可重复执行，已有数据保持不变
    let store = Arc::new(open_store(&dir).await);
    let service = BlockQueryService::new(store);
    let page = service.list(&BlockQuery::default()).await.unwrap();
    assert_eq!(page.total_pages, 1);
    let names: Vec<_> = page.blocks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["plan", "plan - Detail1"]);
    assert_eq!(page.blocks[1].kind, "BLOCK");

    let detail = service
        .get(page.blocks[1].id)
        .await
        .unwrap()
        .expect("detail block");
    assert_eq!(
        detail.coordinates,
        vec![CoordinateRecord::Circle {
            center: Point::with_z(5.0, 5.0, 0.0),
            radius: 2.0,
        }]
    );
    assert!(service.get(999).await.unwrap().is_none());
}
