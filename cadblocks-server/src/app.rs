use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use cadblocks_engine::{BlockQueryService, DrawingIngestor, RecordStore};
use tower_http::cors::{Any, CorsLayer};

use crate::errors::ServerError;
use crate::handlers;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// 上传相关设置。
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// 配置后，原始上传文件保存为 `<dir>/<毫秒时间戳>_<文件名>`。
    pub archive_dir: Option<PathBuf>,
    pub max_bytes: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            archive_dir: None,
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<DrawingIngestor>,
    pub query: Arc<BlockQueryService>,
    pub uploads: Arc<UploadSettings>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, uploads: UploadSettings) -> Self {
        Self {
            ingestor: Arc::new(DrawingIngestor::new(store.clone())),
            query: Arc::new(BlockQueryService::new(store)),
            uploads: Arc::new(uploads),
        }
    }
}

/// 组装全部路由。`cors_origin` 为空或 `*` 时允许任意来源。
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Result<Router, ServerError> {
    let cors = cors_layer(cors_origin)?;
    let body_limit = DefaultBodyLimit::max(state.uploads.max_bytes);

    let files = Router::new()
        .route("/upload", post(handlers::upload_file))
        .route("/blocks", get(handlers::list_blocks))
        .route("/blocks/:id", get(handlers::get_block));

    Ok(Router::new()
        .route("/", get(handlers::root))
        .nest("/api/files", files)
        .layer(body_limit)
        .layer(cors)
        .with_state(state))
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, ServerError> {
    match origin.map(str::trim) {
        None | Some("") | Some("*") => Ok(CorsLayer::permissive()),
        Some(origin) => {
            let value =
                HeaderValue::from_str(origin).map_err(|_| ServerError::InvalidCorsOrigin {
                    origin: origin.to_string(),
                })?;
            Ok(CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any))
        }
    }
}
