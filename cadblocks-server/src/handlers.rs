use std::path::{Path as FsPath, PathBuf};

use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use cadblocks_engine::errors::QueryError;
use cadblocks_engine::query::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use cadblocks_engine::{Block, BlockId, BlockPage, BlockQuery};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::app::AppState;
use crate::errors::ApiError;

/// 上传表单中承载 DXF 文件的字段名。
pub const UPLOAD_FIELD: &str = "dxfFile";

pub async fn root() -> &'static str {
    "CAD Block Viewer Backend is Live!"
}

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::UploadMissing);
    };
    let Some(upload) = read_upload(&mut multipart).await? else {
        return Err(ApiError::UploadMissing);
    };
    debug!(file = %upload.file_name, bytes = upload.bytes.len(), "收到 DXF 上传");

    if let Some(dir) = &state.uploads.archive_dir {
        let archived = archive_upload(dir, &upload).await.map_err(|err| {
            error!(dir = %dir.display(), error = %err, "保存上传文件失败");
            ApiError::upload_failed(err)
        })?;
        debug!(path = %archived.display(), "上传文件已保存");
    }

    let report = state
        .ingestor
        .ingest_bytes(&upload.file_name, &upload.bytes)
        .await
        .map_err(|err| {
            error!(file = %upload.file_name, error = %err, "DXF 处理失败");
            ApiError::upload_failed(err)
        })?;
    info!(
        file = %upload.file_name,
        file_id = report.file_id,
        blocks = report.blocks.len(),
        "DXF 上传处理完成"
    );

    Ok(Json(json!({ "message": "DXF processed successfully" })))
}

/// 取第一个名为 `dxfFile` 且带文件名的字段，其余字段忽略。
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, ApiError> {
    loop {
        let field = multipart.next_field().await.map_err(|err| ApiError::UploadFailed {
            status: err.status(),
            detail: err.body_text(),
        })?;
        let Some(field) = field else {
            return Ok(None);
        };
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|err| ApiError::UploadFailed {
            status: err.status(),
            detail: err.body_text(),
        })?;
        return Ok(Some(Upload {
            file_name,
            bytes: bytes.to_vec(),
        }));
    }
}

async fn archive_upload(dir: &FsPath, upload: &Upload) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    // 仅取最后一段文件名，避免写出目录之外
    let name = FsPath::new(&upload.file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.dxf".to_string());
    let target = dir.join(format!("{}_{}", Utc::now().timestamp_millis(), name));
    tokio::fs::write(&target, &upload.bytes).await?;
    Ok(target)
}

/// 列表查询参数，保持字符串形式以便返回 400 而非提取失败。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBlocksParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl ListBlocksParams {
    fn into_query(self) -> Result<BlockQuery, ApiError> {
        Ok(BlockQuery {
            page: parse_number("page", self.page.as_deref(), DEFAULT_PAGE)?,
            page_size: parse_number("pageSize", self.page_size.as_deref(), DEFAULT_PAGE_SIZE)?,
            search: self.search,
            kind: self.kind,
        })
    }
}

fn parse_number(name: &str, raw: Option<&str>, default: u64) -> Result<u64, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse::<u64>().map_err(|_| ApiError::BadRequest {
            detail: format!("`{name}` must be a positive integer, got {value:?}"),
        }),
    }
}

pub async fn list_blocks(
    State(state): State<AppState>,
    Query(params): Query<ListBlocksParams>,
) -> Result<Json<BlockPage>, ApiError> {
    let query = params.into_query()?;
    match state.query.list(&query).await {
        Ok(page) => Ok(Json(page)),
        Err(err @ QueryError::InvalidPagination { .. }) => Err(ApiError::BadRequest {
            detail: err.to_string(),
        }),
        Err(err) => {
            error!(error = %err, "查询块列表失败");
            Err(ApiError::ListFailed {
                detail: err.to_string(),
            })
        }
    }
}

pub async fn get_block(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Block>, ApiError> {
    // 非数字 id 不可能对应任何记录
    let Ok(id) = id.trim().parse::<BlockId>() else {
        return Err(ApiError::NotFound);
    };
    match state.query.get(id).await {
        Ok(Some(block)) => Ok(Json(block)),
        Ok(None) => Err(ApiError::NotFound),
        Err(err) => {
            error!(id, error = %err, "查询块失败");
            Err(ApiError::LookupFailed {
                detail: err.to_string(),
            })
        }
    }
}
