use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub const UPLOAD_MISSING_MESSAGE: &str = "No file uploaded";
pub const UPLOAD_FAILED_MESSAGE: &str = "Error processing the DXF file";
pub const LIST_FAILED_MESSAGE: &str = "Error retrieving blocks.";
pub const LOOKUP_FAILED_MESSAGE: &str = "Error retrieving block.";
pub const BLOCK_NOT_FOUND_MESSAGE: &str = "Block not found.";
pub const INVALID_QUERY_MESSAGE: &str = "Invalid query parameters.";

/// 构建路由时的错误。
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid CORS origin {origin:?}")]
    InvalidCorsOrigin { origin: String },
}

/// 请求级错误，响应体为 `{"message": ..., "error": ...}`。
#[derive(Debug)]
pub enum ApiError {
    /// 400，缺少 `dxfFile` 文件字段。
    UploadMissing,
    /// 400，查询参数非法。
    BadRequest { detail: String },
    /// 404。
    NotFound,
    /// 上传处理失败，状态码通常为 500。
    UploadFailed { status: StatusCode, detail: String },
    /// 500，列表查询失败。
    ListFailed { detail: String },
    /// 500，单块查询失败。
    LookupFailed { detail: String },
}

impl ApiError {
    pub fn upload_failed(err: impl std::fmt::Display) -> Self {
        Self::UploadFailed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UploadMissing | ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::UploadFailed { status, .. } => *status,
            ApiError::ListFailed { .. } | ApiError::LookupFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::UploadMissing => json!({ "message": UPLOAD_MISSING_MESSAGE }),
            ApiError::NotFound => json!({ "message": BLOCK_NOT_FOUND_MESSAGE }),
            ApiError::BadRequest { detail } => {
                json!({ "message": INVALID_QUERY_MESSAGE, "error": detail })
            }
            ApiError::UploadFailed { detail, .. } => {
                json!({ "message": UPLOAD_FAILED_MESSAGE, "error": detail })
            }
            ApiError::ListFailed { detail } => {
                json!({ "message": LIST_FAILED_MESSAGE, "error": detail })
            }
            ApiError::LookupFailed { detail } => {
                json!({ "message": LOOKUP_FAILED_MESSAGE, "error": detail })
            }
        };
        (status, Json(body)).into_response()
    }
}
