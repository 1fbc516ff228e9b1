pub mod app;
pub mod errors;
pub mod handlers;

pub use app::{AppState, DEFAULT_MAX_UPLOAD_BYTES, UploadSettings, create_router};
pub use errors::{ApiError, ServerError};
