use std::path::{Path, PathBuf};
use std::sync::Arc;

use cadblocks_config::{AppConfig, ConfigError};
use cadblocks_engine::DrawingIngestor;
use cadblocks_io::{DocumentLoader, DxfFacade};
use cadblocks_server::{AppState, UploadSettings, create_router};
use cadblocks_store::SeaOrmStore;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod upload_dir;

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut import_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--import" => {
                let Some(path) = args.next() else {
                    eprintln!("`--import` 需要提供 DXF 文件路径");
                    std::process::exit(1);
                };
                import_path = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let mut config = load_configuration(config_override);
    init_logging(&config);
    if let Err(err) = config.apply_env_overrides() {
        warn!(error = %err, "忽略无效的环境变量覆盖");
    }
    info!("启动 CAD 块服务");

    let store = match SeaOrmStore::connect(&config.database.url).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!(url = %config.database.url, error = %err, "无法连接数据库");
            std::process::exit(1);
        }
    };

    let outcome = match import_path {
        Some(path) => run_import(store, &path).await,
        None => run_server(&config, store).await,
    };
    if let Err(err) = outcome {
        error!(error = %err, "运行失败");
        std::process::exit(1);
    }
}

/// 本地导入模式：解析指定文件并入库，不启动 HTTP 服务。
async fn run_import(store: Arc<SeaOrmStore>, path: &Path) -> Result<(), AppError> {
    info!(path = %path.display(), "以导入模式运行");
    let drawing = DxfFacade::new()
        .load(path)
        .map_err(|err| AppError::Import(err.to_string()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let ingestor = DrawingIngestor::new(store);
    let report = ingestor
        .ingest(&file_name, &drawing)
        .await
        .map_err(|err| AppError::Import(err.to_string()))?;
    info!(
        file_id = report.file_id,
        blocks = report.blocks.len(),
        skipped = ?report.skipped,
        "导入完成"
    );
    Ok(())
}

async fn run_server(config: &AppConfig, store: Arc<SeaOrmStore>) -> Result<(), AppError> {
    let archive_dir = match upload_dir::prepare_upload_dir(&config.uploads) {
        Ok(dir) => dir,
        Err(err) => {
            warn!(error = %err, "无法准备上传目录，上传文件将不落盘");
            None
        }
    };
    let uploads = UploadSettings {
        archive_dir,
        max_bytes: config.uploads.max_bytes,
    };

    let state = AppState::new(store, uploads);
    let router = create_router(state, config.server.cors_origin.as_deref())
        .map_err(|err| AppError::Server(err.to_string()))?;

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|err| AppError::Server(format!("绑定 {address} 失败: {err}")))?;
    info!(address = %address, "HTTP 服务已启动");
    axum::serve(listener, router)
        .await
        .map_err(|err| AppError::Server(err.to_string()))
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } | ConfigError::InvalidOverride { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

#[derive(Debug)]
enum AppError {
    Import(String),
    Server(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Import(message) => write!(f, "导入失败: {message}"),
            AppError::Server(message) => write!(f, "服务运行失败: {message}"),
        }
    }
}

impl std::error::Error for AppError {}
