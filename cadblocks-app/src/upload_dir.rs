use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use cadblocks_config::UploadConfig;
use tracing::info;

/// 解析并创建上传保存目录；未配置时返回 `None`。
pub fn prepare_upload_dir(config: &UploadConfig) -> Result<Option<PathBuf>, UploadDirError> {
    let Some(dir) = config.dir.as_ref() else {
        return Ok(None);
    };
    let target = normalize_path(dir)?;
    if target.exists() && !target.is_dir() {
        return Err(UploadDirError::NotADirectory { target });
    }
    if !target.exists() {
        fs::create_dir_all(&target).map_err(|error| UploadDirError::CreateFailed {
            target: target.clone(),
            error,
        })?;
        info!(path = %target.display(), "已创建上传目录");
    }
    Ok(Some(target))
}

fn normalize_path(path: &Path) -> Result<PathBuf, UploadDirError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = env::current_dir().map_err(|error| UploadDirError::Io { error })?;
        Ok(cwd.join(path))
    }
}

#[derive(Debug)]
pub enum UploadDirError {
    NotADirectory {
        target: PathBuf,
    },
    CreateFailed {
        target: PathBuf,
        error: std::io::Error,
    },
    Io {
        error: std::io::Error,
    },
}

impl Display for UploadDirError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadDirError::NotADirectory { target } => {
                write!(f, "上传路径 {} 已存在但不是目录", target.display())
            }
            UploadDirError::CreateFailed { target, error } => {
                write!(f, "创建上传目录 {} 失败: {}", target.display(), error)
            }
            UploadDirError::Io { error } => {
                write!(f, "I/O 错误: {error}")
            }
        }
    }
}

impl Error for UploadDirError {}
