use std::error::Error as StdError;

use async_trait::async_trait;
use cadblocks_core::coordinates::CoordinateRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub type FileId = i32;
pub type BlockId = i32;

/// 一次上传对应的文件记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub upload_date: DateTime<Utc>,
}

/// 已持久化的块记录，JSON 字段名与既有客户端保持一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<CoordinateRecord>,
    pub file_id: FileId,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBlock {
    pub name: String,
    pub kind: String,
    pub coordinates: Vec<CoordinateRecord>,
    pub file_id: FileId,
}

/// 列表查询条件；空字符串视为不过滤。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockFilter {
    search: Option<String>,
    kind: Option<String>,
}

impl BlockFilter {
    pub fn new(search: Option<String>, kind: Option<String>) -> Self {
        Self {
            search: search.filter(|value| !value.is_empty()),
            kind: kind.filter(|value| !value.is_empty()),
        }
    }

    /// 名称子串（已转为小写），用于不区分大小写的匹配。
    pub fn search(&self) -> Option<String> {
        self.search.as_ref().map(|value| value.to_lowercase())
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn matches(&self, name: &str, kind: &str) -> bool {
        let name_matches = self
            .search()
            .is_none_or(|needle| name.to_lowercase().contains(&needle));
        let kind_matches = self.kind().is_none_or(|expected| expected == kind);
        name_matches && kind_matches
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] Box<dyn StdError + Send + Sync>),
    #[error("failed to encode coordinates: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored coordinates of block {id} are invalid: {source}")]
    Decode {
        id: BlockId,
        #[source]
        source: serde_json::Error,
    },
    #[error("file {0} does not exist")]
    MissingFile(FileId),
}

impl StoreError {
    pub fn database(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Database(Box::new(err))
    }
}

/// File / Block 的持久化接口，由进程启动时创建并注入。
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_file(&self, name: &str, upload_date: DateTime<Utc>)
    -> Result<FileId, StoreError>;

    async fn create_block(&self, block: NewBlock) -> Result<BlockId, StoreError>;

    /// 返回按 id 升序的一页记录以及满足条件的总数。
    async fn find_blocks_page(
        &self,
        filter: &BlockFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Block>, u64), StoreError>;

    async fn find_block_by_id(&self, id: BlockId) -> Result<Option<Block>, StoreError>;
}
