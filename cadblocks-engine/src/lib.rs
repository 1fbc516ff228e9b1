pub mod ingest;
pub mod query;
pub mod store;

pub mod errors {
    use cadblocks_io::IoError;
    use thiserror::Error;

    use crate::store::StoreError;

    /// 入库失败：解析或存储任一环节出错即中止，已写入的记录不回滚。
    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("failed to parse drawing: {0}")]
        Parse(#[from] IoError),
        #[error("failed to persist records: {0}")]
        Store(#[from] StoreError),
    }

    #[derive(Debug, Error)]
    pub enum QueryError {
        #[error("invalid pagination: page={page}, pageSize={page_size} (both must be positive)")]
        InvalidPagination { page: u64, page_size: u64 },
        #[error("failed to query records: {0}")]
        Store(#[from] StoreError),
    }
}

pub use ingest::{DrawingIngestor, IngestReport};
pub use query::{BlockPage, BlockQuery, BlockQueryService};
pub use store::{Block, BlockFilter, BlockId, FileId, FileRecord, NewBlock, RecordStore, StoreError};
