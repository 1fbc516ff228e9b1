use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::errors::QueryError;
use crate::store::{Block, BlockFilter, BlockId, RecordStore};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
/// 存储层按有符号 64 位整数绑定 limit / offset。
pub const MAX_PAGINATION_VALUE: u64 = i64::MAX as u64;

/// 列表查询参数，页码从 1 开始。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockQuery {
    pub page: u64,
    pub page_size: u64,
    pub search: Option<String>,
    pub kind: Option<String>,
}

impl Default for BlockQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPage {
    pub blocks: Vec<Block>,
    pub total_pages: u64,
    pub current_page: u64,
}

/// 只读查询层：分页列表与按 id 查找。
pub struct BlockQueryService {
    store: Arc<dyn RecordStore>,
}

impl BlockQueryService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, query: &BlockQuery) -> Result<BlockPage, QueryError> {
        let invalid = || QueryError::InvalidPagination {
            page: query.page,
            page_size: query.page_size,
        };
        if query.page == 0 || query.page_size == 0 || query.page_size > MAX_PAGINATION_VALUE {
            return Err(invalid());
        }
        let offset = (query.page - 1)
            .checked_mul(query.page_size)
            .filter(|offset| *offset <= MAX_PAGINATION_VALUE)
            .ok_or_else(invalid)?;

        let filter = BlockFilter::new(query.search.clone(), query.kind.clone());
        let (blocks, total) = self
            .store
            .find_blocks_page(&filter, query.page_size, offset)
            .await?;
        debug!(
            page = query.page,
            page_size = query.page_size,
            total,
            returned = blocks.len(),
            "查询块列表"
        );

        Ok(BlockPage {
            blocks,
            total_pages: total.div_ceil(query.page_size),
            current_page: query.page,
        })
    }

    /// 不存在时返回 `None`，不视为错误。
    pub async fn get(&self, id: BlockId) -> Result<Option<Block>, QueryError> {
        Ok(self.store.find_block_by_id(id).await?)
    }
}
