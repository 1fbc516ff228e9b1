use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{Block, BlockFilter, BlockId, FileId, FileRecord, NewBlock, RecordStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    files: Vec<FileRecord>,
    blocks: Vec<Block>,
}

/// 进程内存储，id 从 1 开始递增。用于测试与无数据库的本地运行。
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<FileRecord> {
        self.state.read().files.clone()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_file(
        &self,
        name: &str,
        upload_date: DateTime<Utc>,
    ) -> Result<FileId, StoreError> {
        let mut state = self.state.write();
        let id = next_id(state.files.len());
        state.files.push(FileRecord {
            id,
            name: name.to_string(),
            upload_date,
        });
        Ok(id)
    }

    async fn create_block(&self, block: NewBlock) -> Result<BlockId, StoreError> {
        let mut state = self.state.write();
        if !state.files.iter().any(|file| file.id == block.file_id) {
            return Err(StoreError::MissingFile(block.file_id));
        }
        let id = next_id(state.blocks.len());
        let now = Utc::now();
        state.blocks.push(Block {
            id,
            name: block.name,
            kind: block.kind,
            coordinates: block.coordinates,
            file_id: block.file_id,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn find_blocks_page(
        &self,
        filter: &BlockFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Block>, u64), StoreError> {
        let state = self.state.read();
        let matching: Vec<&Block> = state
            .blocks
            .iter()
            .filter(|block| filter.matches(&block.name, &block.kind))
            .collect();
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_block_by_id(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        let state = self.state.read();
        Ok(state.blocks.iter().find(|block| block.id == id).cloned())
    }
}

fn next_id(len: usize) -> i32 {
    i32::try_from(len).map_or(i32::MAX, |count| count.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadblocks_core::coordinates::CoordinateRecord;
    use cadblocks_core::geometry::Point;

    fn new_block(name: &str, kind: &str, file_id: FileId) -> NewBlock {
        NewBlock {
            name: name.to_string(),
            kind: kind.to_string(),
            coordinates: vec![CoordinateRecord::Circle {
                center: Point::new(0.0, 0.0),
                radius: 1.0,
            }],
            file_id,
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids_and_pages_in_order() {
        let store = MemoryStore::new();
        let file = store.create_file("plan.dxf", Utc::now()).await.unwrap();
        assert_eq!(file, 1);
        for name in ["a", "b", "c"] {
            store.create_block(new_block(name, "BLOCK", file)).await.unwrap();
        }

        let (page, total) = store
            .find_blocks_page(&BlockFilter::default(), 2, 1)
            .await
            .unwrap();
        assert_eq!(total, 3);
        let names: Vec<_> = page.iter().map(|block| block.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(page[0].created_at, page[0].updated_at);
    }

    #[tokio::test]
    async fn rejects_blocks_for_unknown_files() {
        let store = MemoryStore::new();
        let err = store
            .create_block(new_block("orphan", "BLOCK", 42))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingFile(42)));
        assert!(store.blocks().is_empty());
    }

    #[tokio::test]
    async fn missing_block_is_none() {
        let store = MemoryStore::new();
        assert!(store.find_block_by_id(1).await.unwrap().is_none());
    }
}
