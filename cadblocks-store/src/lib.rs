pub mod connection;
pub mod entities;
pub mod migrations;

use async_trait::async_trait;
use cadblocks_core::coordinates::CoordinateRecord;
use cadblocks_engine::store::{
    Block, BlockFilter, BlockId, FileId, NewBlock, RecordStore, StoreError,
};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use sea_orm_migration::MigratorTrait;
use tracing::info;

pub use connection::{establish_connection, sqlite_url};
use entities::{blocks, files};
use migrations::Migrator;

const MAX_BIND: u64 = i64::MAX as u64;

/// 基于 sea-orm 的关系型存储。
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// 建立连接并执行全部迁移。
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let db = establish_connection(database_url)
            .await
            .map_err(StoreError::database)?;
        Migrator::up(&db, None).await.map_err(StoreError::database)?;
        info!(url = database_url, "数据库已连接，迁移完成");
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl RecordStore for SeaOrmStore {
    async fn create_file(
        &self,
        name: &str,
        upload_date: DateTime<Utc>,
    ) -> Result<FileId, StoreError> {
        let model = files::ActiveModel {
            name: Set(name.to_string()),
            upload_date: Set(upload_date),
            ..Default::default()
        };
        let inserted = model.insert(&self.db).await.map_err(StoreError::database)?;
        Ok(inserted.id)
    }

    async fn create_block(&self, block: NewBlock) -> Result<BlockId, StoreError> {
        let owner = files::Entity::find_by_id(block.file_id)
            .one(&self.db)
            .await
            .map_err(StoreError::database)?;
        if owner.is_none() {
            return Err(StoreError::MissingFile(block.file_id));
        }

        let coordinates = serde_json::to_value(&block.coordinates).map_err(StoreError::Encode)?;
        let now = Utc::now();
        let model = blocks::ActiveModel {
            name_folded: Set(fold_name(&block.name)),
            name: Set(block.name),
            block_type: Set(block.kind),
            coordinates: Set(coordinates),
            file_id: Set(block.file_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let inserted = model.insert(&self.db).await.map_err(StoreError::database)?;
        Ok(inserted.id)
    }

    async fn find_blocks_page(
        &self,
        filter: &BlockFilter,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Block>, u64), StoreError> {
        let mut select = blocks::Entity::find();
        if let Some(needle) = filter.search() {
            let pattern = LikeExpr::new(format!("%{}%", escape_like(&needle))).escape('\\');
            select = select.filter(Expr::col((blocks::Entity, blocks::Column::NameFolded)).like(pattern));
        }
        if let Some(kind) = filter.kind() {
            select = select.filter(blocks::Column::BlockType.eq(kind));
        }

        let total = select
            .clone()
            .count(&self.db)
            .await
            .map_err(StoreError::database)?;
        // SQLite 只接受有符号 64 位的 LIMIT / OFFSET
        if offset > MAX_BIND {
            return Ok((Vec::new(), total));
        }
        let rows = select
            .order_by_asc(blocks::Column::Id)
            .limit(limit.min(MAX_BIND))
            .offset(offset)
            .all(&self.db)
            .await
            .map_err(StoreError::database)?;

        let blocks = rows
            .into_iter()
            .map(into_block)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((blocks, total))
    }

    async fn find_block_by_id(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        let row = blocks::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(StoreError::database)?;
        row.map(into_block).transpose()
    }
}

fn into_block(model: blocks::Model) -> Result<Block, StoreError> {
    let id = model.id;
    let coordinates: Vec<CoordinateRecord> = serde_json::from_value(model.coordinates)
        .map_err(|source| StoreError::Decode { id, source })?;
    Ok(Block {
        id,
        name: model.name,
        kind: model.block_type,
        coordinates,
        file_id: model.file_id,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

/// 搜索列保存的名称形式，与 `BlockFilter::search` 的折叠方式一致。
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// 转义 LIKE 通配符，使搜索词按字面匹配。
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
