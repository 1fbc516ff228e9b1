use std::sync::Arc;

use cadblocks_core::coordinates::normalize_entities;
use cadblocks_core::drawing::Drawing;
use cadblocks_io::DxfFacade;
use chrono::Utc;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::store::{BlockId, FileId, NewBlock, RecordStore};

/// 顶层实体组对应的块类型。
pub const TOP_LEVEL_BLOCK_TYPE: &str = "ENTITIES";
/// 块定义未声明类型时使用的类型。
pub const DEFAULT_BLOCK_TYPE: &str = "BLOCK";
/// 模型空间与图纸空间容器，不作为块入库。
pub const RESERVED_BLOCK_NAMES: [&str; 3] = ["*Model_Space", "*Paper_Space", "*Paper_Space0"];

/// 一次入库的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub file_id: FileId,
    pub blocks: Vec<BlockId>,
    pub skipped: Vec<String>,
}

pub struct DrawingIngestor {
    store: Arc<dyn RecordStore>,
    parser: DxfFacade,
}

impl DrawingIngestor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            parser: DxfFacade::new(),
        }
    }

    /// 解析 DXF 文本后入库；解析失败时不会写入任何记录。
    pub async fn ingest_source(
        &self,
        file_name: &str,
        source: &str,
    ) -> Result<IngestReport, EngineError> {
        let drawing = self.parser.parse_str(source)?;
        self.ingest(file_name, &drawing).await
    }

    pub async fn ingest_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<IngestReport, EngineError> {
        let drawing = self.parser.parse_bytes(bytes)?;
        self.ingest(file_name, &drawing).await
    }

    /// 先创建文件记录，再依次写入顶层实体组与各块定义。
    ///
    /// 中途失败直接返回错误，之前已提交的记录保持不变。
    pub async fn ingest(
        &self,
        file_name: &str,
        drawing: &Drawing,
    ) -> Result<IngestReport, EngineError> {
        let base_name = file_base_name(file_name);
        let file_id = self.store.create_file(file_name, Utc::now()).await?;
        let mut report = IngestReport {
            file_id,
            blocks: Vec::new(),
            skipped: Vec::new(),
        };

        let top_level = normalize_entities(drawing.entities());
        if !top_level.is_empty() {
            let id = self
                .store
                .create_block(NewBlock {
                    name: base_name.to_string(),
                    kind: TOP_LEVEL_BLOCK_TYPE.to_string(),
                    coordinates: top_level,
                    file_id,
                })
                .await?;
            report.blocks.push(id);
        }

        for (block_name, definition) in drawing.blocks() {
            let coordinates = normalize_entities(&definition.entities);
            if coordinates.is_empty() || RESERVED_BLOCK_NAMES.contains(&block_name) {
                debug!(block = block_name, "跳过空块或保留块");
                report.skipped.push(block_name.to_string());
                continue;
            }
            let kind = definition
                .kind
                .clone()
                .unwrap_or_else(|| DEFAULT_BLOCK_TYPE.to_string());
            let id = self
                .store
                .create_block(NewBlock {
                    name: format!("{base_name} - {block_name}"),
                    kind,
                    coordinates,
                    file_id,
                })
                .await?;
            report.blocks.push(id);
        }

        info!(
            file = file_name,
            file_id,
            blocks = report.blocks.len(),
            skipped = report.skipped.len(),
            "DXF 入库完成"
        );
        Ok(report)
    }
}

/// 去掉文件名最后一个扩展名（扩展名不含 `/` 且非空）。
pub fn file_base_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(dot) => {
            let extension = &file_name[dot + 1..];
            if extension.is_empty() || extension.contains('/') {
                file_name
            } else {
                &file_name[..dot]
            }
        }
        None => file_name,
    }
}
