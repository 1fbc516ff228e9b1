use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `coordinates` 保存归一化记录数组的 JSON 文档；`name_folded` 为小写名称，仅用于搜索。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[serde(skip)]
    pub name_folded: String,
    #[sea_orm(column_name = "type")]
    pub block_type: String,
    #[sea_orm(column_type = "Json")]
    pub coordinates: Json,
    pub file_id: i32,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::files::Entity",
        from = "Column::FileId",
        to = "super::files::Column::Id"
    )]
    Files,
}

impl Related<super::files::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Files.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
