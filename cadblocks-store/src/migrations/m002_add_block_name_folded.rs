use sea_orm::ConnectionTrait;
use sea_orm_migration::prelude::*;

use crate::fold_name;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Blocks::Table)
                    .add_column(
                        ColumnDef::new(Blocks::NameFolded)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .to_owned(),
            )
            .await?;

        // 回填已有记录，SQLite 的 LOWER 不处理非 ASCII 字符
        let db = manager.get_connection();
        let backend = manager.get_database_backend();
        let select = Query::select()
            .columns([Blocks::Id, Blocks::Name])
            .from(Blocks::Table)
            .to_owned();
        let rows = db.query_all(backend.build(&select)).await?;
        for row in rows {
            let id: i32 = row.try_get("", "id")?;
            let name: String = row.try_get("", "name")?;
            let update = Query::update()
                .table(Blocks::Table)
                .value(Blocks::NameFolded, fold_name(&name))
                .and_where(Expr::col(Blocks::Id).eq(id))
                .to_owned();
            db.execute(backend.build(&update)).await?;
        }

        manager
            .create_index(
                Index::create()
                    .name("idx_blocks_name_folded")
                    .table(Blocks::Table)
                    .col(Blocks::NameFolded)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_blocks_name_folded")
                    .table(Blocks::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(Blocks::Table)
                    .drop_column(Blocks::NameFolded)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Blocks {
    Table,
    Id,
    Name,
    NameFolded,
}
