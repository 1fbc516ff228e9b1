pub use sea_orm_migration::prelude::*;

mod m001_create_files_and_blocks;
mod m002_add_block_name_folded;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m001_create_files_and_blocks::Migration),
            Box::new(m002_add_block_name_folded::Migration),
        ]
    }
}
