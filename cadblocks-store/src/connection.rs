use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url);

    // 内存库每个连接各自独立，只能使用单连接
    if database_url.contains(":memory:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(8).min_connections(1);
    }
    opt.connect_timeout(Duration::from_secs(5))
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    Database::connect(opt).await
}

/// 将数据库文件路径转换为 SQLite 连接串（不存在时自动创建）。
pub fn sqlite_url(path: &str) -> String {
    match path {
        ":memory:" => "sqlite::memory:".to_string(),
        path => format!("sqlite://{path}?mode=rwc"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_url_handles_memory_and_files() {
        assert_eq!(sqlite_url(":memory:"), "sqlite::memory:");
        assert_eq!(sqlite_url("data/blocks.db"), "sqlite://data/blocks.db?mode=rwc");
    }
}
