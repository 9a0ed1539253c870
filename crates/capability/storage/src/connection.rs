//! 数据库连接管理
//!
//! - connect_pool：建立 Postgres 连接池
//! - connect_sqlite_pool：建立 SQLite 连接池（文件不存在时创建）
//! - open_store：按配置选择后端，启动时调用一次

use crate::error::StorageError;
use crate::in_memory::InMemoryScaleStore;
use crate::postgres::PgScaleStore;
use crate::sqlite::SqliteScaleStore;
use crate::traits::ScaleStore;
use scale_config::DatabaseKind;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool};
use std::sync::Arc;
use tracing::info;

/// 建立 Postgres 连接池
///
/// 最大连接数限制为 8。
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 建立 SQLite 连接池
///
/// 接受 `sqlite:` URL 或文件路径。内存库只能使用单连接，否则每个连接各是一个库。
pub async fn connect_sqlite_pool(database_url: &str) -> Result<SqlitePool, StorageError> {
    let url = sqlite_url(database_url);
    let options = if url.contains(":memory:") {
        // 连接被回收即丢库
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    };
    let pool = options.connect(&url).await?;
    Ok(pool)
}

fn sqlite_url(database_url: &str) -> String {
    if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}?mode=rwc")
    }
}

/// 按类型打开数据库后端并建表
pub async fn open_store(
    kind: DatabaseKind,
    database_url: &str,
) -> Result<Arc<dyn ScaleStore>, StorageError> {
    let store: Arc<dyn ScaleStore> = match kind {
        DatabaseKind::Memory => Arc::new(InMemoryScaleStore::new()),
        DatabaseKind::Sqlite => Arc::new(SqliteScaleStore::connect(database_url).await?),
        DatabaseKind::Postgres => Arc::new(PgScaleStore::connect(database_url).await?),
    };
    info!(backend = store.backend(), "storage backend ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_url_accepts_paths_and_urls() {
        assert_eq!(sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(sqlite_url("data/scale.db"), "sqlite:data/scale.db?mode=rwc");
    }
}
