pub mod connection;

pub use connection::*;

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::AppResult;
use crate::store::{ActivityStore, DbActivityStore, MemoryActivityStore};

/// 按配置选择存储引擎；`memory://` 为进程内存储（数据不落盘）
pub async fn build_store(config: &DatabaseConfig) -> AppResult<Arc<dyn ActivityStore>> {
    if config.is_memory() {
        log::warn!("Using in-memory activity store, data will not survive a restart");
        return Ok(Arc::new(MemoryActivityStore::new()));
    }

    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    log::info!("Database connected and migrations applied");
    Ok(Arc::new(DbActivityStore::new(pool)))
}
