pub mod generate;
pub mod serve;

use std::sync::Arc;

use pipe_api::LogStore;
use storage_memory::MemoryLogStore;
use storage_sqlite::SqliteLogStore;

use crate::config::{DataMode, ServerConfig};
use crate::error::ServerError;

/// Хранилище по режиму: TEST живёт в памяти, остальные в SQLite.
/// Схема готова к возврату.
async fn open_store(config: &ServerConfig) -> Result<Arc<dyn LogStore>, ServerError> {
    let store: Arc<dyn LogStore> = match config.data_mode {
        DataMode::Test => {
            tracing::info!(max_records = config.memory.max_records, "using in-memory store");
            Arc::new(MemoryLogStore::from_config(&config.memory))
        }
        DataMode::Generate | DataMode::External => {
            Arc::new(SqliteLogStore::open(&config.storage).await?)
        }
    };
    store.init().await?;
    Ok(store)
}
