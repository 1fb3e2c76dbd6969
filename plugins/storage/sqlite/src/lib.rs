mod config;
mod storage;

pub use config::SqliteStorageConfig;
pub use storage::SqliteLogStore;
