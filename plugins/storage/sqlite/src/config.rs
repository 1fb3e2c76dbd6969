// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

fn default_path() -> String {
    "data/events.db".into()
}

fn default_max_connections() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SqliteStorageConfig {
    /// Путь к файлу БД. Каталог создаётся при открытии.
    #[serde(default = "default_path")]
    pub path: String,
    /// Размер пула. Пишет только генератор, остальные соединения обслуживают poll'ы.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Сколько ждать снятия блокировки SQLite перед ошибкой.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}
