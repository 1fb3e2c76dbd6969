use std::time::Duration;

use pipe_api::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("read timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("config: {0}")]
    Config(String),
}

impl EngineError {
    /// Повторить на следующем тике имеет смысл только для ошибок хранилища
    /// и таймаутов; ошибка конфигурации не исправится сама.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_transient(),
            EngineError::Timeout(_) => true,
            EngineError::Config(_) => false,
        }
    }
}
