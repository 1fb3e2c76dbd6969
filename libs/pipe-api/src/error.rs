/// Категория ошибки хранилища. Позволяет вызывающей стороне решить,
/// что делать дальше (повторить на следующем тике, вернуть 500, упасть на старте).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Некорректная конфигурация: permanent, fail at startup.
    Config,
    /// I/O или ошибка движка БД: transient.
    Io,
    /// Данные в хранилище не парсятся (битая дата, неизвестный event_type).
    Format,
    /// Запрос к хранилищу не уложился в таймаут.
    Timeout,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Timeout => f.write_str("timeout"),
        }
    }
}

/// Единый тип ошибки для всех методов `LogStore`.
///
/// Несёт `ErrorKind` и человекочитаемое сообщение. Backend'ы
/// конвертируют свои ошибки через конструкторы (`io`, `format_err`, ...).
#[derive(Clone)]
pub struct StoreError {
    kind: ErrorKind,
    message: String,
}

impl StoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Timeout, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Имеет ли смысл повторить операцию позже (на следующем тике генератора).
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Io | ErrorKind::Timeout)
    }
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self { kind: ErrorKind::Io, message: e.to_string() }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self { kind: ErrorKind::Format, message: e.to_string() }
    }
}

impl From<chrono::ParseError> for StoreError {
    fn from(e: chrono::ParseError) -> Self {
        Self { kind: ErrorKind::Format, message: format!("timestamp: {e}") }
    }
}
