use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::format_iso;

// ════════════════════════════════════════════════════════════════
//  EventKind
// ════════════════════════════════════════════════════════════════

/// Тип события в логе.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// Обычное сообщение: consumer делает INSERT или UPDATE.
    Message,
    /// Tombstone: consumer удаляет запись по ключу. Payload может отсутствовать.
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "MESSAGE",
            EventKind::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Принимает и однобуквенные коды (`M` / `D`), которые пишет внешний pipeline.
impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MESSAGE" | "M" => Ok(EventKind::Message),
            "DELETE" | "D" => Ok(EventKind::Delete),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  LogRecord
// ════════════════════════════════════════════════════════════════

/// Запись append-only лога.
///
/// `size_bytes` хранится рядом с записью, чтобы бюджет батча считался
/// без повторной сериализации. Читатель доверяет этому значению, поэтому
/// конструкторы всегда вычисляют его из фактического payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub offset: i64,
    pub topic: String,
    pub key: String,
    pub kind: EventKind,
    pub payload: Option<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn message(
        offset: i64,
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        let size_bytes = payload.len() as u64;
        Self {
            offset,
            topic: topic.into(),
            key: key.into(),
            kind: EventKind::Message,
            payload: Some(payload),
            size_bytes,
            created_at,
        }
    }

    pub fn tombstone(
        offset: i64,
        topic: impl Into<String>,
        key: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            offset,
            topic: topic.into(),
            key: key.into(),
            kind: EventKind::Delete,
            payload: None,
            size_bytes: 0,
            created_at,
        }
    }

    /// Фактический сериализованный размер (UTF-8 байты payload).
    pub fn actual_size(&self) -> u64 {
        self.payload.as_ref().map_or(0, |p| p.len() as u64)
    }

    /// Совпадает ли сохранённый `size_bytes` с фактическим размером.
    pub fn is_consistent(&self) -> bool {
        self.size_bytes == self.actual_size()
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            offset: self.offset,
            key: self.key.clone(),
            topic: self.topic.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// Строка индекса: offset + сохранённый размер. Достаточно для
/// планирования батча без чтения payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEntry {
    pub offset: i64,
    pub size_bytes: u64,
}

impl From<&LogRecord> for SizeEntry {
    fn from(r: &LogRecord) -> Self {
        Self {
            offset: r.offset,
            size_bytes: r.size_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub offset: i64,
    pub key: String,
    pub topic: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub total_records: u64,
    pub total_bytes: u64,
    pub max_offset: Option<i64>,
}

// ════════════════════════════════════════════════════════════════
//  PollRecord: wire format
// ════════════════════════════════════════════════════════════════

/// Запись в ответе `GET /pipe/poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRecord {
    pub offset: i64,
    pub msg_key: String,
    pub event_type: EventKind,
    pub topic: String,
    pub data: Option<String>,
    pub created_at: String,
}

impl From<LogRecord> for PollRecord {
    fn from(r: LogRecord) -> Self {
        Self {
            offset: r.offset,
            msg_key: r.key,
            event_type: r.kind,
            topic: r.topic,
            data: r.payload,
            created_at: format_iso(&r.created_at),
        }
    }
}
