use std::future::Future;
use std::pin::Pin;

use crate::{LogRecord, LogStats, RecordSummary, SizeEntry, StoreError};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Append-only лог, упорядоченный по offset.
///
/// Ядру нужны только две вещи от движка: упорядоченный range scan по offset
/// и транзакционная вставка батча. Остальные методы: для генератора
/// (подсчёт по размерам) и служебных endpoint'ов.
pub trait LogStore: Send + Sync {
    /// Создать схему / подготовить backend. Идемпотентно.
    fn init(&self) -> StoreFuture<'_, ()>;

    /// Вставить батч атомарно: либо все записи видны, либо ни одной.
    /// Offset'ы батча должны быть новыми и строго возрастающими.
    fn append_batch(&self, records: Vec<LogRecord>) -> StoreFuture<'_, ()>;

    /// До `limit` пар (offset, size_bytes) с offset > `after_offset`,
    /// по возрастанию offset. Payload не читается.
    fn scan_sizes(&self, after_offset: i64, limit: usize) -> StoreFuture<'_, Vec<SizeEntry>>;

    /// Полные записи с `after_offset < offset <= through_offset` и
    /// `size_bytes <= max_size`, по возрастанию offset.
    fn fetch_range(
        &self,
        after_offset: i64,
        through_offset: i64,
        max_size: u64,
    ) -> StoreFuture<'_, Vec<LogRecord>>;

    fn stats(&self) -> StoreFuture<'_, LogStats>;

    /// Количество записей с `min_bytes <= size_bytes < max_bytes`
    /// (`None`: без верхней границы).
    fn count_size_range(&self, min_bytes: u64, max_bytes: Option<u64>) -> StoreFuture<'_, u64>;

    /// Последние `count` записей (без payload), по возрастанию offset.
    fn recent(&self, count: usize) -> StoreFuture<'_, Vec<RecordSummary>>;

    fn flush(&self) -> StoreFuture<'_, ()>;
}
