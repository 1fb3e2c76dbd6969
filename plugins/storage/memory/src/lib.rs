use std::collections::BTreeMap;

use tokio::sync::RwLock;

use pipe_api::{LogRecord, LogStats, LogStore, RecordSummary, SizeEntry, StoreError, StoreFuture};

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryStorageConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryLogStore
// ═══════════════════════════════════════════════════════════════

/// In-memory лог для TEST режима и тестов. Ограничен `max_records`:
/// при переполнении вытесняются самые старые offset'ы.
///
/// Батч вставляется под одной write-блокировкой, поэтому читатели
/// никогда не видят его частично.
pub struct MemoryLogStore {
    records: RwLock<BTreeMap<i64, LogRecord>>,
    max_records: usize,
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new(default_max_records())
    }
}

impl MemoryLogStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            max_records,
        }
    }

    pub fn from_config(config: &MemoryStorageConfig) -> Self {
        Self::new(config.max_records)
    }

    fn validate_batch(
        buf: &BTreeMap<i64, LogRecord>,
        records: &[LogRecord],
    ) -> Result<(), StoreError> {
        let mut last = buf.keys().next_back().copied();
        for r in records {
            if let Some(prev) = last {
                if r.offset <= prev {
                    return Err(StoreError::io(format!(
                        "offset {} is not after {prev}",
                        r.offset
                    )));
                }
            }
            last = Some(r.offset);
        }
        Ok(())
    }
}

impl LogStore for MemoryLogStore {
    fn init(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn append_batch(&self, records: Vec<LogRecord>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut buf = self.records.write().await;
            Self::validate_batch(&buf, &records)?;
            for record in records {
                buf.insert(record.offset, record);
            }
            while buf.len() > self.max_records {
                buf.pop_first();
            }
            Ok(())
        })
    }

    fn scan_sizes(&self, after_offset: i64, limit: usize) -> StoreFuture<'_, Vec<SizeEntry>> {
        Box::pin(async move {
            let Some(start) = after_offset.checked_add(1) else {
                return Ok(Vec::new());
            };
            let buf = self.records.read().await;
            Ok(buf
                .range(start..)
                .take(limit)
                .map(|(_, r)| SizeEntry::from(r))
                .collect())
        })
    }

    fn fetch_range(
        &self,
        after_offset: i64,
        through_offset: i64,
        max_size: u64,
    ) -> StoreFuture<'_, Vec<LogRecord>> {
        Box::pin(async move {
            let Some(start) = after_offset.checked_add(1) else {
                return Ok(Vec::new());
            };
            if start > through_offset {
                return Ok(Vec::new());
            }
            let buf = self.records.read().await;
            Ok(buf
                .range(start..=through_offset)
                .map(|(_, r)| r)
                .filter(|r| r.size_bytes <= max_size)
                .cloned()
                .collect())
        })
    }

    fn stats(&self) -> StoreFuture<'_, LogStats> {
        Box::pin(async move {
            let buf = self.records.read().await;
            Ok(LogStats {
                total_records: buf.len() as u64,
                total_bytes: buf.values().map(|r| r.size_bytes).sum(),
                max_offset: buf.keys().next_back().copied(),
            })
        })
    }

    fn count_size_range(&self, min_bytes: u64, max_bytes: Option<u64>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let buf = self.records.read().await;
            Ok(buf
                .values()
                .filter(|r| r.size_bytes >= min_bytes && max_bytes.is_none_or(|max| r.size_bytes < max))
                .count() as u64)
        })
    }

    fn recent(&self, count: usize) -> StoreFuture<'_, Vec<RecordSummary>> {
        Box::pin(async move {
            let buf = self.records.read().await;
            let mut result: Vec<RecordSummary> =
                buf.values().rev().take(count).map(LogRecord::summary).collect();
            result.reverse();
            Ok(result)
        })
    }

    fn flush(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
