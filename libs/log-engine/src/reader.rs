use std::sync::Arc;
use std::time::Duration;

use pipe_api::{LogRecord, LogStore, SizeEntry};

use crate::EngineError;

// ═══════════════════════════════════════════════════════════════
//  ReadLimits
// ═══════════════════════════════════════════════════════════════

pub const DEFAULT_BYTE_BUDGET: u64 = 1_048_576;
pub const DEFAULT_OVERSIZE_THRESHOLD: u64 = 19_990;
pub const DEFAULT_SCAN_PAGE: usize = 1_024;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Серверные лимиты чтения. Клиент ими не управляет.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// Потолок суммы `size_bytes` одного батча.
    pub byte_budget: u64,
    /// Записи крупнее этого порога reader не отдаёт никогда.
    pub oversize_threshold: u64,
    /// Сколько строк (offset, size) читать за один запрос при планировании.
    pub scan_page: usize,
    pub read_timeout: Duration,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            byte_budget: DEFAULT_BYTE_BUDGET,
            oversize_threshold: DEFAULT_OVERSIZE_THRESHOLD,
            scan_page: DEFAULT_SCAN_PAGE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  BudgetPlanner
// ═══════════════════════════════════════════════════════════════

/// Итог планирования: батч заканчивается на `through` включительно.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub through: i64,
    pub records: usize,
    pub bytes: u64,
}

/// Running-sum планировщик батча.
///
/// Получает (offset, size) по возрастанию offset и решает, где батч
/// заканчивается:
/// - oversize записи пропускаются, как будто их нет;
/// - запись берётся, пока сумма строго меньше `byte_budget`;
/// - первая запись, доводящая сумму до бюджета, закрывает батч (уйдёт в следующий poll);
/// - первая не-oversize запись берётся всегда, даже если одна больше бюджета.
#[derive(Debug)]
pub struct BudgetPlanner {
    budget: u64,
    oversize_threshold: u64,
    bytes: u64,
    records: usize,
    through: Option<i64>,
    closed: bool,
}

impl BudgetPlanner {
    pub fn new(budget: u64, oversize_threshold: u64) -> Self {
        Self {
            budget,
            oversize_threshold,
            bytes: 0,
            records: 0,
            through: None,
            closed: false,
        }
    }

    pub fn from_limits(limits: &ReadLimits) -> Self {
        Self::new(limits.byte_budget, limits.oversize_threshold)
    }

    /// Предложить следующую запись. `false`: батч закрыт, дальше не читать.
    pub fn offer(&mut self, entry: SizeEntry) -> bool {
        if self.closed {
            return false;
        }
        if entry.size_bytes > self.oversize_threshold {
            return true;
        }

        let next = self.bytes.saturating_add(entry.size_bytes);
        if self.records > 0 && next >= self.budget {
            self.closed = true;
            return false;
        }

        self.bytes = next;
        self.records += 1;
        self.through = Some(entry.offset);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `None`: после курсора нет ни одной отдаваемой записи.
    pub fn finish(self) -> Option<BatchPlan> {
        self.through.map(|through| BatchPlan {
            through,
            records: self.records,
            bytes: self.bytes,
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  BatchReader
// ═══════════════════════════════════════════════════════════════

/// Чтение батча после курсора.
///
/// Двухфазное: сначала постраничный scan только (offset, size_bytes)
/// и планирование, затем один ranged fetch запланированных записей.
/// Состояния между запросами нет.
pub struct BatchReader {
    store: Arc<dyn LogStore>,
    limits: ReadLimits,
}

impl BatchReader {
    pub fn new(store: Arc<dyn LogStore>, limits: ReadLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &ReadLimits {
        &self.limits
    }

    /// Записи с offset > `after_offset`, уложенные в byte budget.
    /// Пустой результат: "новых данных нет", не ошибка.
    pub async fn read_after(&self, after_offset: i64) -> Result<Vec<LogRecord>, EngineError> {
        let timeout = self.limits.read_timeout;
        let batch = tokio::time::timeout(timeout, self.read_unbounded(after_offset))
            .await
            .map_err(|_| EngineError::Timeout(timeout))??;

        tracing::debug!(
            after_offset,
            returned = batch.len(),
            bytes = batch.iter().map(|r| r.size_bytes).sum::<u64>(),
            "batch read"
        );
        Ok(batch)
    }

    async fn read_unbounded(&self, after_offset: i64) -> Result<Vec<LogRecord>, EngineError> {
        let mut cursor = after_offset;
        loop {
            let Some(plan) = self.plan(cursor).await? else {
                return Ok(Vec::new());
            };

            let fetched = self
                .store
                .fetch_range(cursor, plan.through, self.limits.oversize_threshold)
                .await?;
            let fetched_len = fetched.len();

            let batch: Vec<LogRecord> = fetched
                .into_iter()
                .filter(|r| {
                    let ok = r.is_consistent();
                    if !ok {
                        tracing::error!(
                            offset = r.offset,
                            stored = r.size_bytes,
                            actual = r.actual_size(),
                            "size_bytes mismatch, skipping record"
                        );
                    }
                    ok
                })
                .collect();

            if !batch.is_empty() || fetched_len == 0 {
                return Ok(batch);
            }

            // Весь батч битый: планируем заново после него, иначе клиент
            // навсегда застрянет на 204 перед этими offset'ами.
            tracing::warn!(
                after_offset = cursor,
                through = plan.through,
                skipped = fetched_len,
                "whole batch failed integrity check, re-planning"
            );
            cursor = plan.through;
        }
    }

    async fn plan(&self, after_offset: i64) -> Result<Option<BatchPlan>, EngineError> {
        let mut planner = BudgetPlanner::from_limits(&self.limits);
        let page = self.limits.scan_page.max(1);
        let mut cursor = after_offset;

        loop {
            let entries = self.store.scan_sizes(cursor, page).await?;
            let Some(last) = entries.last() else {
                break;
            };
            cursor = last.offset;
            let exhausted = entries.len() < page;

            for entry in entries {
                if !planner.offer(entry) {
                    break;
                }
            }
            if planner.is_closed() || exhausted {
                break;
            }
        }

        Ok(planner.finish())
    }
}
