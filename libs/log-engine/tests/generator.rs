use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use log_engine::{
    BatchOutcome, GeneratorConfig, OutlierTier, SizeTierGenerator, TestFeedConfig, TierBand,
    fill_to_target, spawn_generator_task,
};
use pipe_api::{LogRecord, LogStats, LogStore, RecordSummary, SizeEntry, StoreError, StoreFuture};
use storage_memory::MemoryLogStore;

fn config(total: u64) -> GeneratorConfig {
    GeneratorConfig {
        target_total_count: total,
        start_offset: 5_000,
        batch_size: 25,
        max_record_bytes: 9_200,
        seed: 42,
        topics: vec!["prices-v1".into(), "deposit".into()],
        large: OutlierTier {
            min_bytes: 9_000,
            max_bytes: 9_500,
            probability: 0.01,
            target_count: Some(2),
        },
        medium: OutlierTier {
            min_bytes: 4_000,
            max_bytes: 4_500,
            probability: 0.01,
            target_count: Some(3),
        },
        small: TierBand::new(200, 1_000),
        ..GeneratorConfig::default()
    }
}

async fn all_records(store: &MemoryLogStore) -> Vec<LogRecord> {
    store.fetch_range(i64::MIN, i64::MAX, u64::MAX).await.unwrap()
}

#[tokio::test]
async fn fills_exact_tier_counts_under_ceiling() {
    let store = Arc::new(MemoryLogStore::default());
    let mut generator = SizeTierGenerator::new(store.clone(), config(200)).unwrap();

    let total = fill_to_target(&mut generator, &CancellationToken::new()).await.unwrap();
    assert_eq!(total, 200);

    assert_eq!(store.count_size_range(9_000, None).await.unwrap(), 2);
    assert_eq!(store.count_size_range(4_000, Some(9_000)).await.unwrap(), 3);

    let records = all_records(&store).await;
    assert_eq!(records.len(), 200);
    let expected: Vec<i64> = (5_000..5_200).collect();
    assert_eq!(records.iter().map(|r| r.offset).collect::<Vec<_>>(), expected);

    for r in &records {
        assert!(r.size_bytes <= 9_200, "offset {} is {} bytes", r.offset, r.size_bytes);
        assert!(r.is_consistent());
        let body: serde_json::Value = serde_json::from_str(r.payload.as_deref().unwrap()).unwrap();
        assert_eq!(body["topic"], r.topic.as_str());
        assert!(r.topic == "prices-v1" || r.topic == "deposit");
    }
}

#[tokio::test]
async fn small_records_stay_in_band() {
    let store = Arc::new(MemoryLogStore::default());
    let mut cfg = config(50);
    cfg.large.target_count = Some(0);
    cfg.medium.target_count = Some(0);
    let band = cfg.small;
    let mut generator = SizeTierGenerator::new(store.clone(), cfg).unwrap();

    fill_to_target(&mut generator, &CancellationToken::new()).await.unwrap();
    for r in all_records(&store).await {
        assert!(band.contains(r.size_bytes), "{} outside small band", r.size_bytes);
    }
}

#[tokio::test]
async fn large_records_are_clamped_to_ceiling() {
    let store = Arc::new(MemoryLogStore::default());
    let mut cfg = config(10);
    cfg.large.target_count = Some(10);
    cfg.medium.target_count = Some(0);
    let mut generator = SizeTierGenerator::new(store.clone(), cfg).unwrap();

    fill_to_target(&mut generator, &CancellationToken::new()).await.unwrap();
    for r in all_records(&store).await {
        assert!((9_000..=9_200).contains(&r.size_bytes), "size {}", r.size_bytes);
    }
}

#[tokio::test]
async fn continues_after_existing_max_offset() {
    let store = Arc::new(MemoryLogStore::default());
    store
        .append_batch(vec![LogRecord::message(77, "deposit", "k", "{}".to_string(), Utc::now())])
        .await
        .unwrap();

    let mut generator = SizeTierGenerator::new(store.clone(), config(200)).unwrap();
    let BatchOutcome::Inserted(report) = generator.generate_batch().await.unwrap() else {
        panic!("expected a batch");
    };
    assert_eq!(report.first_offset, 78);
    assert_eq!(report.last_offset, 102);
    assert_eq!(report.inserted, 25);
    assert_eq!(report.counts.total, 26);
}

#[tokio::test]
async fn last_batch_is_trimmed_and_then_noop() {
    let store = Arc::new(MemoryLogStore::default());
    let mut generator = SizeTierGenerator::new(store.clone(), config(30)).unwrap();

    let BatchOutcome::Inserted(first) = generator.generate_batch().await.unwrap() else {
        panic!("expected a batch");
    };
    assert_eq!(first.inserted, 25);
    let BatchOutcome::Inserted(second) = generator.generate_batch().await.unwrap() else {
        panic!("expected a batch");
    };
    assert_eq!(second.inserted, 5);

    let before = store.stats().await.unwrap();
    assert_eq!(
        generator.generate_batch().await.unwrap(),
        BatchOutcome::Complete { total: 30 }
    );
    assert_eq!(store.stats().await.unwrap(), before);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut cfg = config(10);
    cfg.batch_size = 0;
    assert!(SizeTierGenerator::new(Arc::new(MemoryLogStore::default()), cfg).is_err());
}

#[tokio::test(start_paused = true)]
async fn task_stops_when_target_reached() {
    let store = Arc::new(MemoryLogStore::default());
    let generator = SizeTierGenerator::new(store.clone(), config(60)).unwrap();

    let handle = spawn_generator_task(generator, Duration::from_secs(5), CancellationToken::new());
    handle.await.unwrap();

    assert_eq!(store.stats().await.unwrap().total_records, 60);
}

#[tokio::test(start_paused = true)]
async fn task_stops_on_cancel() {
    let store = Arc::new(MemoryLogStore::default());
    let generator = SizeTierGenerator::new(store.clone(), config(10_000)).unwrap();
    let token = CancellationToken::new();

    let handle = spawn_generator_task(generator, Duration::from_secs(5), token.clone());
    tokio::time::sleep(Duration::from_secs(7)).await;
    token.cancel();
    handle.await.unwrap();

    // тик сразу при старте и ещё один через 5 секунд
    assert_eq!(store.stats().await.unwrap().total_records, 50);
}

#[tokio::test]
async fn test_feed_generates_only_small_records() {
    let store = Arc::new(MemoryLogStore::default());
    let feed = TestFeedConfig {
        batch_size: 5,
        max_records: 20,
        ..TestFeedConfig::default()
    };
    let mut generator = SizeTierGenerator::new(store.clone(), feed.to_generator_config()).unwrap();

    fill_to_target(&mut generator, &CancellationToken::new()).await.unwrap();
    let records = all_records(&store).await;
    assert_eq!(records.len(), 20);
    assert!(records.iter().all(|r| (5_000..=30_720).contains(&r.size_bytes)));
}

// ═══════════════════════════════════════════════════════════════
//  Write failures
// ═══════════════════════════════════════════════════════════════

/// Memory лог, у которого `append_batch` по очереди возвращает
/// заранее заданные ошибки, затем пишет как обычно.
struct FailingAppends {
    inner: MemoryLogStore,
    failures: Mutex<Vec<StoreError>>,
    attempts: AtomicUsize,
}

impl FailingAppends {
    fn new(failures: Vec<StoreError>) -> Self {
        Self {
            inner: MemoryLogStore::default(),
            failures: Mutex::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl LogStore for FailingAppends {
    fn init(&self) -> StoreFuture<'_, ()> {
        self.inner.init()
    }

    fn append_batch(&self, records: Vec<LogRecord>) -> StoreFuture<'_, ()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().unwrap().pop();
        match failure {
            Some(e) => Box::pin(async move { Err(e) }),
            None => self.inner.append_batch(records),
        }
    }

    fn scan_sizes(&self, after_offset: i64, limit: usize) -> StoreFuture<'_, Vec<SizeEntry>> {
        self.inner.scan_sizes(after_offset, limit)
    }

    fn fetch_range(
        &self,
        after_offset: i64,
        through_offset: i64,
        max_size: u64,
    ) -> StoreFuture<'_, Vec<LogRecord>> {
        self.inner.fetch_range(after_offset, through_offset, max_size)
    }

    fn stats(&self) -> StoreFuture<'_, LogStats> {
        self.inner.stats()
    }

    fn count_size_range(&self, min_bytes: u64, max_bytes: Option<u64>) -> StoreFuture<'_, u64> {
        self.inner.count_size_range(min_bytes, max_bytes)
    }

    fn recent(&self, count: usize) -> StoreFuture<'_, Vec<RecordSummary>> {
        self.inner.recent(count)
    }

    fn flush(&self) -> StoreFuture<'_, ()> {
        self.inner.flush()
    }
}

#[tokio::test(start_paused = true)]
async fn failed_write_is_retried_on_next_tick() {
    let store = Arc::new(FailingAppends::new(vec![StoreError::io("disk full")]));
    let generator = SizeTierGenerator::new(store.clone(), config(10_000)).unwrap();
    let token = CancellationToken::new();

    let handle = spawn_generator_task(generator, Duration::from_secs(5), token.clone());

    // первый тик: батч целиком откатился
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.attempts(), 1);
    assert_eq!(store.stats().await.unwrap().total_records, 0);

    // второй тик: тот же батч записан
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.attempts(), 2);
    let records = store.fetch_range(i64::MIN, i64::MAX, u64::MAX).await.unwrap();
    assert_eq!(records.len(), 25);
    assert_eq!(records[0].offset, 5_000);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn config_error_stops_the_task() {
    let store = Arc::new(FailingAppends::new(vec![StoreError::config("read-only database")]));
    let generator = SizeTierGenerator::new(store.clone(), config(10_000)).unwrap();

    let handle = spawn_generator_task(generator, Duration::from_secs(5), CancellationToken::new());
    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .expect("task must stop without cancel")
        .unwrap();

    assert_eq!(store.attempts(), 1);
    assert_eq!(store.stats().await.unwrap().total_records, 0);
}
