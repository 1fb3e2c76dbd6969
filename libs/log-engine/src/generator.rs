use std::sync::Arc;

use chrono::Utc;
use rand::distr::{Alphanumeric, SampleString};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use pipe_api::{LogRecord, LogStats, LogStore, StoreError};

use crate::EngineError;

// ═══════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════

/// Вероятность large и medium по умолчанию. Квоты по умолчанию той же
/// доли: 0.1% от `target_total_count`.
const OUTLIER_RATIO: f64 = 0.001;

pub const DEFAULT_TOPICS: [&str; 24] = [
    "prices-v1",
    "reference-data-v5",
    "non-promotable-products",
    "prices-v4",
    "minimum-price",
    "deposit",
    "product-base-document",
    "search-product",
    "location",
    "location-clusters",
    "selling-restrictions",
    "colleague-facts-jobs",
    "colleague-facts-legacy",
    "loss-prevention-configuration",
    "loss-prevention-store-configuration",
    "loss-prevention-product",
    "loss-prevention-rule-config",
    "stored-value-services-banned-promotion",
    "stored-value-services-active-promotion",
    "colleague-card-pin",
    "colleague-card-pin-v2",
    "dcxp-content",
    "restriction-rules",
    "dcxp-ugc",
];

fn default_interval_ms() -> u64 {
    5_000
}

fn default_target_total_count() -> u64 {
    250_000
}

fn default_start_offset() -> i64 {
    1_000_000
}

fn default_batch_size() -> usize {
    500
}

fn default_max_record_bytes() -> u64 {
    1_000_000
}

fn default_topics() -> Vec<String> {
    DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()
}

fn default_probability() -> f64 {
    OUTLIER_RATIO
}

fn default_large() -> OutlierTier {
    OutlierTier {
        min_bytes: 900_000,
        max_bytes: 980_000,
        probability: OUTLIER_RATIO,
        target_count: None,
    }
}

fn default_medium() -> OutlierTier {
    OutlierTier {
        min_bytes: 450_000,
        max_bytes: 512_000,
        probability: OUTLIER_RATIO,
        target_count: None,
    }
}

fn default_small() -> TierBand {
    TierBand::new(512, 16_000)
}

/// Диапазон размеров `[min_bytes, max_bytes]` включительно.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TierBand {
    pub min_bytes: u64,
    pub max_bytes: u64,
}

impl TierBand {
    pub fn new(min_bytes: u64, max_bytes: u64) -> Self {
        Self { min_bytes, max_bytes }
    }

    pub fn contains(&self, size: u64) -> bool {
        (self.min_bytes..=self.max_bytes).contains(&size)
    }
}

/// Редкий tier (large / medium): свой диапазон, вероятность и квота.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutlierTier {
    pub min_bytes: u64,
    pub max_bytes: u64,
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Сколько таких записей должно оказаться в логе.
    /// `None`: 0.1% от `target_total_count`.
    #[serde(default)]
    pub target_count: Option<u64>,
}

impl OutlierTier {
    pub fn band(&self) -> TierBand {
        TierBand::new(self.min_bytes, self.max_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_target_total_count")]
    pub target_total_count: u64,
    /// Первый offset, если лог пуст.
    #[serde(default = "default_start_offset")]
    pub start_offset: i64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Жёсткий потолок размера записи, независимо от tier'а.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: u64,
    /// 0: случайный seed из ОС.
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_large")]
    pub large: OutlierTier,
    #[serde(default = "default_medium")]
    pub medium: OutlierTier,
    #[serde(default = "default_small")]
    pub small: TierBand,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            target_total_count: default_target_total_count(),
            start_offset: default_start_offset(),
            batch_size: default_batch_size(),
            max_record_bytes: default_max_record_bytes(),
            seed: 0,
            topics: default_topics(),
            large: default_large(),
            medium: default_medium(),
            small: default_small(),
        }
    }
}

impl GeneratorConfig {
    fn outlier_target(&self, tier: &OutlierTier) -> u64 {
        tier.target_count.unwrap_or(self.target_total_count / 1_000)
    }

    pub fn large_target(&self) -> u64 {
        self.outlier_target(&self.large)
    }

    pub fn medium_target(&self) -> u64 {
        self.outlier_target(&self.medium)
    }

    pub fn band(&self, tier: SizeTier) -> TierBand {
        match tier {
            SizeTier::Large => self.large.band(),
            SizeTier::Medium => self.medium.band(),
            SizeTier::Small => self.small,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let err = |msg: String| Err(EngineError::Config(msg));

        if self.interval_ms == 0 {
            return err("generator.interval_ms must be > 0".into());
        }
        if self.batch_size == 0 {
            return err("generator.batch_size must be > 0".into());
        }
        if self.topics.is_empty() {
            return err("generator.topics must not be empty".into());
        }

        for (name, band) in [
            ("small", self.small),
            ("medium", self.medium.band()),
            ("large", self.large.band()),
        ] {
            if band.min_bytes > band.max_bytes {
                return err(format!(
                    "generator.{name}: min_bytes {} > max_bytes {}",
                    band.min_bytes, band.max_bytes
                ));
            }
        }
        if self.small.max_bytes >= self.medium.min_bytes
            || self.medium.max_bytes >= self.large.min_bytes
        {
            return err("generator tier bands must be ordered: small < medium < large".into());
        }
        if self.max_record_bytes < self.large.min_bytes {
            return err(format!(
                "generator.max_record_bytes {} is below large.min_bytes {}",
                self.max_record_bytes, self.large.min_bytes
            ));
        }

        for (name, p) in [
            ("large", self.large.probability),
            ("medium", self.medium.probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return err(format!("generator.{name}.probability {p} is outside [0, 1]"));
            }
        }
        if self.large.probability + self.medium.probability > 1.0 {
            return err("generator probabilities sum to more than 1".into());
        }

        let outliers = self.large_target() + self.medium_target();
        if outliers > self.target_total_count {
            return err(format!(
                "outlier targets ({outliers}) exceed target_total_count {}",
                self.target_total_count
            ));
        }
        Ok(())
    }
}

fn default_feed_interval_ms() -> u64 {
    5_000
}

fn default_feed_batch_size() -> usize {
    10
}

fn default_feed_min_bytes() -> u64 {
    5_000
}

fn default_feed_max_bytes() -> u64 {
    30_720
}

fn default_feed_max_records() -> u64 {
    100_000
}

/// Лёгкий поток для TEST режима: только small записи в одном диапазоне.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestFeedConfig {
    #[serde(default = "default_feed_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_feed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_feed_min_bytes")]
    pub min_bytes: u64,
    #[serde(default = "default_feed_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_feed_max_records")]
    pub max_records: u64,
}

impl Default for TestFeedConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_feed_interval_ms(),
            batch_size: default_feed_batch_size(),
            min_bytes: default_feed_min_bytes(),
            max_bytes: default_feed_max_bytes(),
            max_records: default_feed_max_records(),
        }
    }
}

impl TestFeedConfig {
    /// Тот же генератор, но без outlier'ов.
    pub fn to_generator_config(&self) -> GeneratorConfig {
        let disabled = |tier: OutlierTier| OutlierTier {
            probability: 0.0,
            target_count: Some(0),
            ..tier
        };
        GeneratorConfig {
            interval_ms: self.interval_ms,
            target_total_count: self.max_records,
            batch_size: self.batch_size,
            small: TierBand::new(self.min_bytes, self.max_bytes),
            large: disabled(default_large()),
            medium: disabled(default_medium()),
            ..GeneratorConfig::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tier selection
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SizeTier {
    Large,
    Medium,
    Small,
}

/// Сколько записей уже в логе, всего и по outlier tier'ам.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub total: u64,
    pub large: u64,
    pub medium: u64,
}

impl TierCounts {
    fn record(&mut self, tier: SizeTier) {
        self.total += 1;
        match tier {
            SizeTier::Large => self.large += 1,
            SizeTier::Medium => self.medium += 1,
            SizeTier::Small => {}
        }
    }
}

/// Выбор tier'а для следующей записи. `r` равномерно в `[0, 1)`.
///
/// Если оставшихся слотов не больше незакрытой квоты, tier назначается
/// принудительно (сначала large), иначе квоты могли бы не добраться
/// до target к концу генерации.
pub fn choose_tier(config: &GeneratorConfig, counts: &TierCounts, r: f64) -> SizeTier {
    let need_large = config.large_target().saturating_sub(counts.large);
    let need_medium = config.medium_target().saturating_sub(counts.medium);
    if need_large == 0 && need_medium == 0 {
        return SizeTier::Small;
    }

    let slots_left = config.target_total_count.saturating_sub(counts.total);
    if need_large + need_medium >= slots_left {
        return if need_large > 0 {
            SizeTier::Large
        } else {
            SizeTier::Medium
        };
    }

    let p_large = config.large.probability;
    if need_large > 0 && r < p_large {
        return SizeTier::Large;
    }
    if need_medium > 0 && r >= p_large && r < p_large + config.medium.probability {
        return SizeTier::Medium;
    }
    SizeTier::Small
}

// ═══════════════════════════════════════════════════════════════
//  SizeTierGenerator
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub inserted: usize,
    pub first_offset: i64,
    pub last_offset: i64,
    /// Состояние лога после вставки.
    pub counts: TierCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Inserted(BatchReport),
    /// Target достигнут, ничего не записано.
    Complete { total: u64 },
}

#[derive(Serialize)]
struct Envelope<'a> {
    topic: &'a str,
    ts: i64,
    tier: SizeTier,
    payload: &'a str,
}

/// Наполняет лог синтетическими записями до `target_total_count`.
///
/// Счётчики каждый раз берутся из хранилища, поэтому генератор
/// продолжает с того же места после рестарта.
pub struct SizeTierGenerator {
    store: Arc<dyn LogStore>,
    config: GeneratorConfig,
    rng: StdRng,
}

impl SizeTierGenerator {
    pub fn new(store: Arc<dyn LogStore>, config: GeneratorConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let rng = if config.seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Ok(Self { store, config, rng })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub async fn store_stats(&self) -> Result<LogStats, EngineError> {
        Ok(self.store.stats().await?)
    }

    async fn current_counts(&self, total: u64) -> Result<TierCounts, EngineError> {
        let large_min = self.config.large.min_bytes;
        let large = if self.config.large_target() > 0 {
            self.store.count_size_range(large_min, None).await?
        } else {
            0
        };
        let medium = if self.config.medium_target() > 0 {
            self.store
                .count_size_range(self.config.medium.min_bytes, Some(large_min))
                .await?
        } else {
            0
        };
        Ok(TierCounts { total, large, medium })
    }

    /// Вставить до `batch_size` записей одной транзакцией.
    /// Если target уже достигнут, ничего не пишет.
    pub async fn generate_batch(&mut self) -> Result<BatchOutcome, EngineError> {
        let stats = self.store.stats().await?;
        let target = self.config.target_total_count;
        if stats.total_records >= target {
            tracing::debug!(total = stats.total_records, "target reached, nothing to generate");
            return Ok(BatchOutcome::Complete {
                total: stats.total_records,
            });
        }

        let mut counts = self.current_counts(stats.total_records).await?;
        let first_offset = match stats.max_offset {
            Some(max) => max
                .checked_add(1)
                .ok_or_else(|| EngineError::Config("offset space exhausted".into()))?,
            None => self.config.start_offset,
        };

        let n = (target - counts.total).min(self.config.batch_size as u64) as usize;
        let mut records = Vec::with_capacity(n);
        let mut offset = first_offset;
        for _ in 0..n {
            let tier = choose_tier(&self.config, &counts, self.rng.random());
            records.push(self.make_record(offset, tier)?);
            counts.record(tier);
            offset += 1;
        }
        let last_offset = offset - 1;

        self.store.append_batch(records).await?;

        tracing::info!(
            total = counts.total,
            large = counts.large,
            medium = counts.medium,
            first_offset,
            last_offset,
            "inserted batch"
        );
        Ok(BatchOutcome::Inserted(BatchReport {
            inserted: n,
            first_offset,
            last_offset,
            counts,
        }))
    }

    fn make_record(&mut self, offset: i64, tier: SizeTier) -> Result<LogRecord, EngineError> {
        let topic = self
            .config
            .topics
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| EngineError::Config("generator.topics must not be empty".into()))?;
        let created_at = Utc::now();
        let payload = self.build_payload(&topic, tier, created_at.timestamp_millis())?;
        let key = uuid::Uuid::new_v4().to_string();
        Ok(LogRecord::message(offset, topic, key, payload, created_at))
    }

    /// JSON envelope, добитый alphanumeric filler'ом до случайного размера
    /// внутри диапазона tier'а. Filler не требует экранирования, поэтому
    /// размер результата равен `base + filler` байт точно.
    fn build_payload(&mut self, topic: &str, tier: SizeTier, ts: i64) -> Result<String, EngineError> {
        let band = self.config.band(tier);
        let ceiling = self.config.max_record_bytes;
        let target = self
            .rng
            .random_range(band.min_bytes..=band.max_bytes)
            .min(ceiling);

        let envelope = |payload: &str| {
            serde_json::to_string(&Envelope {
                topic,
                ts,
                tier,
                payload,
            })
            .map_err(StoreError::from)
        };

        let base = envelope("")?.len() as u64;
        if base > ceiling {
            return Err(EngineError::Config(format!(
                "record envelope ({base} bytes) exceeds max_record_bytes {ceiling}"
            )));
        }

        let filler_len = target.saturating_sub(base) as usize;
        let filler = Alphanumeric.sample_string(&mut self.rng, filler_len);
        Ok(envelope(&filler)?)
    }
}
