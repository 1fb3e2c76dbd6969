use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{BatchOutcome, EngineError, SizeTierGenerator};

/// Фоновая задача генератора.
///
/// Одна задача владеет генератором и вызывает `generate_batch` по тику,
/// поэтому два батча никогда не пишутся одновременно. Тики, пропущенные
/// пока батч пишется, отбрасываются (`MissedTickBehavior::Skip`).
///
/// Transient ошибки логируются и повторяются на следующем тике. Задача
/// завершается по cancel, по достижению target или на permanent ошибке.
pub fn spawn_generator_task(
    mut generator: SizeTierGenerator,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let period = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_ms = period.as_millis() as u64,
            target = generator.config().target_total_count,
            "generator task started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("generator task cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match generator.generate_batch().await {
                Ok(BatchOutcome::Inserted(_)) => {}
                Ok(BatchOutcome::Complete { total }) => {
                    tracing::info!(total, "target reached, generator task finished");
                    break;
                }
                Err(e) if e.is_transient() => {
                    tracing::error!(error = %e, "generator batch failed, retrying next tick");
                }
                Err(e) => {
                    tracing::error!(error = %e, "generator stopped");
                    break;
                }
            }
        }
    })
}

/// Писать батчи подряд, без интервала, пока не будет достигнут target.
/// Возвращает итоговое количество записей в логе.
pub async fn fill_to_target(
    generator: &mut SizeTierGenerator,
    token: &CancellationToken,
) -> Result<u64, EngineError> {
    loop {
        if token.is_cancelled() {
            let stats = generator.store_stats().await?;
            tracing::info!(total = stats.total_records, "generation interrupted");
            return Ok(stats.total_records);
        }
        match generator.generate_batch().await? {
            BatchOutcome::Inserted(_) => {}
            BatchOutcome::Complete { total } => return Ok(total),
        }
    }
}
