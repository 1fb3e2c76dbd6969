use std::time::Instant;

use tokio_util::sync::CancellationToken;

use log_engine::{SizeTierGenerator, fill_to_target};

use crate::config::{DataMode, GenerateArgs, ServerConfig};
use crate::error::ServerError;

/// Одноразовое наполнение SQLite лога теми же транзакционными батчами,
/// что и в `serve`, но без интервала.
pub async fn run(args: GenerateArgs) -> Result<(), ServerError> {
    let mut config = ServerConfig::load(&args.config)?;
    if let Some(path) = args.db_path {
        config.storage.path = path;
    }
    config.data_mode = DataMode::Generate;
    config.validate()?;

    let store = super::open_store(&config).await?;
    let mut generator = SizeTierGenerator::new(store.clone(), config.generator.clone())?;

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after current batch");
            signal_token.cancel();
        }
    });

    tracing::info!(
        path = %config.storage.path,
        target = config.generator.target_total_count,
        large = config.generator.large_target(),
        medium = config.generator.medium_target(),
        "generating"
    );

    let started = Instant::now();
    let total = fill_to_target(&mut generator, &token).await?;
    store.flush().await?;

    tracing::info!(
        total,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "generation finished"
    );
    Ok(())
}
