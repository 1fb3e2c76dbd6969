use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use log_engine::{BatchReader, SizeTierGenerator, spawn_generator_task};
use pipe_api_server::{AppState, ServerInfo};

use crate::config::{DataMode, ServeArgs, ServerConfig};
use crate::error::ServerError;

/// Сколько ждать остановки задач после Ctrl+C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("pipe-server starting");

    // --- Load config ---
    let mut config = ServerConfig::load(&args.config)?;
    config.apply_serve_args(&args);
    config.validate()?;
    let mode = config.data_mode;
    tracing::info!(config = %args.config, mode = %mode, port = config.api_port, "loaded config");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    let store = super::open_store(&config).await?;
    let stats = store.stats().await?;
    tracing::info!(
        total = stats.total_records,
        bytes = stats.total_bytes,
        last_offset = ?stats.max_offset,
        "log opened"
    );

    // --- Bind API port before any background task starts ---
    let api_port = config.api_port;
    let listener = pipe_api_server::bind(api_port)
        .await
        .map_err(|source| ServerError::Bind { port: api_port, source })?;

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // --- Populate the log according to the mode ---
    match mode {
        DataMode::Generate => {
            let generator = SizeTierGenerator::new(store.clone(), config.generator.clone())?;
            handles.push(spawn_generator_task(
                generator,
                Duration::from_millis(config.generator.interval_ms),
                token.clone(),
            ));
        }
        DataMode::Test => {
            let feed = config.test_feed.to_generator_config();
            let interval = Duration::from_millis(feed.interval_ms);
            let generator = SizeTierGenerator::new(store.clone(), feed)?;
            handles.push(spawn_generator_task(generator, interval, token.clone()));
        }
        DataMode::External => {
            tracing::info!("external mode: log is populated by an external pipeline");
        }
    }

    // --- API server ---
    let reader = BatchReader::new(store.clone(), config.poll.to_limits());
    let state = AppState::new(
        reader,
        store.clone(),
        ServerInfo {
            mode: mode.to_string(),
            topology: config.topology.clone(),
        },
    );
    let api_token = token.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = pipe_api_server::serve(listener, state, api_token).await {
            tracing::error!(error = %e, "api server error");
        }
    }));

    tracing::info!(
        port = api_port,
        byte_budget = config.poll.byte_budget,
        oversize_threshold = config.poll.oversize_threshold,
        "server ready"
    );

    // --- Ожидание Ctrl+C ---
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    token.cancel();

    let drain = async {
        for h in handles.iter_mut() {
            let _ = h.await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("tasks did not stop in time, aborting");
        for h in &handles {
            h.abort();
        }
    }

    if let Err(e) = store.flush().await {
        tracing::error!(error = %e, "flush error");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn taken_port_is_a_startup_error() {
        let taken = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();

        let args = ServeArgs {
            config: dir.path().join("none.toml").to_string_lossy().into_owned(),
            port: Some(port),
            data_mode: Some(DataMode::Test),
            db_path: None,
        };
        let err = run(args).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { port: p, .. } if p == port), "{err}");
    }
}
