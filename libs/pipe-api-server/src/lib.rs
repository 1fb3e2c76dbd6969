mod error;
mod http;
mod topology;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use log_engine::BatchReader;
use pipe_api::LogStore;

pub use error::ApiError;
pub use topology::TopologyConfig;

/// Статичные сведения о процессе для служебных endpoint'ов.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Режим данных (`generate` / `external` / `test`), как в конфиге.
    pub mode: String,
    pub topology: TopologyConfig,
}

#[derive(Clone)]
pub struct AppState {
    pub reader: Arc<BatchReader>,
    pub store: Arc<dyn LogStore>,
    pub info: Arc<ServerInfo>,
}

impl AppState {
    pub fn new(reader: BatchReader, store: Arc<dyn LogStore>, info: ServerInfo) -> Self {
        Self {
            reader: Arc::new(reader),
            store,
            info: Arc::new(info),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/pipe/poll", get(http::handle_poll))
        .route("/health", get(http::handle_health))
        .route("/status", get(http::handle_status))
        .route("/registry/topology", get(http::handle_topology))
        .with_state(state)
}

/// Занять порт API. Вызывается до запуска фоновых задач, чтобы занятый
/// порт был ошибкой старта, а не строкой в логе.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// HTTP API сервер. Завершается после `shutdown`, дождавшись текущих запросов.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let port = listener.local_addr()?.port();
    tracing::info!(port, "poll endpoint: http://localhost:{port}/pipe/poll?offset=0");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
