use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use log_engine::EngineError;
use pipe_api::StoreError;

/// Ошибка HTTP слоя. Тело всегда `{"status":"error","message":"..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Некорректный запрос, до хранилища не дошли.
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ApiError::InvalidInput(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
