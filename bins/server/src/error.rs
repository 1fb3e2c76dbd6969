use log_engine::EngineError;
use pipe_api::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("bind api port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl ServerError {
    pub fn config(context: &'static str, detail: impl Into<String>) -> Self {
        ServerError::Config { context, detail: detail.into() }
    }
}
