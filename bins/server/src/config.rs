use std::path::Path;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use log_engine::reader::{
    DEFAULT_BYTE_BUDGET, DEFAULT_OVERSIZE_THRESHOLD, DEFAULT_READ_TIMEOUT, DEFAULT_SCAN_PAGE,
};
use log_engine::{GeneratorConfig, ReadLimits, TestFeedConfig};
use pipe_api_server::TopologyConfig;
use storage_memory::MemoryStorageConfig;
use storage_sqlite::SqliteStorageConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "pipe-server", about = "Append-only лог с offset polling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить сервер: poll API + наполнение лога по режиму
    Serve(ServeArgs),
    /// Наполнить SQLite лог до target одним прогоном и выйти
    Generate(GenerateArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Путь к TOML конфиг файлу
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
    /// Порт HTTP API (перекрывает `api_port`)
    #[arg(long, env = "PIPE_API_PORT")]
    pub port: Option<u16>,
    /// Режим данных (перекрывает `data_mode`)
    #[arg(long, env = "DATA_MODE", ignore_case = true)]
    pub data_mode: Option<DataMode>,
    /// Путь к SQLite файлу (перекрывает `storage.path`)
    #[arg(long, env = "SQLITE_DB_PATH")]
    pub db_path: Option<String>,
}

#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    #[arg(long, default_value = "config.toml", env = "CONFIG_PATH")]
    pub config: String,
    #[arg(long, env = "SQLITE_DB_PATH")]
    pub db_path: Option<String>,
}

// ---- Data mode ----

/// Откуда берутся записи лога.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    /// SQLite + Size-Tiered генератор.
    #[default]
    #[serde(alias = "GENERATE")]
    Generate,
    /// SQLite, наполняемый внешним pipeline. Только чтение.
    #[serde(alias = "EXTERNAL")]
    External,
    /// In-memory лог + лёгкий test feed.
    #[serde(alias = "TEST")]
    Test,
}

impl DataMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataMode::Generate => "generate",
            DataMode::External => "external",
            DataMode::Test => "test",
        }
    }
}

impl std::fmt::Display for DataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---- TOML Config ----

fn default_api_port() -> u16 {
    8080
}

fn default_byte_budget() -> u64 {
    DEFAULT_BYTE_BUDGET
}

fn default_oversize_threshold() -> u64 {
    DEFAULT_OVERSIZE_THRESHOLD
}

fn default_scan_page() -> usize {
    DEFAULT_SCAN_PAGE
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT.as_millis() as u64
}

/// `[poll]`: лимиты чтения, одинаковые для всех клиентов.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_byte_budget")]
    pub byte_budget: u64,
    #[serde(default = "default_oversize_threshold")]
    pub oversize_threshold: u64,
    #[serde(default = "default_scan_page")]
    pub scan_page: usize,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            byte_budget: default_byte_budget(),
            oversize_threshold: default_oversize_threshold(),
            scan_page: default_scan_page(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl PollConfig {
    pub fn to_limits(&self) -> ReadLimits {
        ReadLimits {
            byte_budget: self.byte_budget,
            oversize_threshold: self.oversize_threshold,
            scan_page: self.scan_page,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub data_mode: DataMode,
    #[serde(default)]
    pub storage: SqliteStorageConfig,
    /// Хранилище TEST режима.
    #[serde(default)]
    pub memory: MemoryStorageConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub test_feed: TestFeedConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            data_mode: DataMode::default(),
            storage: SqliteStorageConfig::default(),
            memory: MemoryStorageConfig::default(),
            poll: PollConfig::default(),
            generator: GeneratorConfig::default(),
            test_feed: TestFeedConfig::default(),
            topology: TopologyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Нет файла: значения по умолчанию. Битый файл считается ошибкой.
    pub fn load(path: &str) -> Result<Self, ServerError> {
        if !Path::new(path).exists() {
            tracing::info!(config = %path, "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::config("read", format!("'{path}': {e}")))?;
        Self::parse(&content).map_err(|e| match e {
            ServerError::Config { context, detail } => {
                ServerError::Config { context, detail: format!("'{path}': {detail}") }
            }
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ServerError> {
        toml::from_str(content).map_err(|e| ServerError::config("parse", e.to_string()))
    }

    /// CLI / env поверх файла.
    pub fn apply_serve_args(&mut self, args: &ServeArgs) {
        if let Some(port) = args.port {
            self.api_port = port;
        }
        if let Some(mode) = args.data_mode {
            self.data_mode = mode;
        }
        if let Some(path) = &args.db_path {
            self.storage.path = path.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.poll.byte_budget == 0 {
            return Err(ServerError::config("poll", "byte_budget must be > 0"));
        }
        if self.poll.scan_page == 0 {
            return Err(ServerError::config("poll", "scan_page must be > 0"));
        }
        if self.poll.read_timeout_ms == 0 {
            return Err(ServerError::config("poll", "read_timeout_ms must be > 0"));
        }

        match self.data_mode {
            DataMode::Generate => self.generator.validate(),
            DataMode::Test => self.test_feed.to_generator_config().validate(),
            DataMode::External => Ok(()),
        }
        .map_err(|e| ServerError::config("validate", e.to_string()))
    }
}
