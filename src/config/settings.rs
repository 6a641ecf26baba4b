use config::{Config, ConfigError, File, Value};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub timeseries: TimeseriesConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Key required in `X-API-Key` for the publish endpoint. Open when unset.
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends heartbeat message)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Connection timeout in seconds (evict if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Upper bound for a single send during a broadcast, in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Outbound queue depth per connection
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    /// Maximum sends in flight during one broadcast pass
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

fn default_send_timeout_ms() -> u64 {
    2000
}

fn default_channel_buffer_size() -> usize {
    32
}

fn default_max_concurrent_sends() -> usize {
    100
}

/// Bounds and caching for timeseries queries.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeseriesConfig {
    #[serde(default = "default_min_points")]
    pub min_points: usize,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    #[serde(default = "default_points")]
    pub default_points: usize,
    #[serde(default = "default_min_window")]
    pub min_window: usize,
    #[serde(default = "default_max_window")]
    pub max_window: usize,
    #[serde(default = "default_window")]
    pub default_window: usize,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

fn default_min_points() -> usize {
    10
}

fn default_max_points() -> usize {
    200
}

fn default_points() -> usize {
    120
}

fn default_min_window() -> usize {
    2
}

fn default_max_window() -> usize {
    25
}

fn default_window() -> usize {
    3
}

fn default_cache_ttl_seconds() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

fn default_store_backend() -> String {
    "memory".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/polls".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    300
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// OpenTelemetry exporter settings
#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "pollcast".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Environment prefixes and the config path each one maps onto. Longest
/// prefix first so `STORE_DATABASE_URL` lands in `store.database`.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("STORE_DATABASE_", "store.database"),
    ("SERVER_", "server"),
    ("API_", "api"),
    ("WEBSOCKET_", "websocket"),
    ("TIMESERIES_", "timeseries"),
    ("STORE_", "store"),
    ("LOGGING_", "logging"),
    ("OTEL_", "otel"),
];

/// Keys whose environment value is a comma separated list
const LIST_KEYS: &[&str] = &["server.cors_origins"];

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        Self::load(&run_mode, env::vars())
    }

    /// Defaults, then `config/default` and `config/{run_mode}`, then the
    /// given environment: `TIMESERIES_CACHE_TTL_SECONDS`, `SERVER_PORT`,
    /// `STORE_DATABASE_POOL_SIZE`, `OTEL_SERVICE_NAME`, ...
    pub fn load<I>(run_mode: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("websocket.connection_timeout", 120)?
            .set_default("websocket.cleanup_interval", 60)?
            .set_default("timeseries.cache_ttl_seconds", 5)?
            .set_default("store.backend", "memory")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        for (key, value) in env_overrides(vars) {
            builder = builder.set_override(key, value)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
            send_timeout_ms: default_send_timeout_ms(),
            channel_buffer_size: default_channel_buffer_size(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

impl Default for TimeseriesConfig {
    fn default() -> Self {
        Self {
            min_points: default_min_points(),
            max_points: default_max_points(),
            default_points: default_points(),
            min_window: default_min_window(),
            max_window: default_max_window(),
            default_window: default_window(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

/// Map `SECTION_FIELD` variables onto `section.field` config keys.
/// Variables outside the known sections, and empty values, are ignored.
fn env_overrides<I>(vars: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(_, value)| !value.is_empty())
        .filter_map(|(name, value)| {
            let (prefix, section) = ENV_SECTIONS
                .iter()
                .find(|(prefix, _)| name.starts_with(prefix))?;
            let field = name[prefix.len()..].to_lowercase();
            if field.is_empty() {
                return None;
            }
            let key = format!("{}.{}", section, field);

            let value = if LIST_KEYS.contains(&key.as_str()) {
                let items: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect();
                Value::from(items)
            } else {
                Value::from(value)
            };
            Some((key, value))
        })
        .collect()
}
