mod settings;

pub use settings::{
    ApiConfig, DatabaseConfig, LogFormat, LoggingConfig, OtelConfig, ServerConfig, Settings,
    StoreConfig, TimeseriesConfig, WebSocketConfig,
};
