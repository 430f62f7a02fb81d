//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// WebSocket endpoint configuration
    pub websocket: WebSocketSettings,

    /// Liveness sweep configuration
    pub heartbeat: HeartbeatSettings,

    /// JWT authentication settings
    pub jwt: JwtSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Defaults for the client connection manager
    pub client: ClientSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes (default: 64KB)
    pub max_message_size: usize,

    /// Maximum frame size in bytes (default: 16KB)
    pub max_frame_size: usize,

    /// Time a fresh connection has to complete AUTH (default: 10000)
    pub auth_timeout_ms: u64,
}

/// Heartbeat sweep configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSettings {
    /// Sweep cadence in milliseconds (default: 15000)
    pub interval_ms: u64,

    /// Silence after which a connection is evicted (default: 30000)
    pub timeout_ms: u64,

    /// Error reports from a client before it is disconnected (default: 3)
    pub max_client_errors: u32,

    /// Idle period after which the client error count decays (default: 60000)
    pub client_error_reset_ms: u64,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for verifying tokens
    pub secret: String,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// Client connection manager configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    /// Initial reconnect backoff in milliseconds
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,

    /// Retry budget before giving up
    pub max_reconnect_attempts: u32,

    /// Handshake abandonment deadline in milliseconds
    pub auth_timeout_ms: u64,

    /// Consecutive server errors that force a reconnect
    pub max_server_errors: u32,

    /// Idle period after which the server error count decays
    pub server_error_reset_ms: u64,

    /// Capacity of the offline outbox
    pub max_pending_messages: usize,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if JWT secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("websocket.max_message_size", 65536_i64)? // 64KB
            .set_default("websocket.max_frame_size", 16384_i64)? // 16KB
            .set_default("websocket.auth_timeout_ms", 10000_i64)?
            .set_default("heartbeat.interval_ms", 15000_i64)?
            .set_default("heartbeat.timeout_ms", 30000_i64)?
            .set_default("heartbeat.max_client_errors", 3_i64)?
            .set_default("heartbeat.client_error_reset_ms", 60000_i64)?
            .set_default("client.base_delay_ms", 1000_i64)?
            .set_default("client.max_delay_ms", 30000_i64)?
            .set_default("client.max_reconnect_attempts", 5_i64)?
            .set_default("client.auth_timeout_ms", 5000_i64)?
            .set_default("client.max_server_errors", 3_i64)?
            .set_default("client.server_error_reset_ms", 60000_i64)?
            .set_default("client.max_pending_messages", 1024_i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__HEARTBEAT__INTERVAL_MS=5000 -> heartbeat.interval_ms = 5000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                if settings.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
                    return Err(ConfigError::Message(format!(
                        "JWT secret must be at least {} characters for security. Current length: {}",
                        MIN_JWT_SECRET_LENGTH,
                        settings.jwt.secret.len()
                    )));
                }
                if settings.heartbeat.timeout_ms <= settings.heartbeat.interval_ms {
                    return Err(ConfigError::Message(format!(
                        "heartbeat.timeout_ms ({}) must exceed heartbeat.interval_ms ({})",
                        settings.heartbeat.timeout_ms, settings.heartbeat.interval_ms
                    )));
                }
                Ok(settings)
            })
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            max_message_size: 65536,
            max_frame_size: 16384,
            auth_timeout_ms: 10000,
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 15000,
            timeout_ms: 30000,
            max_client_errors: 3,
            client_error_reset_ms: 60000,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            max_reconnect_attempts: 5,
            auth_timeout_ms: 5000,
            max_server_errors: 3,
            server_error_reset_ms: 60000,
            max_pending_messages: 1024,
        }
    }
}
