use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::realtime::BackoffConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub presentation: PresentationConfig,
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

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Transport backend: "memory" or "redis"
    #[serde(default = "default_transport")]
    pub transport: String,
    /// Identity the runner subscribes as; no identity means no subscription
    #[serde(default)]
    pub user_id: Option<String>,
    /// Logical channel name
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Failed resubscriptions tolerated before degrading
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,
    /// Time allowed for the transport to acknowledge a subscription
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout_seconds: u64,
    /// Treat every delivered row change as proof the channel is healthy
    #[serde(default = "default_true")]
    pub liveness_resets_retries: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Pub/sub channel name prefix
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresentationConfig {
    #[serde(default = "default_long_toast_ms")]
    pub conversation_toast_ms: u64,
    #[serde(default = "default_long_toast_ms")]
    pub member_toast_ms: u64,
    #[serde(default = "default_short_toast_ms")]
    pub message_toast_ms: u64,
    /// Path desktop notifications navigate to; the conversation id is
    /// appended as a query parameter
    #[serde(default = "default_conversation_path")]
    pub conversation_path: String,
}

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

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_transport() -> String {
    "memory".to_string()
}

fn default_channel() -> String {
    "chat-realtime".to_string()
}

fn default_max_retries() -> u32 {
    15
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000 // 1 minute
}

fn default_backoff_jitter_ms() -> u64 {
    1_000
}

fn default_subscribe_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_channel_prefix() -> String {
    "realtime".to_string()
}

fn default_long_toast_ms() -> u64 {
    3_000
}

fn default_short_toast_ms() -> u64 {
    2_000
}

fn default_conversation_path() -> String {
    "/chat".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "chat-realtime".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("realtime.transport", default_transport())?
            .set_default("realtime.max_retries", default_max_retries())?
            .set_default("redis.url", default_redis_url())?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CHAT_REALTIME__USER_ID, CHAT_SERVER__PORT, CHAT_REDIS__URL, ...
            .add_source(
                Environment::with_prefix("CHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl RealtimeConfig {
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: self.backoff_base_ms,
            max_delay_ms: self.backoff_max_ms,
            max_jitter_ms: self.backoff_jitter_ms,
        }
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.subscribe_timeout_seconds)
    }
}

impl PresentationConfig {
    /// Deep link to a conversation; the id is form-encoded into the query
    pub fn conversation_link(&self, conversation_id: &str) -> String {
        let id: String =
            url::form_urlencoded::byte_serialize(conversation_id.as_bytes()).collect();
        format!("{}?conversationId={}", self.conversation_path, id)
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

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            user_id: None,
            channel: default_channel(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter_ms: default_backoff_jitter_ms(),
            subscribe_timeout_seconds: default_subscribe_timeout(),
            liveness_resets_retries: true,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            channel_prefix: default_channel_prefix(),
        }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            conversation_toast_ms: default_long_toast_ms(),
            member_toast_ms: default_long_toast_ms(),
            message_toast_ms: default_short_toast_ms(),
            conversation_path: default_conversation_path(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);
    }

    #[test]
    fn test_realtime_defaults() {
        let realtime = RealtimeConfig::default();
        assert_eq!(realtime.transport, "memory");
        assert_eq!(realtime.max_retries, 15);
        assert!(realtime.liveness_resets_retries);
        assert!(realtime.user_id.is_none());

        let backoff = realtime.backoff();
        assert_eq!(backoff.base_delay_ms, 1_000);
        assert_eq!(backoff.max_delay_ms, 60_000);
        assert_eq!(backoff.max_jitter_ms, 1_000);
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"realtime": {"user_id": "u1", "max_retries": 3}}"#,
        )
        .unwrap();

        assert_eq!(settings.realtime.user_id.as_deref(), Some("u1"));
        assert_eq!(settings.realtime.max_retries, 3);
        assert_eq!(settings.realtime.backoff_base_ms, 1_000);
        assert_eq!(settings.presentation.message_toast_ms, 2_000);
        assert_eq!(settings.redis.channel_prefix, "realtime");
    }

    #[test]
    fn test_conversation_link() {
        let presentation = PresentationConfig::default();
        assert_eq!(
            presentation.conversation_link("c1"),
            "/chat?conversationId=c1"
        );
        assert_eq!(
            presentation.conversation_link("a b&c#d"),
            "/chat?conversationId=a+b%26c%23d"
        );
    }

    #[test]
    fn test_otel_defaults() {
        let otel = OtelConfig::default();
        assert!(!otel.enabled);
        assert_eq!(otel.endpoint, "http://localhost:4317");
        assert_eq!(otel.service_name, "chat-realtime");
        assert_eq!(otel.sampling_ratio, 1.0);
    }
}
