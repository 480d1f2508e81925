mod settings;

pub use settings::{
    OtelConfig, PresentationConfig, RealtimeConfig, RedisConfig, ServerConfig, Settings,
};
