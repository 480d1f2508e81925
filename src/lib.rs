// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;

// Domain layer
pub mod presenter;
pub mod realtime;
pub mod transport;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod telemetry;
