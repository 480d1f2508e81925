//! Status API handlers.

mod health;
mod metrics;
mod notifications;
mod routes;
mod session;

pub use health::{health, status};
pub use metrics::prometheus_metrics;
pub use notifications::{click_notification, list_notifications};
pub use routes::api_routes;
pub use session::{reconnect, signal_online, signal_visible};
