//! Gateway router: the hub's request-time hot path.
//!
//! Every inbound call walks the same pipeline: authenticate the connection,
//! authorize the model against its allow-list, resolve one registry
//! snapshot, run the rule's policy steps (default-parameter injection,
//! credential substitution, per-connection quota), then dispatch with a
//! bounded timeout. Handlers are thin; all decisions live in
//! [`domain::service::GatewayService`].

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;

pub use api::rest::{AppState, router};
pub use config::GatewayConfig;
pub use domain::rate_limit::{Clock, FixedWindowLimiter, ManualClock, SystemClock};
pub use domain::service::{GatewayService, ServiceConfig};
pub use infra::credentials::StaticCredentialSource;
pub use infra::http::HttpDispatcher;
