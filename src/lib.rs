//! Agentless host and service monitoring over pooled SSH sessions
//!
//! ## Modules
//!
//! - [`ssh`]: one pooled session per server, liveness and resource stats
//! - [`checks`]: online, process status and log tail check strategies
//! - [`actors`]: per-service beat schedulers and the live boards
//! - [`broadcast`]: channel-keyed subscriber hubs
//! - [`monitor`]: the process-scoped core and its lifecycle hooks
//! - [`storage`]: registry and beat log backends
//! - `api`: HTTP/WebSocket adapter (feature `api`)

pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod broadcast;
pub mod checks;
pub mod config;
pub mod model;
pub mod monitor;
pub mod ssh;
pub mod storage;
pub mod util;
