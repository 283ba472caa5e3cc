//! Long-running monitoring tasks
//!
//! Every loop runs as an independent tokio task. Schedulers never share a
//! task, so one slow remote command cannot delay another service's tick.
//!
//! ## Architecture Overview
//!
//! ```text
//!                     ┌──────────────────┐
//!                     │     Monitor      │
//!                     └────────┬─────────┘
//!                              │ spawns
//!         ┌────────────────────┼─────────────────────┐
//!         │                    │                     │
//! ┌───────▼────────┐  ┌────────▼───────┐   ┌─────────▼───────┐
//! │ BeatScheduler  │  │  StatusBoard   │   │  ResourceBoard  │
//! │ (one/service)  │  │     (10s)      │   │      (1s)       │
//! └───────┬────────┘  └────────┬───────┘   └─────────┬───────┘
//!         │ check + beat       │ read beats          │ stats
//!         ▼                    ▼                     ▼
//!   SessionPool ──► Storage ◄──┘              SessionPool
//!                              │                     │
//!                       services Hub           servers Hub
//! ```
//!
//! ## Actor Types
//!
//! - **BeatScheduler**: periodic check of one service, persists one beat per tick
//! - **StatusBoard**: pushes services with their recent beats to the services hub
//! - **ResourceBoard**: pushes host resource stats to the servers hub

pub mod beater;
pub mod live_board;

pub use beater::{BeatScheduler, BeaterHandle, SchedulerState, next_sleep};
pub use live_board::{ResourceBoard, StatusBoard, build_status_payloads};
