//! SSH transport: pooled sessions, the `russh` client and host resource stats
//!
//! ## Layout
//!
//! - [`session`]: the [`SshConnector`] / [`RemoteShell`] seams and the pooled [`SshSession`]
//! - [`client`]: the `russh` implementation of those seams
//! - [`pool`]: [`SessionPool`], one session per server
//! - [`stats`]: `free`/`df`/`top` parsing into [`ServerStats`]

pub mod client;
pub mod pool;
pub mod session;
pub mod stats;

pub use client::RusshConnector;
pub use pool::SessionPool;
pub use session::{RemoteShell, SshConnector, SshSession};
pub use stats::ServerStats;
