//! Channel-keyed fan-out of live board payloads
//!
//! ## Channel numbering
//!
//! ```text
//!   n > 0   service n (status hub) / server n (resource hub)
//!   0       global feed
//!  -n       every service of server n (status hub)
//! ```
//!
//! Delivery is best effort: a subscriber whose send fails is logged and
//! skipped, the remaining subscribers still receive the payload.

pub mod hub;
pub mod subscriber;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{ServerId, ServiceId};

pub use hub::{Hub, SubscriberId};
pub use subscriber::{QueueSubscriber, Subscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl ChannelId {
    pub const GLOBAL: ChannelId = ChannelId(0);

    /// Feed of a single service
    pub fn service(id: ServiceId) -> Self {
        ChannelId(id)
    }

    /// Aggregate feed of all services on a server
    pub fn server(id: ServerId) -> Self {
        ChannelId(-id)
    }

    /// Resource feed of a single host
    pub fn host(id: ServerId) -> Self {
        ChannelId(id)
    }

    pub fn is_global(&self) -> bool {
        self.0 == 0
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        ChannelId::GLOBAL
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ChannelId)
    }
}
