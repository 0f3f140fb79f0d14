//! Relay configuration.

use std::collections::HashSet;

use ript_core::Advertisement;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Id of the trunk group provisioned when none are configured.
pub const DEFAULT_TRUNK_GROUP_ID: &str = "trunkAbc";

/// Media capability of the default trunk group.
pub const DEFAULT_TRUNK_GROUP_MEDIA: &str = "1 out: opus;\n2 out: opus;\n";

/// Which side of the trunk places calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrunkDirection {
    Inbound,
    #[default]
    Outbound,
}

/// A trunk group to provision at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkGroupConfig {
    pub id: String,
    #[serde(default)]
    pub direction: TrunkDirection,
    /// Advertisement the trunk answers calls with.
    pub media_cap: Advertisement,
}

impl TrunkGroupConfig {
    pub fn new(
        id: impl Into<String>,
        direction: TrunkDirection,
        media_cap: impl Into<Advertisement>,
    ) -> Self {
        Self {
            id: id.into(),
            direction,
            media_cap: media_cap.into(),
        }
    }
}

impl Default for TrunkGroupConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_TRUNK_GROUP_ID,
            TrunkDirection::Outbound,
            DEFAULT_TRUNK_GROUP_MEDIA,
        )
    }
}

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Router name, used in logs.
    pub name: String,

    /// Capacity of the router's inbound event queue.
    pub event_queue_capacity: usize,

    /// Capacity of each face's outbound buffer.
    pub face_buffer_capacity: usize,

    /// Capacity of the channel listeners use to hand faces to the router.
    pub feed_capacity: usize,

    /// Maximum cached entries per destination. `None` keeps everything.
    pub cache_limit: Option<usize>,

    /// Whether content transfers are cached before they are broadcast.
    pub cache_content: bool,

    /// Trunk groups provisioned at startup.
    pub trunk_groups: Vec<TrunkGroupConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: "ript-relay".to_string(),
            event_queue_capacity: 200,
            face_buffer_capacity: 16,
            feed_capacity: 10,
            cache_limit: None,
            cache_content: true,
            trunk_groups: vec![TrunkGroupConfig::default()],
        }
    }
}

impl RelayConfig {
    /// Creates a configuration with the given router name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder: set event queue capacity.
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Builder: set per-face outbound buffer capacity.
    pub fn with_face_buffer_capacity(mut self, capacity: usize) -> Self {
        self.face_buffer_capacity = capacity;
        self
    }

    /// Builder: bound the cache per destination.
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = Some(limit);
        self
    }

    /// Builder: enable or disable caching of content transfers.
    pub fn with_cache_content(mut self, cache: bool) -> Self {
        self.cache_content = cache;
        self
    }

    /// Builder: replace the provisioned trunk groups.
    pub fn with_trunk_groups(mut self, trunk_groups: Vec<TrunkGroupConfig>) -> Self {
        self.trunk_groups = trunk_groups;
        self
    }

    /// Listener settings derived from this configuration.
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            face_buffer_capacity: self.face_buffer_capacity,
            feed_capacity: self.feed_capacity,
            ..Default::default()
        }
    }

    /// Checks capacities and trunk-group provisioning.
    pub fn validate(&self) -> ServerResult<()> {
        if self.event_queue_capacity == 0 {
            return Err(ServerError::config("event_queue_capacity must be > 0"));
        }
        if self.face_buffer_capacity == 0 {
            return Err(ServerError::config("face_buffer_capacity must be > 0"));
        }
        if self.feed_capacity == 0 {
            return Err(ServerError::config("feed_capacity must be > 0"));
        }
        if self.cache_limit == Some(0) {
            return Err(ServerError::config("cache_limit must be > 0 when set"));
        }

        let mut ids = HashSet::new();
        for tg in &self.trunk_groups {
            if tg.id.is_empty() {
                return Err(ServerError::config("trunk group id must not be empty"));
            }
            if !ids.insert(tg.id.as_str()) {
                return Err(ServerError::config(format!(
                    "duplicate trunk group id: {}",
                    tg.id
                )));
            }
            tg.media_cap.parse().map_err(|e| {
                ServerError::config(format!("trunk group {}: invalid media_cap: {e}", tg.id))
            })?;
        }
        Ok(())
    }
}

/// Settings shared by the TCP and WebSocket listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Capacity of each accepted face's outbound buffer.
    pub face_buffer_capacity: usize,

    /// Capacity of the feed channel towards the router.
    pub feed_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            face_buffer_capacity: 16,
            feed_capacity: 10,
        }
    }
}

impl ListenerConfig {
    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}
