//! RIPT service: trunk groups, handler registration and call placement.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ript_core::{Advertisement, AdvertisementInfo, DirectiveInfo, match_capabilities};
use ript_protocol::{
    CallResponse, CallsMessage, RegisterHandlerMessage, TrunkGroupInfo, TrunkGroupsInfoMessage,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RelayConfig, TrunkDirection, TrunkGroupConfig};
use crate::error::{ServerError, ServerResult};

/// Root of every URI the service mints.
pub const BASE_URL: &str = "/.well-known/ript/v1";

/// Root of trunk-group URIs.
pub const TRUNK_GROUPS_URL: &str = "/.well-known/ript/v1/providertgs";

/// A provisioned trunk group.
#[derive(Debug, Clone)]
pub struct TrunkGroup {
    pub id: String,
    pub uri: String,
    pub direction: TrunkDirection,
    pub media_cap: Advertisement,
    media_info: AdvertisementInfo,
    /// The most recently placed call.
    pub call: Option<Call>,
}

impl TrunkGroup {
    fn provision(config: &TrunkGroupConfig) -> ServerResult<Self> {
        let media_info = config.media_cap.parse()?;
        Ok(Self {
            id: config.id.clone(),
            uri: format!("{TRUNK_GROUPS_URL}/{}", config.id),
            direction: config.direction,
            media_cap: config.media_cap.clone(),
            media_info,
            call: None,
        })
    }
}

/// A registered handler.
#[derive(Debug, Clone)]
pub struct Handler {
    /// Client-chosen id.
    pub id: String,
    pub advertisement: Advertisement,
    pub info: AdvertisementInfo,
    /// Server-minted URI calls refer to.
    pub uri: String,
    pub registered_at: DateTime<Utc>,
}

/// A call placed on a trunk group.
#[derive(Debug, Clone)]
pub struct Call {
    pub id: String,
    pub uri: String,
    pub handler_uri: String,
    /// The directive reported to the caller.
    pub directive: DirectiveInfo,
    pub created_at: DateTime<Utc>,
}

/// Service state: provisioned trunk groups and registered handlers.
#[derive(Debug)]
pub struct RiptService {
    trunk_groups: Vec<TrunkGroup>,
    /// Keyed by client-chosen handler id.
    handlers: HashMap<String, Handler>,
}

impl Default for RiptService {
    fn default() -> Self {
        // The default trunk group always parses.
        Self::new(&[TrunkGroupConfig::default()]).unwrap_or(Self {
            trunk_groups: Vec::new(),
            handlers: HashMap::new(),
        })
    }
}

impl RiptService {
    /// Provisions the given trunk groups.
    pub fn new(trunk_groups: &[TrunkGroupConfig]) -> ServerResult<Self> {
        let trunk_groups = trunk_groups
            .iter()
            .map(TrunkGroup::provision)
            .collect::<ServerResult<Vec<_>>>()?;

        for tg in &trunk_groups {
            info!(
                trunk_group = %tg.id,
                uri = %tg.uri,
                direction = ?tg.direction,
                "Provisioned trunk group"
            );
        }

        Ok(Self {
            trunk_groups,
            handlers: HashMap::new(),
        })
    }

    pub fn from_config(config: &RelayConfig) -> ServerResult<Self> {
        Self::new(&config.trunk_groups)
    }

    /// Every provisioned trunk group's URI, in provisioning order.
    pub fn list_trunk_groups(&self) -> TrunkGroupsInfoMessage {
        TrunkGroupsInfoMessage {
            trunk_groups: self
                .trunk_groups
                .iter()
                .map(|tg| TrunkGroupInfo { uri: tg.uri.clone() })
                .collect(),
        }
    }

    /// Registers a handler and returns the URI minted for it.
    ///
    /// The advertisement is parsed before anything is stored, so a grammar
    /// error leaves the service unchanged. Re-registering an id replaces the
    /// previous handler.
    pub fn register_handler(
        &mut self,
        message: RegisterHandlerMessage,
    ) -> ServerResult<RegisterHandlerMessage> {
        let request = message.request;
        let info = request.advertisement.parse()?;

        let scope = self
            .trunk_groups
            .first()
            .map_or(crate::config::DEFAULT_TRUNK_GROUP_ID, |tg| tg.id.as_str());
        let uri = format!("{TRUNK_GROUPS_URL}/{scope}/{}", Uuid::new_v4());

        let handler = Handler {
            id: request.handler_id.clone(),
            advertisement: request.advertisement,
            info,
            uri: uri.clone(),
            registered_at: Utc::now(),
        };
        info!(handler = %handler.id, uri = %uri, "Registered handler");

        if let Some(previous) = self.handlers.insert(request.handler_id, handler) {
            debug!(handler = %previous.id, uri = %previous.uri, "Replaced handler");
        }

        Ok(RegisterHandlerMessage::response(uri))
    }

    /// Places a call from the handler named in `message` on trunk group `tg_id`.
    ///
    /// Only the first negotiated directive is reported. The new call
    /// replaces any call already active on the trunk group.
    pub fn process_calls(&mut self, tg_id: &str, message: CallsMessage) -> ServerResult<CallsMessage> {
        let handler_uri = message.request.handler_uri;

        let tg_index = self
            .trunk_groups
            .iter()
            .position(|tg| tg.id == tg_id)
            .ok_or_else(|| ServerError::unknown_trunk_group(tg_id))?;

        let handler = self
            .handlers
            .values()
            .find(|h| h.uri == handler_uri)
            .ok_or_else(|| ServerError::unknown_handler(handler_uri.as_str()))?;

        let tg = &mut self.trunk_groups[tg_index];
        let directives = match_capabilities(&tg.media_info, &handler.info)?;
        let Some(directive) = directives.into_iter().next() else {
            return Err(ServerError::NoCapabilityMatch);
        };

        let call_id = Uuid::new_v4().to_string();
        let call = Call {
            uri: format!("{TRUNK_GROUPS_URL}/{tg_id}/calls/{call_id}"),
            id: call_id,
            handler_uri,
            directive,
            created_at: Utc::now(),
        };

        let response = CallResponse {
            call_uri: call.uri.clone(),
            client_directive: call.directive.client_directive(),
            server_directive: call.directive.server_directive(),
        };

        info!(
            trunk_group = %tg.id,
            call = %call.uri,
            directive = %response.server_directive.as_str(),
            "Call placed"
        );
        if let Some(previous) = tg.call.replace(call) {
            warn!(
                trunk_group = %tg.id,
                call = %previous.uri,
                "Replacing active call"
            );
        }

        Ok(CallsMessage::response(response))
    }

    pub fn trunk_group(&self, id: &str) -> Option<&TrunkGroup> {
        self.trunk_groups.iter().find(|tg| tg.id == id)
    }

    pub fn handler(&self, id: &str) -> Option<&Handler> {
        self.handlers.get(id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// The call currently active on trunk group `tg_id`.
    pub fn active_call(&self, tg_id: &str) -> Option<&Call> {
        self.trunk_group(tg_id)?.call.as_ref()
    }
}

/// Service shared between the router and operator tooling.
pub type SharedService = Arc<RwLock<RiptService>>;

/// Wraps a service for sharing.
pub fn new_shared_service(service: RiptService) -> SharedService {
    Arc::new(RwLock::new(service))
}
