use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::LianeMessage;

/// Domain events emitted by the engine after a membership transition
/// commits. Consumed by the notification layer; delivery is fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LianeEvent {
    MemberAccepted {
        liane: Uuid,
        liane_request: Uuid,
        user: Uuid,
    },
    MemberRejected {
        liane: Uuid,
        liane_request: Uuid,
        user: Uuid,
    },
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, pseudo: String },

    /// A new message was posted in a liane conversation
    MessageCreate {
        liane_id: Uuid,
        message: LianeMessage,
    },

    /// A pending member was accepted into a liane
    MemberAccepted {
        liane_id: Uuid,
        liane_request: Uuid,
        user_id: Uuid,
    },

    /// A pending member's join request was rejected
    MemberRejected {
        liane_id: Uuid,
        liane_request: Uuid,
        user_id: Uuid,
    },
}

impl GatewayEvent {
    /// Returns the liane_id if this event is scoped to a specific liane.
    /// Events that return `None` are global and should be delivered to all clients.
    pub fn liane_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { liane_id, .. } => Some(*liane_id),
            Self::MemberAccepted { liane_id, .. } => Some(*liane_id),
            Self::MemberRejected { liane_id, .. } => Some(*liane_id),
            Self::Ready { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to events for specific lianes.
    /// The server only forwards liane-scoped events for subscribed lianes.
    Subscribe { liane_ids: Vec<Uuid> },
}
