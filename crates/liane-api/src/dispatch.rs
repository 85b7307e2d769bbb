use uuid::Uuid;

use liane_engine::Dispatch;
use liane_gateway::Dispatcher;
use liane_types::events::{GatewayEvent, LianeEvent};
use liane_types::models::LianeMessage;

/// Bridges engine notifications onto the WebSocket gateway. The engine
/// calls this after commit; the broadcast itself never blocks.
#[derive(Clone)]
pub struct GatewayDispatch {
    dispatcher: Dispatcher,
}

impl GatewayDispatch {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

impl Dispatch for GatewayDispatch {
    fn dispatch(&self, event: LianeEvent, _by: Uuid) {
        let event = match event {
            LianeEvent::MemberAccepted { liane, liane_request, user } => {
                GatewayEvent::MemberAccepted { liane_id: liane, liane_request, user_id: user }
            }
            LianeEvent::MemberRejected { liane, liane_request, user } => {
                GatewayEvent::MemberRejected { liane_id: liane, liane_request, user_id: user }
            }
        };
        self.dispatcher.broadcast(event);
    }

    fn push_message(&self, liane_id: Uuid, message: &LianeMessage) {
        self.dispatcher.broadcast(GatewayEvent::MessageCreate {
            liane_id,
            message: message.clone(),
        });
    }
}
