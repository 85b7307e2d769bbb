use liane_types::{events::LianeEvent, models::LianeMessage};
use uuid::Uuid;

/// Outbound notification seam. The engine calls these after the owning
/// transaction has committed; delivery is fire-and-forget and must not
/// block.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, event: LianeEvent, by: Uuid);
    fn push_message(&self, liane_id: Uuid, message: &LianeMessage);
}

/// Drops everything. For tools and tests that do not observe delivery.
pub struct NoopDispatch;

impl Dispatch for NoopDispatch {
    fn dispatch(&self, _event: LianeEvent, _by: Uuid) {}
    fn push_message(&self, _liane_id: Uuid, _message: &LianeMessage) {}
}
