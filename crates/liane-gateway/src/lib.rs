//! WebSocket gateway: authenticated connections receive liane-scoped
//! events for the lianes they subscribe to.

pub mod connection;
pub mod dispatcher;

pub use dispatcher::Dispatcher;
