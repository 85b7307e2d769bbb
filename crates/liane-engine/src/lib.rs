//! Carpool matching and membership engine: recurring trip intents, route
//! overlap matching, liane group lifecycle and per-group conversations.
//! Storage is synchronous SQLite; async callers wrap these services in
//! spawn_blocking.

pub mod dispatch;
pub mod error;
pub mod fetcher;
pub mod geo;
pub mod matcher;
pub mod messages;
pub mod request_store;
pub mod routing;
pub mod service;

pub use dispatch::{Dispatch, NoopDispatch};
pub use error::EngineError;
pub use messages::LianeMessageService;
pub use routing::{OsrmRouting, Route, Routing};
pub use service::LianeService;
