pub mod api;
pub mod enrichment;
pub mod error;
pub mod groups;
pub mod hub;
pub mod lifecycle;
pub mod moments;
pub mod presence;
pub mod server;
pub mod sessions;

pub use error::HubError;
pub use hub::SessionHub;
pub use presence::{LocalPresenceStore, RedisPresenceStore};
pub use server::{start, AppState, ServerConfig, ServerHandle};
