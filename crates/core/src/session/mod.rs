//! Authentication and session lifecycle.

/// Session manager and its operations.
pub mod manager;
/// Tagged-union session state and published snapshots.
pub mod state;
/// Durable token persistence.
pub mod store;

pub use manager::SessionManager;
pub use state::{SessionSnapshot, SessionState};
pub use store::{TokenPair, TokenStore};
