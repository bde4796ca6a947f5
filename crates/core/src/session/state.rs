#![allow(missing_docs)]

use crate::models::User;

/// Where the session currently stands.
///
/// Authentication is carried by the variant itself: a user record
/// exists if and only if the state is `Authenticated`, so the
/// authenticated-without-a-user combination cannot be constructed.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Startup resume from persisted tokens is still in flight.
    Resuming,
    /// No valid session.
    Anonymous,
    /// Signed in as the contained user.
    Authenticated { user: User },
}

/// Immutable view of the session published to readers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// True while resume, login, or refresh is in flight.
    pub is_loading: bool,
    /// Last auth failure message, cleared by the next successful operation.
    pub error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            SessionState::Authenticated { user } => Some(user),
            _ => None,
        }
    }
}
