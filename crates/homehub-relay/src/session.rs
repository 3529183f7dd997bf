//! # Upstream Session
//!
//! Connection and authentication state of the single cloud link.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Upstream Session States                            │
//! │                                                                         │
//! │  ┌────────────┐  transport   ┌────────────┐  transport  ┌───────────┐  │
//! │  │Disconnected│ ───────────► │ Connecting │ ──────────► │ Connected │  │
//! │  └────────────┘  connecting  └────────────┘  connected  └─────┬─────┘  │
//! │        ▲                                      (send auth)     │        │
//! │        │                                                      │        │
//! │        │                               auth_response{true}    │        │
//! │        │                                                      ▼        │
//! │        │                                            ┌───────────────┐  │
//! │        └────────────── link lost (any state) ────── │ Authenticated │  │
//! │                                                     └───────────────┘  │
//! │                                                                         │
//! │  • auth_response{false} leaves the session in Connected                │
//! │  • Only Authenticated permits device_added / device_status / alert     │
//! │  • The hub heartbeat only needs the link up (Connected or better)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session never touches a socket. The transport reports events, the
//! router applies them here and decides what to send.

use std::fmt;

use tracing::{info, warn};

use crate::protocol::HubToCloud;

// =============================================================================
// Session State
// =============================================================================

/// State of the upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No link.
    #[default]
    Disconnected,
    /// Transport is dialing.
    Connecting,
    /// Link up, `auth` sent, no positive answer yet.
    Connected,
    /// Link up and credentials accepted.
    Authenticated,
}

impl SessionState {
    /// Returns true if a WebSocket link is currently open.
    pub fn is_link_up(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Authenticated)
    }

    /// Returns true if relays to the cloud are allowed.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Authenticated => write!(f, "authenticated"),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credentials presented to the cloud on every connect.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

// =============================================================================
// Upstream Session
// =============================================================================

/// The hub's one cloud session.
#[derive(Debug)]
pub struct UpstreamSession {
    hub_id: String,
    credentials: Credentials,
    state: SessionState,
}

impl UpstreamSession {
    /// Creates a disconnected session.
    pub fn new(hub_id: impl Into<String>, credentials: Credentials) -> Self {
        UpstreamSession {
            hub_id: hub_id.into(),
            credentials,
            state: SessionState::Disconnected,
        }
    }

    /// Returns the hub id.
    pub fn hub_id(&self) -> &str {
        &self.hub_id
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transport started dialing.
    pub fn on_connecting(&mut self) {
        self.state = SessionState::Connecting;
    }

    /// Transport connected. Returns the `auth` message to send right away.
    pub fn on_connected(&mut self) -> HubToCloud {
        info!(hub_id = %self.hub_id, "Upstream connected, authenticating");
        self.state = SessionState::Connected;
        HubToCloud::Auth {
            hub_id: self.hub_id.clone(),
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
        }
    }

    /// Applies an `auth_response`. Returns true if the session just became
    /// authenticated.
    pub fn on_auth_response(&mut self, success: bool) -> bool {
        match (self.state, success) {
            (SessionState::Connected, true) => {
                info!(hub_id = %self.hub_id, "Upstream authenticated");
                self.state = SessionState::Authenticated;
                true
            }
            (SessionState::Authenticated, true) => false,
            (state, true) => {
                warn!(%state, "Ignoring auth_response without an open link");
                false
            }
            (_, false) => {
                warn!(hub_id = %self.hub_id, "Upstream rejected credentials");
                if self.state == SessionState::Authenticated {
                    self.state = SessionState::Connected;
                }
                false
            }
        }
    }

    /// Link lost.
    pub fn on_disconnected(&mut self) {
        if self.state != SessionState::Disconnected {
            info!(previous = %self.state, "Upstream disconnected");
        }
        self.state = SessionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UpstreamSession {
        UpstreamSession::new("hub-1", Credentials::new("owner", "pw"))
    }

    #[test]
    fn test_connect_emits_auth() {
        let mut session = session();
        session.on_connecting();
        assert_eq!(session.state(), SessionState::Connecting);

        let auth = session.on_connected();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(
            auth,
            HubToCloud::Auth {
                hub_id: "hub-1".into(),
                username: "owner".into(),
                password: "pw".into(),
            }
        );
    }

    #[test]
    fn test_auth_success_then_link_loss() {
        let mut session = session();
        session.on_connected();

        assert!(session.on_auth_response(true));
        assert!(session.state().is_authenticated());
        // A repeated success is not a new transition.
        assert!(!session.on_auth_response(true));

        session.on_disconnected();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.state().is_link_up());
    }

    #[test]
    fn test_auth_failure_stays_connected() {
        let mut session = session();
        session.on_connected();

        assert!(!session.on_auth_response(false));
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.state().is_link_up());
        assert!(!session.state().is_authenticated());
    }

    #[test]
    fn test_auth_response_without_link_is_ignored() {
        let mut session = session();
        assert!(!session.on_auth_response(true));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("owner", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
        assert_eq!(SessionState::Authenticated.to_string(), "authenticated");
    }
}
