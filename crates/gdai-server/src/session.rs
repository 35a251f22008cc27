//! MCP session lifecycle
//!
//! `Connected` -> `initialize` -> `Initializing` -> `notifications/initialized` -> `Ready`.
//! Every inbound message is classified into a [`MessageKind`] and looked up in
//! [`transition`] together with the current state; the resulting [`Action`]
//! tells the transport what to do with the message.

use gdai_core::error_codes;
use tracing::debug;

use crate::backend::ClientInitialized;
use crate::mcp::{InitializeParams, Message};

/// Where a session is in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Initializing,
    Ready,
}

/// Inbound message variants the state machine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `initialize` request
    Initialize,
    /// `notifications/initialized`
    Initialized,
    /// `ping` request
    Ping,
    /// `notifications/cancelled`
    Cancelled,
    /// Any other request
    Request,
    /// Any other notification
    Notification,
}

impl MessageKind {
    pub fn classify(message: &Message) -> Self {
        match (&message.id, message.method.as_str()) {
            (Some(_), "initialize") => MessageKind::Initialize,
            (Some(_), "ping") => MessageKind::Ping,
            (Some(_), _) => MessageKind::Request,
            (None, "notifications/initialized") => MessageKind::Initialized,
            (None, "notifications/cancelled") => MessageKind::Cancelled,
            (None, _) => MessageKind::Notification,
        }
    }
}

/// What the transport does with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reply with the server's initialize result
    Initialize,
    /// Tell the backend a client is connected
    NotifyBackend,
    /// Reply with an empty result
    Pong,
    /// Hand the request to its handler
    Dispatch,
    /// Abort the in-flight request named in the params
    Cancel,
    /// Reply with a JSON-RPC error
    Reject { code: i32, message: &'static str },
    /// Drop the message
    Ignore,
}

const NOT_INITIALIZED: Action = Action::Reject {
    code: error_codes::INVALID_REQUEST,
    message: "Received request before initialization was complete",
};

const ALREADY_INITIALIZED: Action = Action::Reject {
    code: error_codes::INVALID_REQUEST,
    message: "Session is already initialized",
};

/// Transition table of the session state machine
pub fn transition(state: SessionState, kind: MessageKind) -> (SessionState, Action) {
    use MessageKind as K;
    use SessionState as S;

    match (state, kind) {
        (S::Connected, K::Initialize) => (S::Initializing, Action::Initialize),
        (S::Initializing | S::Ready, K::Initialize) => (state, ALREADY_INITIALIZED),

        (S::Initializing, K::Initialized) => (S::Ready, Action::NotifyBackend),
        (S::Connected | S::Ready, K::Initialized) => (state, Action::Ignore),

        (_, K::Ping) => (state, Action::Pong),

        (S::Ready, K::Request) => (S::Ready, Action::Dispatch),
        (S::Connected | S::Initializing, K::Request) => (state, NOT_INITIALIZED),

        (_, K::Cancelled) => (state, Action::Cancel),
        (_, K::Notification) => (state, Action::Ignore),
    }
}

/// One connected client
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    client: Option<InitializeParams>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Connected,
            client: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Advance the state machine and return what to do with the message
    pub fn apply(&mut self, kind: MessageKind) -> Action {
        let (next, action) = transition(self.state, kind);
        if next != self.state {
            debug!("Session {:?} -> {:?} on {:?}", self.state, next, kind);
        }
        self.state = next;
        action
    }

    /// Remember what the client sent in `initialize`
    pub fn set_client(&mut self, params: InitializeParams) {
        self.client = Some(params);
    }

    /// Body for `POST /client_initialized`, once the client has identified itself
    pub fn client_initialized(&self) -> Option<ClientInitialized> {
        self.client.as_ref().map(|p| ClientInitialized {
            protocol_version: p.protocol_version.clone(),
            client_name: p.client_info.name.clone(),
            client_version: p.client_info.version.clone(),
        })
    }
}
