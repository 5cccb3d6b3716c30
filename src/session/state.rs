//! Session lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::ProtocolError;

/// Which side opens the transport and binds the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connects and sends the binding SEND.
    #[default]
    Active,
    /// Accepts the connection and waits for the peer.
    Passive,
}

/// Lifecycle of a session.
///
/// ```text
/// CONNECTING -> HANDSHAKING -> ACTIVE -> ENDING -> CLOSED
/// ```
///
/// A passive session moves from `Connecting` straight to `Active`, and a
/// close requested before the session bound goes straight to `Ending`. Any
/// state may fall to `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Connecting,
    Handshaking,
    Active,
    Ending,
    Closed,
}

impl SessionState {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Active, Closed, Connecting, Ending, Handshaking};
        matches!(
            (self, next),
            (Connecting, Handshaking | Active | Ending)
                | (Handshaking, Active | Ending)
                | (Active, Ending)
                | (Connecting | Handshaking | Active | Ending, Closed)
        )
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidStateTransition`] when the transition
    /// is not allowed.
    pub fn transition(&mut self, next: Self) -> Result<(), ProtocolError> {
        if !self.can_transition_to(next) {
            return Err(ProtocolError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether outbound message data may be written.
    #[must_use]
    pub fn sends_data(self) -> bool { matches!(self, Self::Active | Self::Ending) }

    /// Whether new outbound messages are accepted.
    #[must_use]
    pub fn accepts_messages(self) -> bool {
        matches!(self, Self::Connecting | Self::Handshaking | Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Handshaking => "HANDSHAKING",
            Self::Active => "ACTIVE",
            Self::Ending => "ENDING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
