//! Events reported by a running session.

use crate::error::ClientError;
use std::fmt;
use tokio::sync::mpsc;

/// Something the session observed. Every failure path produces one of these
/// before the session moves on.
#[derive(Debug)]
pub enum SessionEvent {
    /// TCP connection established; the handshake has been sent.
    Connected { attempt: u32 },
    /// Dial failed; another attempt follows after the reconnect delay.
    ConnectFailed { attempt: u32, error: ClientError },
    /// The server accepted the handshake.
    LoggedIn,
    QueryAccepted { query_id: u16 },
    QueryResult { query_id: u16, content: String },
    /// A non-fatal fault; the connection stays open.
    Error(ClientError),
    /// The connection was lost; a reconnect follows after the reconnect delay.
    Disconnected { error: ClientError },
    /// The session stopped after a fatal fault. Always the last event.
    Terminated(ClientError),
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionEvent::Terminated(_))
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Connected { attempt } => write!(f, "connected (attempt {attempt})"),
            SessionEvent::ConnectFailed { attempt, error } => {
                write!(f, "connect attempt {attempt} failed: {error}")
            }
            SessionEvent::LoggedIn => write!(f, "logged in"),
            SessionEvent::QueryAccepted { query_id } => write!(f, "query {query_id} accepted"),
            SessionEvent::QueryResult { query_id, content } => {
                write!(f, "query {query_id} result: {content}")
            }
            SessionEvent::Error(error) => write!(f, "{error}"),
            SessionEvent::Disconnected { error } => write!(f, "disconnected: {error}"),
            SessionEvent::Terminated(error) => write!(f, "session terminated: {error}"),
        }
    }
}

/// Publishes an event, waiting for channel capacity if necessary.
pub(crate) async fn report(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(mpsc::error::SendError(event)) = events.send(event).await {
        tracing::debug!("event receiver dropped, discarding: {}", event);
    }
}
