//! Application events and the observer they are delivered to.
//!
//! # Example
//!
//! ```
//! use mythwire_client::{Event, EventSink};
//!
//! let mut seen = Vec::new();
//! let mut sink = |event: Event| seen.push(event);
//! sink.on_event(Event::ScheduleChanged);
//! drop(sink);
//!
//! assert_eq!(seen, vec![Event::ScheduleChanged]);
//! ```

use std::fmt;

/// Connection and backend notifications.
///
/// Events are notifications, not requests: the session never waits for the
/// sink to act on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A TCP connect attempt started.
    TryingConnect,
    /// The TCP connect failed or timed out. Terminal.
    ConnectionTimeout,
    /// The backend accepted the protocol handshake.
    ProtocolAccepted,
    /// The backend rejected the handshake; carries the backend's own
    /// protocol version when it sent one.
    ProtocolRejected(String),
    /// The monitor subscription is active.
    ClientConnected,
    /// The recording schedule changed on the backend.
    ScheduleChanged,
    /// The master backend is shutting down.
    MasterShuttingDown,
    /// The socket is closed. Terminal.
    SocketClosed,
}

impl Event {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::ConnectionTimeout | Event::SocketClosed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::TryingConnect => f.write_str("TRY_CONNECT"),
            Event::ConnectionTimeout => f.write_str("CONNECTION_TIMEOUT"),
            Event::ProtocolAccepted => f.write_str("PROTO_ACCEPT"),
            Event::ProtocolRejected(reason) if reason.is_empty() => f.write_str("PROTO_REJECT"),
            Event::ProtocolRejected(reason) => write!(f, "PROTO_REJECT ({})", reason),
            Event::ClientConnected => f.write_str("CLIENT_CONNECTED"),
            Event::ScheduleChanged => f.write_str("SCHEDULE_CHANGE"),
            Event::MasterShuttingDown => f.write_str("MASTER_SHUTDOWN"),
            Event::SocketClosed => f.write_str("SOCK_CLOSE"),
        }
    }
}

/// Observer notified of every [`Event`], in order.
///
/// Called synchronously from the session's worker, so implementations must
/// return quickly and must not block. State shared with another thread is
/// the implementor's to synchronize.
///
/// Any `FnMut(Event) + Send` closure is a sink, which makes forwarding into a
/// channel a one-liner:
///
/// ```
/// use mythwire_client::{Event, EventSink};
///
/// let (tx, rx) = std::sync::mpsc::channel();
/// let mut sink = move |event: Event| {
///     let _ = tx.send(event);
/// };
/// sink.on_event(Event::ClientConnected);
///
/// assert_eq!(rx.recv().unwrap(), Event::ClientConnected);
/// ```
pub trait EventSink: Send {
    /// Handle one event.
    fn on_event(&mut self, event: Event);
}

impl<F> EventSink for F
where
    F: FnMut(Event) + Send,
{
    fn on_event(&mut self, event: Event) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(Event::SocketClosed.is_terminal());
        assert!(Event::ConnectionTimeout.is_terminal());
        assert!(!Event::MasterShuttingDown.is_terminal());
        assert!(!Event::ProtocolRejected(String::new()).is_terminal());
    }

    #[test]
    fn test_display_matches_backend_vocabulary() {
        assert_eq!(Event::ScheduleChanged.to_string(), "SCHEDULE_CHANGE");
        assert_eq!(Event::ProtocolRejected(String::new()).to_string(), "PROTO_REJECT");
        assert_eq!(
            Event::ProtocolRejected("91".to_string()).to_string(),
            "PROTO_REJECT (91)"
        );
    }

    #[test]
    fn test_closure_sink_preserves_order() {
        let mut seen = Vec::new();
        {
            let mut sink = |event: Event| seen.push(event);
            sink.on_event(Event::TryingConnect);
            sink.on_event(Event::ProtocolAccepted);
            sink.on_event(Event::ClientConnected);
        }
        assert_eq!(
            seen,
            vec![
                Event::TryingConnect,
                Event::ProtocolAccepted,
                Event::ClientConnected
            ]
        );
    }
}
