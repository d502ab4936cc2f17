//! Protocol state machine.
//!
//! Sans-I/O: the machine never touches a socket. The session feeds it
//! connection outcomes and receive buffers, and gets back an ordered list of
//! [`Action`]s to perform: events to deliver and frames to send.
//!
//! ```text
//! NotConnected ─► Connecting ─► AwaitingProtocolAck ─► Subscribing ─► Monitoring
//!                     │                 │                   │              │
//!                     └─────────────────┴───────► Closed ◄──┴──────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use mythwire_client::{Action, ConnectionConfig, ConnectionPhase, Event, ProtocolStateMachine};
//!
//! let config = ConnectionConfig::builder("mythbox", "91 BuzzOff")
//!     .announce_name("den")
//!     .build()
//!     .unwrap();
//! let mut machine = ProtocolStateMachine::new(config).unwrap();
//!
//! machine.begin_connect();
//! machine.connect_succeeded();
//! let actions = machine.receive(b"      13ACCEPT[]:[]91");
//!
//! assert_eq!(actions[0], Action::Emit(Event::ProtocolAccepted));
//! assert_eq!(machine.phase(), ConnectionPhase::Subscribing);
//! ```

use std::fmt;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::event::Event;
use crate::protocol::{
    announce_monitor_command, proto_version_command, ReplyScanner, Token, ALLOW_SHUTDOWN,
    BLOCK_SHUTDOWN, DONE,
};
use crate::writer::OutboundFrame;

/// Stage of the connect / handshake / subscribe / monitor sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionPhase {
    /// Nothing attempted yet.
    NotConnected,
    /// TCP connect in progress.
    Connecting,
    /// Handshake sent, waiting for `ACCEPT` or `REJECT`.
    AwaitingProtocolAck,
    /// Monitor announcement sent, waiting for the backend to confirm.
    Subscribing,
    /// Subscribed; backend events are being reported.
    Monitoring,
    /// Socket closed or never opened.
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::NotConnected => "not connected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::AwaitingProtocolAck => "awaiting protocol ack",
            ConnectionPhase::Subscribing => "subscribing",
            ConnectionPhase::Monitoring => "monitoring",
            ConnectionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One step the session must perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Deliver an event to the sink.
    Emit(Event),
    /// Write a frame to the socket.
    Send(OutboundFrame),
}

/// The monitor protocol state machine.
#[derive(Debug)]
pub struct ProtocolStateMachine {
    config: ConnectionConfig,
    phase: ConnectionPhase,
    scanner: ReplyScanner,
    handshake: OutboundFrame,
    subscribe: OutboundFrame,
    block_shutdown: OutboundFrame,
    allow_shutdown: OutboundFrame,
    done: OutboundFrame,
    rejected: Option<String>,
    done_sent: bool,
}

impl ProtocolStateMachine {
    /// Create a machine for `config`.
    ///
    /// Validates the config and pre-encodes the handshake frames, so nothing
    /// can fail once the session is running.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let handshake = OutboundFrame::new(proto_version_command(&config.protocol_version_tag))?;
        let subscribe = OutboundFrame::new(announce_monitor_command(&config.announce_name))?;

        // Carry enough bytes to see `CLIENT_CONNECTED HOSTNAME <name>` when
        // the event is split across receives.
        let tail_len = Token::max_len() + " HOSTNAME ".len() + config.announce_name.len();

        Ok(Self {
            config,
            phase: ConnectionPhase::NotConnected,
            scanner: ReplyScanner::with_tail_len(tail_len),
            handshake,
            subscribe,
            block_shutdown: OutboundFrame::new(BLOCK_SHUTDOWN)?,
            allow_shutdown: OutboundFrame::new(ALLOW_SHUTDOWN)?,
            done: OutboundFrame::new(DONE)?,
            rejected: None,
            done_sent: false,
        })
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Configuration this machine was built with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether the backend rejected the handshake, with its reason.
    pub fn rejection(&self) -> Option<&str> {
        self.rejected.as_deref()
    }

    /// Whether `DONE` has been sent.
    pub fn done_sent(&self) -> bool {
        self.done_sent
    }

    /// A TCP connect is about to start.
    pub fn begin_connect(&mut self) -> Vec<Action> {
        if self.phase != ConnectionPhase::NotConnected {
            return Vec::new();
        }
        self.phase = ConnectionPhase::Connecting;
        vec![Action::Emit(Event::TryingConnect)]
    }

    /// The TCP connect failed or timed out.
    pub fn connect_failed(&mut self) -> Vec<Action> {
        if self.phase != ConnectionPhase::Connecting {
            return Vec::new();
        }
        self.phase = ConnectionPhase::Closed;
        vec![Action::Emit(Event::ConnectionTimeout)]
    }

    /// The TCP connect succeeded: send the protocol handshake.
    pub fn connect_succeeded(&mut self) -> Vec<Action> {
        if self.phase != ConnectionPhase::Connecting {
            return Vec::new();
        }
        self.phase = ConnectionPhase::AwaitingProtocolAck;
        vec![Action::Send(self.handshake.clone())]
    }

    /// Classify one receive buffer.
    ///
    /// Phase checks cascade, so one buffer can advance several phases. The
    /// `REJECT` and `MASTER_SHUTDOWN` overlays run afterwards on every
    /// receive regardless of phase.
    pub fn receive(&mut self, data: &[u8]) -> Vec<Action> {
        if self.phase == ConnectionPhase::Closed || data.is_empty() {
            return Vec::new();
        }

        let reply = self.scanner.scan(data);
        let mut actions = Vec::new();

        if self.phase == ConnectionPhase::AwaitingProtocolAck
            && self.rejected.is_none()
            && reply.contains(Token::Accept)
            && !reply.contains(Token::Reject)
        {
            actions.push(Action::Emit(Event::ProtocolAccepted));
            actions.push(Action::Send(self.subscribe.clone()));
            self.phase = ConnectionPhase::Subscribing;
        }

        if self.phase == ConnectionPhase::Subscribing
            && (reply.contains(Token::Ok)
                || (reply.contains(Token::ClientConnected)
                    && reply.word_after(Token::ClientConnected, &self.config.announce_name)))
        {
            actions.push(Action::Emit(Event::ClientConnected));
            if self.config.block_shutdown {
                actions.push(Action::Send(self.block_shutdown.clone()));
            }
            self.phase = ConnectionPhase::Monitoring;
        }

        if self.phase == ConnectionPhase::Monitoring && reply.contains(Token::ScheduleChange) {
            actions.push(Action::Emit(Event::ScheduleChanged));
        }

        if self.rejected.is_none() {
            if let Some(reason) = reply.field_after(Token::Reject) {
                actions.push(Action::Emit(Event::ProtocolRejected(reason.clone())));
                self.rejected = Some(reason);
            }
        }

        if reply.contains(Token::MasterShutdown) {
            actions.push(Action::Emit(Event::MasterShuttingDown));
        }

        actions
    }

    /// Caller asked to leave: release the shutdown block and say `DONE`.
    ///
    /// Only acts once, and only while monitoring. The backend answers by
    /// closing the socket.
    pub fn disconnect(&mut self) -> Vec<Action> {
        if self.phase != ConnectionPhase::Monitoring || self.done_sent {
            return Vec::new();
        }

        let mut actions = Vec::with_capacity(2);
        if self.config.block_shutdown {
            actions.push(Action::Send(self.allow_shutdown.clone()));
        }
        actions.push(Action::Send(self.done.clone()));
        self.done_sent = true;

        actions
    }

    /// The socket is gone (end-of-stream, I/O error or local abort).
    ///
    /// Emits `SocketClosed` the first time only.
    pub fn close(&mut self) -> Vec<Action> {
        if self.phase == ConnectionPhase::Closed {
            return Vec::new();
        }
        self.phase = ConnectionPhase::Closed;
        self.scanner.reset();
        vec![Action::Emit(Event::SocketClosed)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(block_shutdown: bool) -> ConnectionConfig {
        ConnectionConfig::builder("mythbox", "91 BuzzOff")
            .announce_name("den")
            .block_shutdown(block_shutdown)
            .build()
            .unwrap()
    }

    fn connected(block_shutdown: bool) -> ProtocolStateMachine {
        let mut machine = ProtocolStateMachine::new(config(block_shutdown)).unwrap();
        machine.begin_connect();
        machine.connect_succeeded();
        machine
    }

    fn monitoring(block_shutdown: bool) -> ProtocolStateMachine {
        let mut machine = connected(block_shutdown);
        machine.receive(b"      13ACCEPT[]:[]91");
        machine.receive(b"2       OK");
        assert_eq!(machine.phase(), ConnectionPhase::Monitoring);
        machine
    }

    fn events(actions: &[Action]) -> Vec<Event> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(e) => Some(e.clone()),
                Action::Send(_) => None,
            })
            .collect()
    }

    fn sent(actions: &[Action]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(f) => Some(f.text().into_owned()),
                Action::Emit(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_sends_handshake() {
        let mut machine = ProtocolStateMachine::new(config(false)).unwrap();
        assert_eq!(machine.phase(), ConnectionPhase::NotConnected);

        assert_eq!(events(&machine.begin_connect()), vec![Event::TryingConnect]);
        assert_eq!(machine.phase(), ConnectionPhase::Connecting);

        let actions = machine.connect_succeeded();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::Send(frame) => {
                assert_eq!(frame.to_vec(), b"28      MYTH_PROTO_VERSION 91 BuzzOff".to_vec())
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(machine.phase(), ConnectionPhase::AwaitingProtocolAck);
    }

    #[test]
    fn test_connect_failure_is_terminal() {
        let mut machine = ProtocolStateMachine::new(config(false)).unwrap();
        machine.begin_connect();

        assert_eq!(events(&machine.connect_failed()), vec![Event::ConnectionTimeout]);
        assert_eq!(machine.phase(), ConnectionPhase::Closed);

        assert!(machine.close().is_empty());
        assert!(machine.connect_succeeded().is_empty());
    }

    #[test]
    fn test_accept_then_ok_reaches_monitoring() {
        let mut machine = ProtocolStateMachine::new(config(false)).unwrap();
        let mut all = machine.begin_connect();
        all.extend(machine.connect_succeeded());

        let accept = machine.receive(b"      13ACCEPT[]:[]91");
        assert_eq!(sent(&accept), vec!["ANN Monitor den 1".to_string()]);
        all.extend(accept);

        all.extend(machine.receive(b"2       OK"));

        assert_eq!(
            events(&all),
            vec![
                Event::TryingConnect,
                Event::ProtocolAccepted,
                Event::ClientConnected
            ]
        );
        assert_eq!(machine.phase(), ConnectionPhase::Monitoring);
    }

    #[test]
    fn test_client_connected_needs_our_name() {
        let mut machine = connected(false);
        machine.receive(b"      13ACCEPT[]:[]91");

        assert!(machine.receive(b"      24CLIENT_CONNECTED kitchen").is_empty());
        assert_eq!(machine.phase(), ConnectionPhase::Subscribing);

        let actions = machine.receive(b"      20CLIENT_CONNECTED DEN");
        assert_eq!(events(&actions), vec![Event::ClientConnected]);
        assert_eq!(machine.phase(), ConnectionPhase::Monitoring);
    }

    #[test]
    fn test_other_client_connected_after_our_name_in_carried_bytes() {
        let mut machine = connected(true);
        machine.receive(b"      13ACCEPT[]:[]91");

        assert!(machine.receive(b"SYSTEM_EVENT HOST den").is_empty());
        assert!(machine.receive(b"      24CLIENT_CONNECTED kitchen").is_empty());
        assert_eq!(machine.phase(), ConnectionPhase::Subscribing);

        let actions = machine.receive(b"BACKEND_MESSAGE[]:[]CLIENT_CONNECTED HOSTNAME den[]:[]empty");
        assert_eq!(events(&actions), vec![Event::ClientConnected]);
        assert_eq!(sent(&actions), vec!["BLOCK_SHUTDOWN".to_string()]);
    }

    #[test]
    fn test_reject_fires_once_and_blocks_subscribe() {
        let mut machine = connected(false);

        let actions = machine.receive(b"      13REJECT[]:[]91");
        assert_eq!(
            actions,
            vec![Action::Emit(Event::ProtocolRejected("91".to_string()))]
        );
        assert_eq!(machine.rejection(), Some("91"));
        assert_eq!(machine.phase(), ConnectionPhase::AwaitingProtocolAck);

        // A late ACCEPT or a repeated REJECT changes nothing.
        assert!(machine.receive(b"6       ACCEPT").is_empty());
        assert!(machine.receive(b"6       REJECT").is_empty());

        assert_eq!(events(&machine.close()), vec![Event::SocketClosed]);
    }

    #[test]
    fn test_reject_wins_over_accept_in_same_receive() {
        let mut machine = connected(false);

        let actions = machine.receive(b"6       ACCEPT      13REJECT[]:[]77");
        assert_eq!(
            actions,
            vec![Action::Emit(Event::ProtocolRejected("77".to_string()))]
        );
        assert!(sent(&actions).is_empty());
        assert_eq!(machine.phase(), ConnectionPhase::AwaitingProtocolAck);
    }

    #[test]
    fn test_block_shutdown_sent_once() {
        let mut machine = connected(true);
        let mut frames = sent(&machine.receive(b"      13ACCEPT[]:[]91"));
        frames.extend(sent(&machine.receive(b"2       OK")));
        frames.extend(sent(&machine.receive(b"2       OK")));
        frames.extend(sent(&machine.receive(b"      15SCHEDULE_CHANGE")));

        assert_eq!(
            frames,
            vec!["ANN Monitor den 1".to_string(), "BLOCK_SHUTDOWN".to_string()]
        );
    }

    #[test]
    fn test_schedule_change_only_while_monitoring() {
        let mut machine = connected(false);
        assert!(machine.receive(b"      15SCHEDULE_CHANGE").is_empty());

        let mut machine = monitoring(false);
        assert_eq!(
            events(&machine.receive(b"      15SCHEDULE_CHANGE")),
            vec![Event::ScheduleChanged]
        );
    }

    #[test]
    fn test_schedule_change_and_shutdown_in_one_receive() {
        let mut machine = monitoring(false);
        let actions = machine.receive(b"      15SCHEDULE_CHANGE      15MASTER_SHUTDOWN");

        assert_eq!(
            events(&actions),
            vec![Event::ScheduleChanged, Event::MasterShuttingDown]
        );
        assert_eq!(machine.phase(), ConnectionPhase::Monitoring);
    }

    #[test]
    fn test_master_shutdown_in_any_phase() {
        let mut machine = connected(false);
        assert_eq!(
            events(&machine.receive(b"      15MASTER_SHUTDOWN")),
            vec![Event::MasterShuttingDown]
        );
        assert_eq!(machine.phase(), ConnectionPhase::AwaitingProtocolAck);
    }

    #[test]
    fn test_ok_and_event_in_one_receive_cascade() {
        let mut machine = connected(false);
        machine.receive(b"      13ACCEPT[]:[]91");

        let actions = machine.receive(b"2       OK      15SCHEDULE_CHANGE");
        assert_eq!(
            events(&actions),
            vec![Event::ClientConnected, Event::ScheduleChanged]
        );
    }

    #[test]
    fn test_disconnect_with_block_shutdown() {
        let mut machine = monitoring(true);

        let actions = machine.disconnect();
        assert_eq!(
            sent(&actions),
            vec!["ALLOW_SHUTDOWN".to_string(), "DONE".to_string()]
        );
        assert!(events(&actions).is_empty());
        assert!(machine.done_sent());
        assert_eq!(machine.phase(), ConnectionPhase::Monitoring);

        assert!(machine.disconnect().is_empty());
    }

    #[test]
    fn test_disconnect_without_block_shutdown() {
        let mut machine = monitoring(false);
        assert_eq!(sent(&machine.disconnect()), vec!["DONE".to_string()]);
    }

    #[test]
    fn test_disconnect_before_monitoring_is_noop() {
        let mut machine = connected(true);
        assert!(machine.disconnect().is_empty());
        assert!(!machine.done_sent());
    }

    #[test]
    fn test_close_in_every_phase_fires_once() {
        for steps in 0..4 {
            let mut machine = ProtocolStateMachine::new(config(true)).unwrap();
            if steps >= 1 {
                machine.begin_connect();
            }
            if steps >= 2 {
                machine.connect_succeeded();
            }
            if steps >= 3 {
                machine.receive(b"      13ACCEPT[]:[]91");
                machine.receive(b"2       OK");
            }

            assert_eq!(events(&machine.close()), vec![Event::SocketClosed]);
            assert_eq!(machine.phase(), ConnectionPhase::Closed);
            assert!(machine.close().is_empty());
            assert!(machine.disconnect().is_empty());
            assert!(machine.receive(b"      15SCHEDULE_CHANGE").is_empty());
        }
    }

    #[test]
    fn test_split_accept_across_receives() {
        let mut machine = connected(false);

        assert!(machine.receive(b"      13ACC").is_empty());
        let actions = machine.receive(b"EPT[]:[]91");
        assert_eq!(events(&actions), vec![Event::ProtocolAccepted]);
    }

    #[test]
    fn test_control_frames_on_the_wire() {
        let mut machine = monitoring(true);
        let wire: Vec<Vec<u8>> = machine
            .disconnect()
            .iter()
            .filter_map(|a| match a {
                Action::Send(f) => Some(f.to_vec()),
                Action::Emit(_) => None,
            })
            .collect();

        assert_eq!(
            wire,
            vec![
                b"14      ALLOW_SHUTDOWN".to_vec(),
                b"4       DONE".to_vec()
            ]
        );
    }
}
