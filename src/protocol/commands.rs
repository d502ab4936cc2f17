//! Control command payloads and recognized reply tokens.
//!
//! Outbound commands are plain ASCII payloads, framed with
//! [`encode`](super::encode) before they hit the socket. Inbound traffic is
//! never parsed into commands; the session only looks for the [`Token`]s
//! below inside each receive buffer.

/// Protocol handshake command prefix.
pub const PROTO_VERSION_COMMAND: &str = "MYTH_PROTO_VERSION";

/// Asks the backend not to shut down while this monitor is attached.
pub const BLOCK_SHUTDOWN: &str = "BLOCK_SHUTDOWN";

/// Releases a previous [`BLOCK_SHUTDOWN`].
pub const ALLOW_SHUTDOWN: &str = "ALLOW_SHUTDOWN";

/// Ends the session. The backend closes the socket in response.
pub const DONE: &str = "DONE";

/// Separator the backend puts between fields of a reply (`ACCEPT[]:[]77`).
pub const FIELD_SEPARATOR: &str = "[]:[]";

/// Build the protocol handshake payload.
///
/// ```
/// use mythwire_client::protocol::proto_version_command;
///
/// assert_eq!(proto_version_command("77 WindMark"), "MYTH_PROTO_VERSION 77 WindMark");
/// ```
pub fn proto_version_command(version_tag: &str) -> String {
    format!("{} {}", PROTO_VERSION_COMMAND, version_tag)
}

/// Build the passive-monitor announcement payload.
///
/// The trailing `1` asks the backend to send system events to this
/// connection.
///
/// ```
/// use mythwire_client::protocol::announce_monitor_command;
///
/// assert_eq!(announce_monitor_command("kitchen"), "ANN Monitor kitchen 1");
/// ```
pub fn announce_monitor_command(announce_name: &str) -> String {
    format!("ANN Monitor {} 1", announce_name)
}

/// Reply tokens the session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// Handshake accepted.
    Accept,
    /// Handshake rejected; the backend closes the socket next.
    Reject,
    /// Generic success reply (answer to `ANN`).
    Ok,
    /// Backend event announcing a newly connected client.
    ClientConnected,
    /// Backend event: recording schedule changed.
    ScheduleChange,
    /// Backend event: master backend is shutting down.
    MasterShutdown,
}

impl Token {
    /// Every token, in scan order.
    pub const ALL: [Token; 6] = [
        Token::Accept,
        Token::Reject,
        Token::Ok,
        Token::ClientConnected,
        Token::ScheduleChange,
        Token::MasterShutdown,
    ];

    /// Wire text of the token.
    pub const fn as_str(self) -> &'static str {
        match self {
            Token::Accept => "ACCEPT",
            Token::Reject => "REJECT",
            Token::Ok => "OK",
            Token::ClientConnected => "CLIENT_CONNECTED",
            Token::ScheduleChange => "SCHEDULE_CHANGE",
            Token::MasterShutdown => "MASTER_SHUTDOWN",
        }
    }

    /// Length of the longest token in bytes.
    pub const fn max_len() -> usize {
        let mut max = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            let len = Self::ALL[i].as_str().len();
            if len > max {
                max = len;
            }
            i += 1;
        }
        max
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
