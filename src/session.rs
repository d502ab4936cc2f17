//! Session supervisor and runtime loop.
//!
//! The [`Session`] owns the socket and the [`ProtocolStateMachine`] and runs
//! one logical connection from connect to close:
//! 1. Emit `TryingConnect` and open the TCP connection
//! 2. Send the protocol handshake
//! 3. Wait on socket readability and caller commands
//! 4. Feed every receive through the state machine, perform its actions
//! 5. Emit `SocketClosed` once the socket is gone
//!
//! All socket I/O happens on the session's own task. The caller talks to it
//! only through a [`SessionHandle`].
//!
//! # Example
//!
//! ```ignore
//! use mythwire_client::{ConnectionConfig, Event, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::builder("mythbox.local", "91 BuzzOff").build()?;
//!     let session = Session::new(config, |event: Event| println!("{}", event))?;
//!
//!     let (handle, task) = session.spawn();
//!     // ... later
//!     handle.disconnect();
//!     let reason = task.await?;
//!     println!("closed: {}", reason);
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::event::{Event, EventSink};
use crate::machine::{Action, ConnectionPhase, ProtocolStateMachine};
use crate::writer::write_frame_timeout;

/// Bytes requested per receive call.
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The TCP connect did not succeed or timed out.
    ConnectFailure(String),
    /// The backend rejected the handshake and closed the socket.
    ProtocolRejected(String),
    /// A send or receive failed after connecting.
    Transport(String),
    /// The backend closed the socket without a `DONE` exchange.
    UnexpectedClose,
    /// The backend closed the socket after `DONE`.
    Completed,
    /// The caller aborted the session.
    Aborted,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectFailure(detail) => write!(f, "connect failed: {}", detail),
            CloseReason::ProtocolRejected(version) => {
                write!(f, "protocol rejected (backend speaks {:?})", version)
            }
            CloseReason::Transport(detail) => write!(f, "transport error: {}", detail),
            CloseReason::UnexpectedClose => f.write_str("backend closed the connection"),
            CloseReason::Completed => f.write_str("disconnected"),
            CloseReason::Aborted => f.write_str("aborted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Disconnect,
    Abort,
}

/// Whichever of the worker's wake-up sources fired first.
enum Step {
    Command(Command),
    Read(std::io::Result<usize>),
}

/// Cheap, cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<ConnectionPhase>,
}

impl SessionHandle {
    /// Ask the backend to end the session.
    ///
    /// Advisory: the session sends `ALLOW_SHUTDOWN` (when blocking shutdown)
    /// and `DONE`, then waits for the backend to close the socket, which is
    /// reported as [`Event::SocketClosed`]. Does nothing unless the session
    /// is monitoring, and nothing once it has finished.
    pub fn disconnect(&self) {
        if self.commands.send(Command::Disconnect).is_err() {
            tracing::debug!("Disconnect ignored, session already finished");
        }
    }

    /// Close the socket locally without waiting for the backend.
    ///
    /// For watchdogs: still emits a single [`Event::SocketClosed`].
    pub fn abort(&self) {
        if self.commands.send(Command::Abort).is_err() {
            tracing::debug!("Abort ignored, session already finished");
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// Whether the monitor subscription is active.
    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionPhase::Monitoring
    }

    /// Whether the session has ended.
    pub fn is_closed(&self) -> bool {
        self.phase() == ConnectionPhase::Closed
    }

    pub(crate) fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    /// Wait until the session has ended.
    pub async fn wait_for_close(&self) {
        let mut phase = self.phase.clone();
        let _ = phase
            .wait_for(|phase| *phase == ConnectionPhase::Closed)
            .await;
    }
}

/// One logical backend connection.
pub struct Session {
    machine: ProtocolStateMachine,
    sink: Box<dyn EventSink>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    phase_tx: watch::Sender<ConnectionPhase>,
}

impl Session {
    /// Create a session delivering events to `sink`.
    ///
    /// Fails only on an invalid configuration.
    pub fn new<S>(config: ConnectionConfig, sink: S) -> Result<Self>
    where
        S: EventSink + 'static,
    {
        let machine = ProtocolStateMachine::new(config)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (phase_tx, _) = watch::channel(machine.phase());

        Ok(Self {
            machine,
            sink: Box::new(sink),
            commands_tx,
            commands_rx,
            phase_tx,
        })
    }

    /// Handle for observing and commanding this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
            phase: self.phase_tx.subscribe(),
        }
    }

    /// Configuration of this session.
    pub fn config(&self) -> &ConnectionConfig {
        self.machine.config()
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<CloseReason>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run on a dedicated OS thread with its own single-threaded runtime.
    ///
    /// For callers without a tokio runtime, such as a GUI event loop.
    pub fn spawn_thread(
        self,
    ) -> std::io::Result<(SessionHandle, std::thread::JoinHandle<CloseReason>)> {
        let handle = self.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let thread = std::thread::Builder::new()
            .name("mythwire-session".to_string())
            .spawn(move || runtime.block_on(self.run()))?;

        Ok((handle, thread))
    }

    /// Run the session to completion.
    ///
    /// Never fails: every outcome ends in [`ConnectionPhase::Closed`], one
    /// terminal event and the returned reason.
    pub async fn run(mut self) -> CloseReason {
        let host = self.machine.config().host.clone();
        let port = self.machine.config().port;
        let timeout = self.machine.config().socket_timeout();

        let actions = self.machine.begin_connect();
        self.emit_all(actions);

        tracing::info!("Connecting to backend at {}:{}", host, port);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.connect_failed(e.to_string()),
            Err(_) => return self.connect_failed(format!("timed out after {:?}", timeout)),
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY: {}", e);
        }

        let (mut reader, mut writer) = stream.into_split();

        let actions = self.machine.connect_succeeded();
        if let Err(e) = self.apply(actions, &mut writer, timeout).await {
            return self.finish(CloseReason::Transport(e.to_string()), &mut writer).await;
        }

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let step = tokio::select! {
                Some(command) = self.commands_rx.recv() => Step::Command(command),
                read = reader.read(&mut buf) => Step::Read(read),
            };

            let actions = match step {
                Step::Command(Command::Disconnect) => {
                    tracing::info!("Disconnecting from backend");
                    self.machine.disconnect()
                }
                Step::Command(Command::Abort) => {
                    return self.finish(CloseReason::Aborted, &mut writer).await;
                }
                Step::Read(Ok(0)) => {
                    let reason = self.end_of_stream_reason();
                    return self.finish(reason, &mut writer).await;
                }
                Step::Read(Ok(n)) => {
                    if self.machine.config().debug {
                        tracing::info!("Received: {:?}", String::from_utf8_lossy(&buf[..n]));
                    }
                    self.machine.receive(&buf[..n])
                }
                Step::Read(Err(e)) => {
                    return self.finish(CloseReason::Transport(e.to_string()), &mut writer).await;
                }
            };

            if let Err(e) = self.apply(actions, &mut writer, timeout).await {
                return self.finish(CloseReason::Transport(e.to_string()), &mut writer).await;
            }
        }
    }

    /// Perform actions in order, stopping at the first failed send.
    async fn apply<W>(&mut self, actions: Vec<Action>, writer: &mut W, timeout: Duration) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        for action in actions {
            match action {
                Action::Emit(event) => self.emit(event),
                Action::Send(frame) => {
                    if self.machine.config().debug {
                        tracing::info!("Sending: {:?}", frame.text());
                    }
                    write_frame_timeout(writer, &frame, timeout).await?;
                }
            }
        }
        self.publish_phase();
        Ok(())
    }

    fn emit_all(&mut self, actions: Vec<Action>) {
        for action in actions {
            if let Action::Emit(event) = action {
                self.emit(event);
            }
        }
    }

    fn emit(&mut self, event: Event) {
        self.publish_phase();
        tracing::debug!("Event {} (phase: {})", event, self.machine.phase());
        self.sink.on_event(event);
    }

    fn publish_phase(&self) {
        self.phase_tx.send_if_modified(|phase| {
            let current = self.machine.phase();
            if *phase == current {
                return false;
            }
            *phase = current;
            true
        });
    }

    fn connect_failed(mut self, detail: String) -> CloseReason {
        tracing::warn!("Connection to backend failed: {}", detail);
        let actions = self.machine.connect_failed();
        self.emit_all(actions);
        self.publish_phase();
        CloseReason::ConnectFailure(detail)
    }

    fn end_of_stream_reason(&self) -> CloseReason {
        if self.machine.done_sent() {
            CloseReason::Completed
        } else if let Some(version) = self.machine.rejection() {
            CloseReason::ProtocolRejected(version.to_string())
        } else {
            tracing::warn!("Backend closed the connection without DONE");
            CloseReason::UnexpectedClose
        }
    }

    async fn finish<W>(mut self, reason: CloseReason, writer: &mut W) -> CloseReason
    where
        W: AsyncWrite + Unpin,
    {
        if let CloseReason::Transport(detail) = &reason {
            tracing::warn!("Backend connection error: {}", detail);
        }

        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Socket shutdown failed: {}", e);
        }

        let actions = self.machine.close();
        self.emit_all(actions);
        self.publish_phase();

        tracing::info!("Backend session closed: {}", reason);
        reason
    }
}
