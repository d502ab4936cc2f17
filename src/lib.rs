//! # mythwire-client
//!
//! Event monitor client for the MythTV backend control protocol.
//!
//! This crate connects to a PVR backend, negotiates the protocol version,
//! subscribes as a passive monitor and turns what the backend sends into a
//! stream of [`Event`]s.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): length-prefixed wire format, command texts,
//!   token scanning of receive buffers
//! - **State machine** ([`ProtocolStateMachine`]): sans-I/O, turns receives
//!   and caller commands into ordered events and outbound frames
//! - **Session** ([`Session`]): owns the socket, runs the machine on a worker
//!   task or thread, takes commands through a [`SessionHandle`]
//! - **Connector** ([`Connector`]): waits for the subscription with a time
//!   budget, progress reports and cancellation
//!
//! ## Example
//!
//! ```ignore
//! use mythwire_client::{ConnectOptions, ConnectionConfig, Connector, Event, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::builder("mythbox.local", "91 BuzzOff")
//!         .block_shutdown(true)
//!         .build()?;
//!
//!     let session = Session::new(config, |event: Event| match event {
//!         Event::ScheduleChanged => println!("schedule changed"),
//!         other => println!("{}", other),
//!     })?;
//!
//!     let mut connector = Connector::new(session, ConnectOptions::default());
//!     connector.connect(&CancellationToken::new(), |_| {}).await?;
//!
//!     let (handle, _task) = connector.into_parts();
//!     tokio::signal::ctrl_c().await?;
//!     handle.disconnect();
//!     handle.wait_for_close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connect;
pub mod error;
pub mod event;
pub mod machine;
pub mod protocol;
pub mod session;
pub mod writer;

pub use config::{ConfigBuilder, ConnectionConfig};
pub use connect::{ConnectOptions, ConnectProgress, Connector};
pub use error::{MythwireError, Result};
pub use event::{Event, EventSink};
pub use machine::{Action, ConnectionPhase, ProtocolStateMachine};
pub use session::{CloseReason, Session, SessionHandle};
