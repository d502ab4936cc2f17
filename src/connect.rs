//! Blocking-style connect helper.
//!
//! [`Connector`] starts a [`Session`] and waits until the backend has
//! accepted the monitor subscription, the session closed, the time budget
//! ran out, or the caller cancelled. Progress is reported on every tick so a
//! front end can drive a progress bar.
//!
//! There are no retries. After a failure the session is left as it is: call
//! [`SessionHandle::abort`] and start over with a new [`Session`] if needed.
//!
//! # Example
//!
//! ```ignore
//! use mythwire_client::{ConnectOptions, ConnectionConfig, Connector, Event, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ConnectionConfig::builder("mythbox.local", "91 BuzzOff").build()?;
//! let session = Session::new(config, |event: Event| println!("{}", event))?;
//!
//! let mut connector = Connector::new(session, ConnectOptions::default());
//! connector
//!     .connect(&CancellationToken::new(), |progress| {
//!         println!("{}% left", progress.percent_remaining())
//!     })
//!     .await?;
//! ```

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{MythwireError, Result};
use crate::machine::ConnectionPhase;
use crate::session::{CloseReason, Session, SessionHandle};

/// Default time allowed for the whole connect.
pub const DEFAULT_CONNECT_BUDGET: Duration = Duration::from_secs(120);

/// Default progress tick.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Connect helper tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Give up after this long. `Duration::MAX` waits without a deadline.
    pub budget: Duration,
    /// Check the phase and report progress this often.
    pub poll_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            budget: DEFAULT_CONNECT_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ConnectOptions {
    /// Check that the options can drive a connect.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(MythwireError::Config(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Progress of a pending connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectProgress {
    /// Time since the connect started.
    pub elapsed: Duration,
    /// Total time allowed.
    pub budget: Duration,
}

impl ConnectProgress {
    /// Share of the budget used so far, in `0.0..=1.0`.
    pub fn fraction_elapsed(&self) -> f64 {
        if self.budget.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.budget.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Share of the budget left, in whole percent.
    pub fn percent_remaining(&self) -> u8 {
        ((1.0 - self.fraction_elapsed()) * 100.0).round() as u8
    }
}

/// Starts a session and waits for the monitor subscription.
pub struct Connector {
    session: Option<Session>,
    handle: SessionHandle,
    task: Option<JoinHandle<CloseReason>>,
    options: ConnectOptions,
}

impl Connector {
    /// Wrap a session that has not been started yet.
    pub fn new(session: Session, options: ConnectOptions) -> Self {
        let handle = session.handle();
        Self {
            session: Some(session),
            handle,
            task: None,
            options,
        }
    }

    /// Handle of the wrapped session.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Start the session (once) and wait until it is monitoring.
    ///
    /// Must be called from within a tokio runtime. Calling it again after a
    /// success returns `Ok` immediately while the session is still up.
    ///
    /// Invalid [`ConnectOptions`] fail with [`MythwireError::Config`] before
    /// the session is started.
    pub async fn connect<F>(&mut self, cancel: &CancellationToken, mut on_progress: F) -> Result<()>
    where
        F: FnMut(ConnectProgress),
    {
        self.options.validate()?;

        if let Some(session) = self.session.take() {
            tracing::info!("Connecting to backend at {}", session.config().address());
            let (_, task) = session.spawn();
            self.task = Some(task);
        }

        let budget = self.options.budget;
        let started = Instant::now();
        let deadline = started.checked_add(budget);
        let mut phase = self.handle.watch_phase();

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            match self.handle.phase() {
                ConnectionPhase::Monitoring => {
                    tracing::info!("Connected to backend after {:?}", started.elapsed());
                    return Ok(());
                }
                ConnectionPhase::Closed => {
                    tracing::warn!("Session closed before the backend accepted the monitor");
                    return Err(MythwireError::ConnectFailed);
                }
                _ => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= budget {
                tracing::warn!("Connect gave up after {:?}", budget);
                return Err(MythwireError::ConnectTimeout(budget));
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Connect cancelled");
                    return Err(MythwireError::Cancelled);
                }
                _ = ticker.tick() => {
                    on_progress(ConnectProgress { elapsed, budget });
                }
                changed = phase.changed() => {
                    if changed.is_err() {
                        // Session task is gone; its final phase is still readable.
                        tokio::task::yield_now().await;
                    }
                }
                _ = sleep_until_deadline(deadline) => {}
            }
        }
    }

    /// Session handle and, once started, the session's join handle.
    pub fn into_parts(self) -> (SessionHandle, Option<JoinHandle<CloseReason>>) {
        (self.handle, self.task)
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
