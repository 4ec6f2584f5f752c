//! Shutdown orchestration for the gateway's two long-running components.
//!
//! The gateway owns two independently running lifecycles: the HTTP request
//! server and the SSE transport. Each is represented by a [`Lifecycle`]
//! handle that can be asked, exactly once, to drain before a deadline.
//!
//! The [`Orchestrator`] holds both handles, waits for a shutdown signal and
//! then drains them in a fixed order under one shared deadline:
//!
//! ```text
//! Starting ──bind──▶ Running ──signal──▶ ShuttingDown ──both drained──▶ Stopped
//!                                              │
//!                                              └── error / deadline ──▶ Err(Error)
//! ```
//!
//! 1. The transport goes first. Its connections are long-lived and only end
//!    when the transport closes them, and the request server cannot finish
//!    draining while one of those responses is still open.
//! 2. The request server goes second, finishing whatever requests remain.
//!
//! Any failure is returned to the caller as an [`Error`]; there is no
//! partially-stopped state to recover from.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info};

use crate::error::Error;

/// Default budget for the whole shutdown sequence.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running component that can be drained once.
///
/// `shutdown` consumes the handle: whoever owns it is the only party that can
/// stop the component.
pub trait Lifecycle: Send {
    /// Short name used in logs and errors, e.g. `"http server"`.
    fn name(&self) -> &'static str;

    /// Stops accepting new work and waits for in-flight work to finish.
    ///
    /// Implementations should give up at `deadline`; the orchestrator
    /// enforces it regardless.
    fn shutdown(self, deadline: Instant) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Orchestrator state. See the module docs for the transitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting     => "starting",
            Self::Running      => "running",
            Self::ShuttingDown => "shutting down",
            Self::Stopped      => "stopped",
        })
    }
}

/// Owns the transport (`T`) and request server (`S`) lifecycles.
pub struct Orchestrator<T, S> {
    transport: T,
    server: S,
    timeout: Duration,
    state: watch::Sender<State>,
}

impl<T: Lifecycle, S: Lifecycle> Orchestrator<T, S> {
    /// Takes ownership of two already-running components.
    pub fn new(transport: T, server: S) -> Self {
        info!(
            state = %State::Running,
            transport = transport.name(),
            server = server.name(),
            "gateway running",
        );
        let (state, _) = watch::channel(State::Running);
        Self { transport, server, timeout: SHUTDOWN_TIMEOUT, state }
    }

    /// Overrides [`SHUTDOWN_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Follows the orchestrator's state from here on, including after it has
    /// been consumed by [`run_until`](Self::run_until). The state stays at
    /// `ShuttingDown` when shutdown fails.
    pub fn state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Waits for `signal`, then shuts everything down.
    pub async fn run_until(self, signal: impl Future<Output = ()>) -> Result<(), Error> {
        signal.await;
        self.shutdown().await
    }

    /// Drains the transport, then the request server, under one deadline
    /// fixed when this is called. The server is not touched if the transport
    /// fails.
    pub async fn shutdown(self) -> Result<(), Error> {
        let deadline = Instant::now() + self.timeout;
        self.state.send_replace(State::ShuttingDown);
        info!(
            state = %State::ShuttingDown,
            timeout_ms = self.timeout.as_millis() as u64,
            "shutdown signal received",
        );

        let Self { transport, server, state, .. } = self;
        drain(transport, deadline).await?;
        drain(server, deadline).await?;

        state.send_replace(State::Stopped);
        info!(state = %State::Stopped, "gateway stopped");
        Ok(())
    }
}

async fn drain<L: Lifecycle>(lifecycle: L, deadline: Instant) -> Result<(), Error> {
    let component = lifecycle.name();
    info!(component, "draining");

    match timeout_at(deadline, lifecycle.shutdown(deadline)).await {
        Ok(Ok(())) => {
            info!(component, "drained");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(component, "shutdown failed: {e}");
            Err(e)
        }
        Err(_) => {
            error!(component, "shutdown deadline exceeded");
            Err(Error::ShutdownTimeout { component })
        }
    }
}
