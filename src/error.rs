//! Unified error type.

/// Boxed source error carried by [`Error::Shutdown`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by the gateway's lifecycle operations.
///
/// Application-level errors (400, 404, 405, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding the listener, or failing to drain one of
/// the two owned lifecycles before the shutdown deadline. All of them are
/// fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The listening address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A lifecycle reported a failure while shutting down.
    #[error("{component} failed to shut down: {source}")]
    Shutdown {
        component: &'static str,
        #[source]
        source: BoxError,
    },

    /// A lifecycle did not drain before the shared deadline.
    #[error("{component} did not shut down before the deadline")]
    ShutdownTimeout { component: &'static str },
}
