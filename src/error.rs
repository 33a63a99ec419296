//! Error types for the managed command channel.
//!
//! [`ConnectError`] is what callers of a connection see. [`TransportError`] is the
//! fault reported by the transport underneath and is carried as the source of the
//! command-level variants.

use thiserror::Error;

/// Faults reported by a transport client or one of its sessions.
#[derive(Error, Debug)]
pub enum TransportError {
    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    Ssh(#[from] russh::Error),

    /// The remote command finished with a non-zero exit status.
    #[error("remote command exited with status {0}")]
    ExitStatus(u32),

    /// The remote command was killed by a signal.
    #[error("remote command killed by signal {0}")]
    ExitSignal(String),

    /// The channel closed before the remote side reported an exit status.
    #[error("channel closed without exit status")]
    ChannelClosed,

    /// Socket level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport fault.
    #[error("{0}")]
    Message(String),
}

/// Errors returned by connection establishment and by a managed connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The connection has no live transport client.
    ///
    /// Not retryable without reconnecting.
    #[error("running command on {host}:{command}: not connected")]
    NotConnected { host: String, command: String },

    /// The per-command session could not be opened.
    #[error("running command on {host}:{command}: could not open session")]
    SessionCreationFailed {
        host: String,
        command: String,
        #[source]
        source: TransportError,
    },

    /// The remote command failed or the transport faulted while it ran.
    #[error("running command on {host}:{command}: could not run command")]
    CommandExecutionFailed {
        host: String,
        command: String,
        #[source]
        source: TransportError,
    },

    /// The command did not complete within the caller supplied bound.
    #[error("running command on {host}:{command}: timed out")]
    ExecTimeout { host: String, command: String },

    /// The connection has already been torn down.
    #[error("connection to {0} closed")]
    ConnectClosedError(String),

    /// A keepalive failed.
    #[error("keepalive to {host} failed")]
    KeepaliveFailed {
        host: String,
        #[source]
        source: TransportError,
    },

    /// TCP connect or SSH handshake did not finish in time.
    #[error("connecting to {0} timed out")]
    ConnectTimeout(String),

    /// The server rejected the supplied credentials.
    #[error("authentication failed for {user}@{host}")]
    AuthenticationFailed { user: String, host: String },

    /// The private key could not be loaded.
    #[error("invalid private key: {0}")]
    InvalidKey(#[from] russh::keys::Error),

    /// Socket level failure while dialing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Recorder bookkeeping failure.
    #[error("internal error: {0}")]
    InternalServerError(String),
}

impl ConnectError {
    /// Whether the caller may reasonably retry the same call on the same connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectError::SessionCreationFailed { .. } | ConnectError::ExecTimeout { .. }
        )
    }
}
