//! Transport capability consumed by [`ManagedConnection`](crate::session::ManagedConnection).
//!
//! The secure channel itself (handshake, key exchange, authentication) lives in a
//! transport library. These traits describe the three handles the connection owns
//! and nothing more: an authenticated client that can open per-command sessions,
//! the sessions themselves, and the raw socket under the client.
//!
//! The russh-backed implementations are in [`crate::session::ssh`].

use std::future::Future;
use std::io;

use crate::error::TransportError;

/// An authenticated transport client for one remote host.
pub trait TransportClient: Send + Sync + 'static {
    /// Ephemeral execution context opened for a single command.
    type Session: TransportSession;

    /// Opens a fresh session on the client.
    fn open_session(&self) -> impl Future<Output = Result<Self::Session, TransportError>> + Send;

    /// Cheap liveness check that does not run anything on the device.
    fn keepalive(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Graceful shutdown of the client.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A per-command session.
///
/// Dropping a session without calling [`close`](TransportSession::close) must still
/// release it on the transport.
pub trait TransportSession: Send {
    /// Runs `command` to completion, appending its standard output to `stdout`.
    ///
    /// Standard error is discarded. A non-zero exit status is an error.
    fn run(
        &mut self,
        command: &str,
        stdout: &mut Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Releases the session.
    fn close(self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The network socket backing a [`TransportClient`].
pub trait RawSocket: Send + 'static {
    /// Abruptly shuts the socket down in both directions.
    fn shutdown(&mut self) -> io::Result<()>;
}
