//! Managed SSH command channel.
//!
//! A [`ManagedConnection`] owns the transport client and socket for one remote
//! host and serializes every command, keepalive and teardown behind a single guard.
//! Commands run one at a time, each in its own short-lived session.
//!
//! # Main Components
//!
//! - [`ManagedConnection`] - The guarded link to one host
//! - [`DoneSignal`] - Completion notification for graceful close
//! - [`ssh::connect`] - Dials a host with russh and returns a live connection
//! - [`spawn_keepalive`] - Supervisor that keeps the link alive and tears it down on failure
//! - [`SessionRecorder`] - Optional lifecycle recording with JSONL export

use log::{debug, trace, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

use crate::error::{ConnectError, TransportError};
use crate::transport::{RawSocket, TransportClient, TransportSession};

pub use keepalive::{KeepaliveExit, spawn_keepalive};
pub use recording::{SessionEvent, SessionRecordEntry, SessionRecordLevel, SessionRecorder};
pub use security::{ConnectionSecurityOptions, HostKeyPolicy, SecurityLevel};

/// A single logical link to a remote host.
///
/// `C` is the authenticated transport client and `S` the socket under it. Both are
/// owned exclusively by the connection and are present or absent together.
pub struct ManagedConnection<C, S> {
    host: String,
    state: Mutex<LinkState<C, S>>,

    /// Lock-free mirror of `state.link.is_some()`, only written under the guard.
    connected: AtomicBool,

    /// Optional lifecycle recorder bound to this connection.
    recorder: Option<SessionRecorder>,
}

struct LinkState<C, S> {
    link: Option<Link<C, S>>,
    done: Option<oneshot::Sender<()>>,
}

struct Link<C, S> {
    client: C,
    socket: S,
}

/// Outcome of [`ManagedConnection::close`] and [`ManagedConnection::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Teardown {
    /// A live link was torn down by this call.
    Disconnected,
    /// There was nothing to tear down.
    AlreadyDisconnected,
}

/// Receiving half of the graceful close notification.
///
/// Exactly one `DoneSignal` exists per connection. It is handed out at construction.
#[derive(Debug)]
pub struct DoneSignal {
    rx: oneshot::Receiver<()>,
}

impl DoneSignal {
    /// Waits for the connection to be closed.
    ///
    /// Resolves `true` once [`ManagedConnection::close`] has run, `false` if the
    /// connection was dropped without a graceful close.
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }
}

mod connection;
mod keepalive;
mod recording;
mod security;
pub mod ssh;
