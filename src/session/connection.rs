use super::*;

impl<C, S> ManagedConnection<C, S>
where
    C: TransportClient,
    S: RawSocket,
{
    /// Wraps an already authenticated client and the socket backing it.
    ///
    /// Returns the connection together with the only [`DoneSignal`] for it.
    pub fn new(host: impl Into<String>, client: C, socket: S) -> (Self, DoneSignal) {
        Self::build(host.into(), client, socket, None)
    }

    /// Same as [`new`](Self::new) with a recorder attached.
    pub fn with_recorder(
        host: impl Into<String>,
        client: C,
        socket: S,
        recorder: SessionRecorder,
    ) -> (Self, DoneSignal) {
        Self::build(host.into(), client, socket, Some(recorder))
    }

    fn build(
        host: String,
        client: C,
        socket: S,
        recorder: Option<SessionRecorder>,
    ) -> (Self, DoneSignal) {
        let (done_tx, done_rx) = oneshot::channel();
        if let Some(recorder) = recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::ConnectionEstablished {
                host: host.clone(),
            });
        }
        let connection = Self {
            host,
            state: Mutex::new(LinkState {
                link: Some(Link { client, socket }),
                done: Some(done_tx),
            }),
            connected: AtomicBool::new(true),
            recorder,
        };
        (connection, DoneSignal { rx: done_rx })
    }

    /// Host this connection was established to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Recorder bound to this connection, if any.
    pub fn recorder(&self) -> Option<&SessionRecorder> {
        self.recorder.as_ref()
    }

    /// Whether the link is still held.
    ///
    /// Read without taking the guard, so the answer may already be stale when the
    /// caller looks at it. Use it for reporting, not to decide whether a command
    /// is safe to send; [`run_command`](Self::run_command) re-checks under the guard.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Runs `command` on the remote host and returns its standard output.
    ///
    /// The guard is held for the whole round trip, so commands, keepalives and
    /// teardown on one connection never overlap. Each call opens one session and
    /// closes it again before returning, whatever the outcome.
    pub async fn run_command(&self, command: &str) -> Result<String, ConnectError> {
        debug!("Running command on {}: {}", self.host, command);
        let state = self.state.lock().await;

        let Some(Link { client, .. }) = state.link.as_ref() else {
            return Err(ConnectError::NotConnected {
                host: self.host.clone(),
                command: command.to_string(),
            });
        };

        let mut session = match client.open_session().await {
            Ok(session) => session,
            Err(source) => {
                self.record_failure(command, &source);
                return Err(ConnectError::SessionCreationFailed {
                    host: self.host.clone(),
                    command: command.to_string(),
                    source,
                });
            }
        };

        let mut stdout = Vec::new();
        let result = session.run(command, &mut stdout).await;
        if let Err(e) = session.close().await {
            debug!("{} Failed to close session: {}", self.host, e);
        }
        drop(state);

        match result {
            Ok(()) => {
                let output = String::from_utf8_lossy(&stdout).into_owned();
                trace!("Output for {}:{}: {:?}", self.host, command, output);
                if let Some(recorder) = self.recorder.as_ref() {
                    let _ = recorder.record_output(command, &output);
                }
                Ok(output)
            }
            Err(source) => {
                self.record_failure(command, &source);
                Err(ConnectError::CommandExecutionFailed {
                    host: self.host.clone(),
                    command: command.to_string(),
                    source,
                })
            }
        }
    }

    /// [`run_command`](Self::run_command) bounded by `timeout`.
    ///
    /// On expiry the in-flight session is dropped and the guard released. Closing
    /// the remote side of that session is up to the transport's `Drop`; the russh
    /// session sends the close from a spawned task, so the device may see it late.
    pub async fn run_command_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ConnectError> {
        match tokio::time::timeout(timeout, self.run_command(command)).await {
            Ok(result) => result,
            Err(_) => {
                if let Some(recorder) = self.recorder.as_ref() {
                    let _ = recorder.record_event(SessionEvent::CommandFailed {
                        command: command.to_string(),
                        reason: "timeout".to_string(),
                    });
                }
                Err(ConnectError::ExecTimeout {
                    host: self.host.clone(),
                    command: command.to_string(),
                })
            }
        }
    }

    /// Sends a keepalive over the link under the guard.
    ///
    /// Fails with [`ConnectError::ConnectClosedError`] once the link is gone.
    pub async fn keepalive(&self) -> Result<(), ConnectError> {
        let state = self.state.lock().await;
        let Some(Link { client, .. }) = state.link.as_ref() else {
            return Err(ConnectError::ConnectClosedError(self.host.clone()));
        };

        client.keepalive().await.map_err(|source| {
            if let Some(recorder) = self.recorder.as_ref() {
                let _ = recorder.record_event(SessionEvent::KeepaliveFailed {
                    reason: source.to_string(),
                });
            }
            ConnectError::KeepaliveFailed {
                host: self.host.clone(),
                source,
            }
        })
    }

    /// Abruptly drops the link.
    ///
    /// Shuts the socket down without a graceful client close and does not fire
    /// the [`DoneSignal`]. Socket errors are discarded.
    pub async fn terminate(&self) -> Teardown {
        let mut state = self.state.lock().await;

        let Some(mut link) = state.link.take() else {
            debug!("{} Terminate called on a disconnected link", self.host);
            return Teardown::AlreadyDisconnected;
        };
        self.connected.store(false, Ordering::Release);

        if let Err(e) = link.socket.shutdown() {
            debug!("{} Failed to shut down socket: {}", self.host, e);
        }
        drop(link);

        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::ConnectionTerminated);
        }
        debug!("{} Connection terminated", self.host);
        Teardown::Disconnected
    }

    /// Gracefully closes the link and fires the [`DoneSignal`].
    ///
    /// Client close errors are discarded. The signal is sent without waiting for a
    /// receiver, so an unobserved signal never holds the guard. It fires at most
    /// once, on the first `close`, even if the link was already terminated.
    pub async fn close(&self) -> Teardown {
        let mut state = self.state.lock().await;

        let outcome = match state.link.as_mut() {
            Some(Link { client, .. }) => {
                if let Err(e) = client.close().await {
                    debug!("{} Error closing client: {}", self.host, e);
                }
                Teardown::Disconnected
            }
            None => Teardown::AlreadyDisconnected,
        };

        if let Some(done) = state.done.take()
            && done.send(()).is_err()
        {
            debug!("{} Nobody is waiting for the done signal", self.host);
        }

        state.link = None;
        self.connected.store(false, Ordering::Release);

        if outcome == Teardown::Disconnected {
            if let Some(recorder) = self.recorder.as_ref() {
                let _ = recorder.record_event(SessionEvent::ConnectionClosed);
            }
            debug!("{} Connection closed", self.host);
        }
        outcome
    }

    fn record_failure(&self, command: &str, source: &TransportError) {
        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::CommandFailed {
                command: command.to_string(),
                reason: source.to_string(),
            });
        }
    }
}
