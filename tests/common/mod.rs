//! Instrumented in-memory transport for exercising `ManagedConnection` without SSH.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devexec::error::TransportError;
use devexec::session::{DoneSignal, ManagedConnection};
use devexec::transport::{RawSocket, TransportClient, TransportSession};
use tokio::sync::Notify;

/// What happened on the fake transport, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    SessionOpened,
    ExecEnter(String),
    ExecExit(String),
    SessionClosed,
    SessionDropped,
    Keepalive,
    ClientClosed,
    SocketShutdown,
}

/// Scripted behaviour plus the shared event log.
#[derive(Default)]
pub struct Script {
    pub stdout: HashMap<String, String>,
    /// Written to `stderr_sink`, the remote side's error stream.
    pub stderr: HashMap<String, String>,
    /// Everything the fake device wrote to its error stream.
    pub stderr_sink: Mutex<Vec<u8>>,
    pub exit_status: HashMap<String, u32>,
    pub fail_session: AtomicBool,
    pub fail_keepalive: AtomicBool,
    pub exec_delay: Option<Duration>,
    /// When set, every exec waits for a permit before finishing.
    pub exec_gate: Option<Arc<Notify>>,
    /// When set, graceful client close waits for a permit.
    pub close_gate: Option<Arc<Notify>>,
    /// Signalled when graceful client close starts.
    pub close_entered: Arc<Notify>,
    /// Signalled when an exec starts.
    pub exec_entered: Arc<Notify>,
    pub steps: Mutex<Vec<Step>>,
    pub active_execs: AtomicUsize,
    pub max_active_execs: AtomicUsize,
}

impl Script {
    pub fn output(mut self, command: &str, stdout: &str) -> Self {
        self.stdout.insert(command.to_string(), stdout.to_string());
        self
    }

    pub fn stderr(mut self, command: &str, stderr: &str) -> Self {
        self.stderr.insert(command.to_string(), stderr.to_string());
        self
    }

    pub fn exit(mut self, command: &str, status: u32) -> Self {
        self.exit_status.insert(command.to_string(), status);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    pub fn gate_exec(mut self, gate: Arc<Notify>) -> Self {
        self.exec_gate = Some(gate);
        self
    }

    pub fn gate_close(mut self, gate: Arc<Notify>) -> Self {
        self.close_gate = Some(gate);
        self
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().expect("steps lock").clone()
    }

    pub fn stderr_emitted(&self) -> String {
        let sink = self.stderr_sink.lock().expect("stderr lock");
        String::from_utf8_lossy(&sink).into_owned()
    }

    pub fn count(&self, step: &Step) -> usize {
        self.steps().iter().filter(|s| *s == step).count()
    }

    fn push(&self, step: Step) {
        self.steps.lock().expect("steps lock").push(step);
    }
}

pub struct FakeClient {
    script: Arc<Script>,
}

pub struct FakeSession {
    script: Arc<Script>,
    closed: bool,
}

pub struct FakeSocket {
    script: Arc<Script>,
}

pub type FakeConnection = ManagedConnection<FakeClient, FakeSocket>;

/// Builds a connection to `host` over `script`.
pub fn connection(host: &str, script: Script) -> (FakeConnection, DoneSignal, Arc<Script>) {
    let script = Arc::new(script);
    let client = FakeClient {
        script: script.clone(),
    };
    let socket = FakeSocket {
        script: script.clone(),
    };
    let (conn, done) = ManagedConnection::new(host, client, socket);
    (conn, done, script)
}

impl TransportClient for FakeClient {
    type Session = FakeSession;

    async fn open_session(&self) -> Result<FakeSession, TransportError> {
        if self.script.fail_session.load(Ordering::SeqCst) {
            return Err(TransportError::Message("channel open refused".to_string()));
        }
        self.script.push(Step::SessionOpened);
        Ok(FakeSession {
            script: self.script.clone(),
            closed: false,
        })
    }

    async fn keepalive(&self) -> Result<(), TransportError> {
        self.script.push(Step::Keepalive);
        if self.script.fail_keepalive.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "peer reset",
            )));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.script.close_entered.notify_one();
        if let Some(gate) = self.script.close_gate.as_ref() {
            gate.notified().await;
        }
        self.script.push(Step::ClientClosed);
        Ok(())
    }
}

impl TransportSession for FakeSession {
    async fn run(&mut self, command: &str, stdout: &mut Vec<u8>) -> Result<(), TransportError> {
        let script = self.script.clone();
        script.push(Step::ExecEnter(command.to_string()));
        let active = script.active_execs.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_active_execs.fetch_max(active, Ordering::SeqCst);
        script.exec_entered.notify_one();

        if let Some(delay) = script.exec_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = script.exec_gate.as_ref() {
            gate.notified().await;
        }

        // Interleave the two streams the way a device does.
        let out = script.stdout.get(command).map(String::as_bytes).unwrap_or_default();
        let err = script.stderr.get(command).map(String::as_bytes).unwrap_or_default();
        let (out_head, out_tail) = out.split_at(out.len() / 2);
        stdout.extend_from_slice(out_head);
        script
            .stderr_sink
            .lock()
            .expect("stderr lock")
            .extend_from_slice(err);
        stdout.extend_from_slice(out_tail);

        script.active_execs.fetch_sub(1, Ordering::SeqCst);
        script.push(Step::ExecExit(command.to_string()));

        match script.exit_status.get(command) {
            Some(&status) if status != 0 => Err(TransportError::ExitStatus(status)),
            _ => Ok(()),
        }
    }

    async fn close(mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.script.push(Step::SessionClosed);
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.closed {
            self.script.push(Step::SessionDropped);
        }
    }
}

impl RawSocket for FakeSocket {
    fn shutdown(&mut self) -> io::Result<()> {
        self.script.push(Step::SocketShutdown);
        Ok(())
    }
}
