//! # devexec - Serialized SSH command channel for network devices
//!
//! `devexec` holds one SSH link to one device and lets any number of tasks run
//! commands over it. Commands are serialized: each runs to completion in its own
//! exec session before the next one starts, and teardown waits for the command in
//! flight.
//!
//! ## Features
//!
//! - **One Guard Per Link**: commands, keepalives and teardown never overlap
//! - **Two Teardown Paths**: graceful [`close`](session::ManagedConnection::close)
//!   with a completion signal, and abrupt [`terminate`](session::ManagedConnection::terminate)
//! - **Keepalive Supervisor**: checks the link and terminates it on failure
//! - **Security Profiles**: algorithm sets from strict to legacy-compatible
//! - **Session Recording**: optional lifecycle log with JSONL export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use devexec::session::ssh::{self, ConnectOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectOptions::with_password("192.168.1.1", "admin", "password");
//!     let (conn, done) = ssh::connect(&options).await?;
//!
//!     let output = conn.run_command("show version").await?;
//!     println!("{output}");
//!
//!     conn.close().await;
//!     assert!(done.wait().await);
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::ManagedConnection`] - The guarded link and its operations
//! - [`session::ssh`] - russh transport and [`connect`](session::ssh::connect)
//! - [`transport`] - Traits a transport must implement
//! - [`error::ConnectError`] - Error types for connection and command execution
//! - [`config`] - Algorithm profiles and defaults

pub mod config;
pub mod error;
pub mod session;
pub mod transport;
