//! russh-backed transport and connection establishment.
//!
//! [`connect`] dials TCP, runs the SSH handshake and authentication through russh
//! and hands back a [`ManagedConnection`] over [`SshClient`] and [`SshSocket`].
//! The socket handle is a clone of the file descriptor russh drives, which lets
//! [`ManagedConnection::terminate`] cut the link without going through the SSH layer.

use super::*;
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use russh::{Channel, ChannelMsg, Disconnect};
use std::io;
use std::net::Shutdown;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpStream;

use crate::config;

/// Credentials used to authenticate the SSH user.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    Password {
        password: String,
    },
    PrivateKey {
        path: PathBuf,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Password { .. } => f.write_str("Password(..)"),
            AuthMethod::PrivateKey { path, .. } => {
                f.debug_struct("PrivateKey").field("path", path).finish()
            }
        }
    }
}

/// Everything needed to dial one device.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectOptions {
    /// Device address, hostname or IP.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub auth: AuthMethod,
    #[serde(default)]
    pub security: ConnectionSecurityOptions,
    /// Bound on TCP connect plus handshake and authentication, in seconds.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Idle time after which the transport is dropped, in seconds.
    #[serde(default)]
    pub inactivity_timeout_secs: Option<u64>,
}

fn default_port() -> u16 {
    config::DEFAULT_SSH_PORT
}

impl ConnectOptions {
    /// Password login on the default port with secure defaults.
    pub fn with_password(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: config::DEFAULT_SSH_PORT,
            user: user.into(),
            auth: AuthMethod::Password {
                password: password.into(),
            },
            security: ConnectionSecurityOptions::default(),
            connect_timeout_secs: None,
            inactivity_timeout_secs: None,
        }
    }

    /// `host:port` as used in log lines.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect_timeout(&self) -> Duration {
        self.connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(config::DEFAULT_CONNECT_TIMEOUT)
    }

    fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(config::DEFAULT_INACTIVITY_TIMEOUT)
    }
}

/// russh client handler that applies the configured [`HostKeyPolicy`].
pub struct HostKeyCheck {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(self.policy.verify(&self.host, self.port, server_public_key))
    }
}

/// Authenticated russh client.
pub struct SshClient {
    handle: Handle<HostKeyCheck>,
}

/// One exec channel.
///
/// Dropped without [`close`](TransportSession::close), for example when
/// [`ManagedConnection::run_command_timeout`] gives up, it still asks the device to
/// close the channel from a spawned task.
pub struct SshSession {
    channel: Option<Channel<Msg>>,
}

/// Clone of the TCP socket under an [`SshClient`].
pub struct SshSocket {
    stream: std::net::TcpStream,
}

/// A managed connection over russh.
pub type SshConnection = ManagedConnection<SshClient, SshSocket>;

impl TransportClient for SshClient {
    type Session = SshSession;

    async fn open_session(&self) -> Result<SshSession, TransportError> {
        let channel = self.handle.channel_open_session().await?;
        Ok(SshSession {
            channel: Some(channel),
        })
    }

    async fn keepalive(&self) -> Result<(), TransportError> {
        if self.handle.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        self.handle.send_keepalive(true).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

impl TransportSession for SshSession {
    async fn run(&mut self, command: &str, stdout: &mut Vec<u8>) -> Result<(), TransportError> {
        let channel = self.channel.as_mut().ok_or(TransportError::ChannelClosed)?;
        channel.exec(true, command).await?;

        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExitStatus {
                    exit_status: status,
                } => exit_status = Some(status),
                ChannelMsg::ExitSignal {
                    signal_name,
                    error_message,
                    ..
                } => {
                    return Err(TransportError::ExitSignal(format!(
                        "{signal_name:?} {error_message}"
                    )));
                }
                // stderr is not captured
                _ => {}
            }
        }

        match exit_status {
            Some(0) => Ok(()),
            Some(status) => Err(TransportError::ExitStatus(status)),
            None => Err(TransportError::ChannelClosed),
        }
    }

    async fn close(mut self) -> Result<(), TransportError> {
        if let Some(channel) = self.channel.take() {
            channel.close().await?;
        }
        Ok(())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = channel.close().await {
                        debug!("Failed to close abandoned channel {}: {}", channel.id(), e);
                    }
                });
            }
            Err(_) => debug!("No runtime to close abandoned channel {}", channel.id()),
        }
    }
}

impl RawSocket for SshSocket {
    fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

/// Dials `options.host`, authenticates and returns a live connection.
pub async fn connect(
    options: &ConnectOptions,
) -> Result<(SshConnection, DoneSignal), ConnectError> {
    connect_with_recorder(options, None).await
}

/// [`connect`] with an optional recorder attached to the connection.
pub async fn connect_with_recorder(
    options: &ConnectOptions,
    recorder: Option<SessionRecorder>,
) -> Result<(SshConnection, DoneSignal), ConnectError> {
    let addr = options.addr();
    let (client, socket) = tokio::time::timeout(options.connect_timeout(), dial(options))
        .await
        .map_err(|_| ConnectError::ConnectTimeout(addr.clone()))??;
    debug!("{} SSH connection established", addr);

    Ok(match recorder {
        Some(recorder) => {
            ManagedConnection::with_recorder(options.host.clone(), client, socket, recorder)
        }
        None => ManagedConnection::new(options.host.clone(), client, socket),
    })
}

async fn dial(options: &ConnectOptions) -> Result<(SshClient, SshSocket), ConnectError> {
    let stream = TcpStream::connect((options.host.as_str(), options.port)).await?;
    stream.set_nodelay(true)?;
    debug!("{} TCP connection successful", options.addr());

    let stream = stream.into_std()?;
    let socket = SshSocket {
        stream: stream.try_clone()?,
    };
    let stream = TcpStream::from_std(stream)?;

    let config = Arc::new(client::Config {
        preferred: options.security.preferred(),
        inactivity_timeout: Some(options.inactivity_timeout()),
        ..Default::default()
    });
    let handler = HostKeyCheck {
        host: options.host.clone(),
        port: options.port,
        policy: options.security.host_key.clone(),
    };

    let mut handle = client::connect_stream(config, stream, handler).await?;
    trace!("{} Handshake complete", options.addr());

    let auth = match &options.auth {
        AuthMethod::Password { password } => {
            handle
                .authenticate_password(options.user.as_str(), password.as_str())
                .await?
        }
        AuthMethod::PrivateKey { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_deref())?;
            let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
            handle
                .authenticate_publickey(
                    options.user.as_str(),
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await?
        }
    };

    if !auth.success() {
        return Err(ConnectError::AuthenticationFailed {
            user: options.user.clone(),
            host: options.host.clone(),
        });
    }
    debug!("{} Authenticated as {}", options.addr(), options.user);

    Ok((SshClient { handle }, socket))
}
