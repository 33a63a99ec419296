use super::*;
use russh::Preferred;
use russh::keys::{HashAlg, PublicKey};
use std::borrow::Cow;
use std::path::PathBuf;

use crate::config;

/// Security level used for SSH algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SecurityLevel {
    /// Strict modern algorithms (default).
    #[default]
    Secure,
    /// Good security with broader compatibility.
    Balanced,
    /// Maximum compatibility with legacy devices.
    LegacyCompatible,
}

/// How the server host key is verified during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Check against `~/.ssh/known_hosts`.
    #[default]
    DefaultKnownHosts,
    /// Check against a specific known_hosts file.
    KnownHostsFile(PathBuf),
    /// Accept only a key with this SHA-256 fingerprint (`SHA256:...`).
    Fingerprint(String),
    /// Accept any key.
    AcceptAny,
}

impl HostKeyPolicy {
    /// Decides whether `key`, presented by `host:port`, is trusted.
    ///
    /// known_hosts lookup failures, including a changed key, count as untrusted.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        let verdict = match self {
            HostKeyPolicy::AcceptAny => Ok(true),
            HostKeyPolicy::Fingerprint(expected) => {
                Ok(key.fingerprint(HashAlg::Sha256).to_string() == *expected)
            }
            HostKeyPolicy::DefaultKnownHosts => russh::keys::check_known_hosts(host, port, key),
            HostKeyPolicy::KnownHostsFile(path) => {
                russh::keys::check_known_hosts_path(host, port, key, path)
            }
        };

        match verdict {
            Ok(trusted) => {
                if !trusted {
                    warn!("{}:{} Host key is not trusted", host, port);
                }
                trusted
            }
            Err(e) => {
                warn!("{}:{} Host key check failed: {}", host, port, e);
                false
            }
        }
    }
}

/// Connection security options for SSH establishment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionSecurityOptions {
    /// SSH algorithm policy.
    #[serde(default)]
    pub level: SecurityLevel,
    /// Server host key verification method.
    #[serde(default)]
    pub host_key: HostKeyPolicy,
}

impl ConnectionSecurityOptions {
    /// Secure-by-default profile (recommended).
    pub fn secure_default() -> Self {
        Self {
            level: SecurityLevel::Secure,
            host_key: HostKeyPolicy::DefaultKnownHosts,
        }
    }

    /// Balanced profile for mixed environments.
    pub fn balanced() -> Self {
        Self {
            level: SecurityLevel::Balanced,
            host_key: HostKeyPolicy::DefaultKnownHosts,
        }
    }

    /// Legacy compatibility profile for older devices.
    pub fn legacy_compatible() -> Self {
        Self {
            level: SecurityLevel::LegacyCompatible,
            host_key: HostKeyPolicy::AcceptAny,
        }
    }

    pub(super) fn preferred(&self) -> Preferred {
        match self.level {
            SecurityLevel::Secure => Preferred {
                kex: Cow::Borrowed(config::SECURE_KEX_ORDER),
                key: Cow::Borrowed(config::SECURE_KEY_TYPES),
                cipher: Cow::Borrowed(config::SECURE_CIPHERS),
                mac: Cow::Borrowed(config::SECURE_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
            },
            SecurityLevel::Balanced => Preferred {
                kex: Cow::Borrowed(config::BALANCED_KEX_ORDER),
                key: Cow::Borrowed(config::BALANCED_KEY_TYPES),
                cipher: Cow::Borrowed(config::BALANCED_CIPHERS),
                mac: Cow::Borrowed(config::BALANCED_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
            },
            SecurityLevel::LegacyCompatible => Preferred {
                kex: Cow::Borrowed(config::LEGACY_KEX_ORDER),
                key: Cow::Borrowed(config::LEGACY_KEY_TYPES),
                cipher: Cow::Borrowed(config::LEGACY_CIPHERS),
                mac: Cow::Borrowed(config::LEGACY_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
            },
        }
    }
}
