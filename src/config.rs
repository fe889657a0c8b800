use crate::constants::{network, options, retry};
use crate::errors::SshError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    Password {
        password: String,
    },
    PrivateKey {
        key_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Password { .. } => "password",
            Credential::PrivateKey { .. } => "private_key",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { .. } => f.write_str("Password(***)"),
            Credential::PrivateKey { key_path, passphrase } => f
                .debug_struct("PrivateKey")
                .field("key_path", key_path)
                .field("passphrase", &passphrase.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

fn read_positive_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
}

pub fn resolve_poll_interval_ms() -> u64 {
    read_positive_env("REMOTEFS_POLL_INTERVAL_MS").unwrap_or(network::EXEC_POLL_INTERVAL_MS)
}

pub fn resolve_connect_timeout_ms() -> u64 {
    read_positive_env("REMOTEFS_CONNECT_TIMEOUT_MS").unwrap_or(network::TIMEOUT_CONNECT_MS)
}

pub fn resolve_reconnect_attempts() -> usize {
    read_positive_env("REMOTEFS_RECONNECT_ATTEMPTS")
        .map(|v| v as usize)
        .unwrap_or(retry::MAX_ATTEMPTS)
}

fn default_port() -> u16 {
    network::SSH_DEFAULT_PORT
}

fn default_keep_alive() -> bool {
    true
}

fn default_keep_alive_interval_ms() -> u64 {
    network::KEEPALIVE_INTERVAL_MS
}

fn default_reconnect_backoff_ms() -> u64 {
    retry::BASE_DELAY_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub username: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub credential: Credential,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default = "resolve_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "resolve_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "resolve_reconnect_attempts")]
    pub reconnect_attempts: usize,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
}

impl ClientConfig {
    fn base(username: String, host: String, credential: Credential) -> Self {
        let mut options = BTreeMap::new();
        options.insert(
            options::STRICT_HOST_KEY_CHECKING.to_string(),
            options::DEFAULT_STRICT_HOST_KEY_CHECKING.to_string(),
        );
        Self {
            username,
            host,
            port: default_port(),
            credential,
            options,
            keep_alive: default_keep_alive(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
            source_files: Vec::new(),
            connect_timeout_ms: resolve_connect_timeout_ms(),
            poll_interval_ms: resolve_poll_interval_ms(),
            reconnect_attempts: resolve_reconnect_attempts(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
        }
    }

    pub fn with_password(
        username: impl Into<String>,
        host: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::base(
            username.into(),
            host.into(),
            Credential::Password {
                password: password.into(),
            },
        )
    }

    pub fn with_private_key(
        username: impl Into<String>,
        host: impl Into<String>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self::base(
            username.into(),
            host.into(),
            Credential::PrivateKey {
                key_path: key_path.into(),
                passphrase: None,
            },
        )
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Only meaningful for key credentials; ignored for passwords.
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        if let Credential::PrivateKey {
            passphrase: slot, ..
        } = &mut self.credential
        {
            *slot = Some(passphrase.into());
        }
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn source_file(mut self, path: impl Into<String>) -> Self {
        self.source_files.push(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn reconnect_attempts(mut self, attempts: usize) -> Self {
        self.reconnect_attempts = attempts;
        self
    }

    pub fn reconnect_backoff(mut self, base: Duration) -> Self {
        self.reconnect_backoff_ms = base.as_millis() as u64;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn get_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn strict_host_key_checking(&self) -> bool {
        self.get_option(options::STRICT_HOST_KEY_CHECKING)
            .map(|v| v.trim().eq_ignore_ascii_case("yes"))
            .unwrap_or(false)
    }

    /// `ServerAliveInterval` (milliseconds) wins over the builder value.
    pub fn keep_alive_interval_value(&self) -> Duration {
        let ms = self
            .get_option(options::SERVER_ALIVE_INTERVAL)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(self.keep_alive_interval_ms);
        Duration::from_millis(ms)
    }

    pub fn connect_timeout_value(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn poll_interval_value(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    // `attempt` is 1-based.
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let ms = self
            .reconnect_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(retry::MAX_DELAY_MS);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<(), SshError> {
        if self.host.trim().is_empty() {
            return Err(SshError::invalid_argument("host must not be empty"));
        }
        if self.username.trim().is_empty() {
            return Err(SshError::invalid_argument("username must not be empty"));
        }
        if self.port == 0 {
            return Err(SshError::invalid_argument("port must be between 1 and 65535"));
        }
        if self.reconnect_attempts == 0 {
            return Err(SshError::invalid_argument(
                "reconnect_attempts must be at least 1",
            ));
        }
        match &self.credential {
            Credential::Password { password } if password.trim().is_empty() => {
                Err(SshError::authentication("No credential configured: password is empty")
                    .with_hint("Use ClientConfig::with_password with a non-empty password."))
            }
            Credential::PrivateKey { key_path, .. } if key_path.as_os_str().is_empty() => {
                Err(SshError::authentication(
                    "No credential configured: private key path is empty",
                )
                .with_hint("Use ClientConfig::with_private_key with a key file path."))
            }
            _ => Ok(()),
        }
    }
}
