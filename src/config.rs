//! Connection and execution options.
//!
//! [`Options`] gathers everything a [`Connector`](crate::connection::Connector) needs to
//! reach a server and everything the session and operation layers need to drive a
//! query: authentication, paging, polling cadence and framing limits.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use hiveline::config::{Auth, Options};
//!
//! let options = Options::default()
//!     .with_host("impalad.internal")
//!     .with_auth(Auth::plain("analyst", "secret"))
//!     .with_batch_size(2048)
//!     .with_poll_interval(Duration::from_millis(250));
//!
//! assert_eq!(options.port, 21050);
//! assert!(options.auth.is_sasl());
//! ```
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use crate::protocol::MECHANISM_PLAIN;

/// Default upper bound for a single frame or handshake payload (100 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Session configuration key for the per-query memory limit.
pub const CONFIG_MEM_LIMIT: &str = "MEM_LIMIT";
/// Session configuration key for the query timeout, in seconds.
pub const CONFIG_QUERY_TIMEOUT: &str = "QUERY_TIMEOUT_S";

/// How the client authenticates with the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    /// Unauthenticated, unframed buffered transport.
    #[default]
    None,
    /// SASL `PLAIN` (e.g. LDAP backed) over the framed transport.
    Plain { username: String, password: String },
}

impl Auth {
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Plain {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_sasl(&self) -> bool {
        !matches!(self, Auth::None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub auth: Auth,
    /// SASL mechanisms offered during the handshake, in preference order.
    pub mechanisms: Vec<String>,

    /// Maximum rows requested per fetch.
    pub batch_size: usize,
    /// Read buffer capacity of the unauthenticated transport.
    pub buffer_size: usize,
    pub mem_limit: Option<String>,
    /// Server side query timeout in seconds; `0` disables it.
    pub query_timeout: u32,

    /// Interval between state polls in the polling generation.
    pub poll_interval: Duration,
    /// First delay when a fetch returns no rows yet.
    pub fetch_backoff_initial: Duration,
    /// Upper bound of the fetch backoff delay.
    pub fetch_backoff_max: Duration,
    /// Give up after this many empty-but-pending fetches. `None` retries until cancelled.
    pub fetch_retry_limit: Option<u32>,

    pub max_frame_size: usize,
    pub connect_timeout: Option<Duration>,

    /// Wrap the socket in TLS, trusting the CA bundle at `ca_cert_path`.
    pub use_tls: bool,
    pub ca_cert_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 21050,
            auth: Auth::None,
            mechanisms: vec![MECHANISM_PLAIN.to_string()],
            batch_size: 1024,
            buffer_size: 4096,
            mem_limit: None,
            query_timeout: 0,
            poll_interval: Duration::from_millis(100),
            fetch_backoff_initial: Duration::from_millis(10),
            fetch_backoff_max: Duration::from_secs(1),
            fetch_retry_limit: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: None,
            use_tls: false,
            ca_cert_path: None,
        }
    }
}

impl Options {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_mem_limit(mut self, mem_limit: impl Into<String>) -> Self {
        self.mem_limit = Some(mem_limit.into());
        self
    }

    pub fn with_query_timeout(mut self, seconds: u32) -> Self {
        self.query_timeout = seconds;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fetch_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.fetch_backoff_initial = initial;
        self.fetch_backoff_max = max;
        self
    }

    pub fn with_fetch_retry_limit(mut self, limit: u32) -> Self {
        self.fetch_retry_limit = Some(limit);
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enables TLS verified against the PEM encoded CA certificates at `ca_cert_path`.
    pub fn with_tls(mut self, ca_cert_path: impl Into<PathBuf>) -> Self {
        self.use_tls = true;
        self.ca_cert_path = Some(ca_cert_path.into());
        self
    }

    /// `host:port` as used to open the socket.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configuration map sent with `OpenSession`.
    pub fn session_configuration(&self) -> BTreeMap<String, String> {
        let mut config = BTreeMap::new();
        if let Some(limit) = &self.mem_limit {
            config.insert(CONFIG_MEM_LIMIT.to_string(), limit.clone());
        }
        config.insert(
            CONFIG_QUERY_TIMEOUT.to_string(),
            self.query_timeout.to_string(),
        );
        config
    }

    /// Rejects option combinations that cannot produce a working connection.
    pub fn validate(&self) -> Result<(), String> {
        if let Auth::Plain { username, password } = &self.auth {
            if username.is_empty() {
                return Err("username is required for PLAIN authentication".into());
            }
            if password.is_empty() {
                return Err("password is required for PLAIN authentication".into());
            }
            if self.mechanisms.is_empty() {
                return Err("at least one SASL mechanism must be offered".into());
            }
        }
        if self.use_tls && self.ca_cert_path.is_none() {
            return Err("a CA certificate path is required when TLS is enabled".into());
        }
        if self.batch_size == 0 {
            return Err("batch size must be greater than zero".into());
        }
        if self.max_frame_size == 0 || self.max_frame_size > i32::MAX as usize {
            return Err(format!(
                "max frame size must be within 1..={} bytes",
                i32::MAX
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_configuration_contains_timeout() {
        let config = Options::default().with_query_timeout(30).session_configuration();

        assert_eq!(config.get(CONFIG_QUERY_TIMEOUT).unwrap(), "30");
        assert!(!config.contains_key(CONFIG_MEM_LIMIT));
    }

    #[test]
    fn session_configuration_contains_mem_limit() {
        let config = Options::default().with_mem_limit("2g").session_configuration();

        assert_eq!(config.get(CONFIG_MEM_LIMIT).unwrap(), "2g");
    }

    #[test]
    fn plain_auth_requires_credentials() {
        let options = Options::default().with_auth(Auth::plain("admin", ""));
        assert!(options.validate().unwrap_err().contains("password"));

        let options = Options::default().with_auth(Auth::plain("", "secret"));
        assert!(options.validate().unwrap_err().contains("username"));
    }

    #[test]
    fn zero_batch_size_rejected() {
        let options = Options::default().with_batch_size(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn tls_requires_ca_path() {
        let options = Options {
            use_tls: true,
            ..Options::default()
        };
        assert!(options.validate().unwrap_err().contains("CA certificate"));

        let options = Options::default().with_tls("/etc/hiveline/ca.pem");
        assert!(options.use_tls);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        let options = Options::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.address(), "localhost:21050");
        assert_eq!(options.max_frame_size, 104_857_600);
    }
}
