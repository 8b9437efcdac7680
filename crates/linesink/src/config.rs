// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Sender session configuration.
//!
//! Everything a session needs is captured here at construction time; there
//! is no process-wide mutable state. Two front doors build a config:
//! explicit `with_*` setters, or a configuration string handled by the
//! [`conf`](crate::conf) module. Deployments that keep ingestion settings
//! in files can use [`SenderConfig::from_yaml`] / [`from_yaml_file`].
//!
//! [`from_yaml_file`]: SenderConfig::from_yaml_file

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::auth::AuthParams;
use crate::buffer::DEFAULT_MAX_NAME_LEN;
use crate::error::{Error, Result};

/// Default auto-flush row-count threshold.
pub const DEFAULT_AUTO_FLUSH_ROWS: usize = 1000;

/// Default auto-flush byte threshold.
pub const DEFAULT_AUTO_FLUSH_BYTES: usize = 64 * 1024;

/// Default auto-flush staleness interval.
pub const DEFAULT_AUTO_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-request/send timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of additional send attempts after a transient failure.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay for exponential retry backoff.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Cap on a single backoff sleep.
pub(crate) const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Wire transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain TCP streaming.
    Tcp,
    /// TLS-wrapped TCP streaming.
    Tcps,
    /// HTTP request/response.
    Http,
    /// HTTPS request/response.
    Https,
}

impl Protocol {
    /// Parse a configuration-string schema.
    pub(crate) fn from_schema(schema: &str) -> Result<Self> {
        match schema {
            "tcp" => Ok(Protocol::Tcp),
            "tcps" => Ok(Protocol::Tcps),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(Error::Config(format!(
                "unknown schema {:?}, expected tcp, tcps, http or https",
                other
            ))),
        }
    }

    /// Whether this transport runs over TLS.
    pub fn is_tls(&self) -> bool {
        matches!(self, Protocol::Tcps | Protocol::Https)
    }

    /// Whether this transport speaks HTTP.
    pub fn is_http(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }

    /// Well-known ingestion port for this transport.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Tcp | Protocol::Tcps => 9009,
            Protocol::Http | Protocol::Https => 9000,
        }
    }
}

/// Server certificate validation policy for TLS transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsVerifyMode {
    /// Full chain and host name verification (default).
    #[default]
    Strict,
    /// Chain verified; host name mismatches tolerated.
    Relaxed,
    /// No verification at all. Trusted-local-network use only.
    Disabled,
}

/// Complete configuration for a [`Sender`](crate::Sender) session.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Wire transport kind.
    pub protocol: Protocol,
    /// Server host name or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Authentication credentials.
    pub auth: AuthParams,

    // === Auto-flush policy (None disables the trigger) ===
    /// Flush when this many rows are pending.
    pub auto_flush_rows: Option<usize>,
    /// Flush when this many bytes are pending.
    pub auto_flush_bytes: Option<usize>,
    /// Flush when the oldest pending row is this stale (checked on commit).
    pub auto_flush_interval: Option<Duration>,

    // === Timeouts and retry ===
    /// Timeout for establishing the connection (including TLS handshake).
    pub connect_timeout: Duration,
    /// Read/write timeout for one send or HTTP request cycle.
    pub request_timeout: Duration,
    /// Additional attempts after a transient send failure.
    pub retry_attempts: u32,
    /// Base backoff delay, doubled per attempt (capped at 5 s).
    pub retry_backoff: Duration,

    // === TLS ===
    /// Certificate validation mode.
    pub tls_verify: TlsVerifyMode,
    /// Extra PEM root certificates to trust (in addition to webpki roots).
    pub tls_roots: Option<PathBuf>,
    /// Client certificate chain (PEM) for mutual TLS.
    pub tls_client_cert: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS.
    pub tls_client_key: Option<PathBuf>,

    // === Encoding ===
    /// Table/column name length cap.
    pub max_name_len: usize,
}

impl SenderConfig {
    /// Start a config for `protocol` against `host:port`.
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
            auth: AuthParams::None,
            auto_flush_rows: Some(DEFAULT_AUTO_FLUSH_ROWS),
            auto_flush_bytes: Some(DEFAULT_AUTO_FLUSH_BYTES),
            auto_flush_interval: Some(DEFAULT_AUTO_FLUSH_INTERVAL),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            tls_verify: TlsVerifyMode::Strict,
            tls_roots: None,
            tls_client_cert: None,
            tls_client_key: None,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }

    /// Set authentication credentials.
    pub fn with_auth(mut self, auth: AuthParams) -> Self {
        self.auth = auth;
        self
    }

    /// Set or disable the row-count auto-flush trigger.
    pub fn with_auto_flush_rows(mut self, rows: Option<usize>) -> Self {
        self.auto_flush_rows = rows;
        self
    }

    /// Set or disable the byte-size auto-flush trigger.
    pub fn with_auto_flush_bytes(mut self, bytes: Option<usize>) -> Self {
        self.auto_flush_bytes = bytes;
        self
    }

    /// Set or disable the staleness auto-flush trigger.
    pub fn with_auto_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.auto_flush_interval = interval;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry attempt budget.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the base retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the TLS verification mode.
    pub fn with_tls_verify(mut self, mode: TlsVerifyMode) -> Self {
        self.tls_verify = mode;
        self
    }

    /// Trust an additional PEM root certificate file.
    pub fn with_tls_roots(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_roots = Some(path.into());
        self
    }

    /// Present a client certificate and key (mutual TLS).
    pub fn with_tls_client_auth(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.tls_client_cert = Some(cert.into());
        self.tls_client_key = Some(key.into());
        self
    }

    /// Set the table/column name length cap.
    pub fn with_max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    /// Validate cross-field constraints before a session is built.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be zero".into()));
        }
        match &self.auth {
            AuthParams::None => {}
            AuthParams::Basic { .. } | AuthParams::Token { .. } => {
                if !self.protocol.is_http() {
                    return Err(Error::Config(
                        "basic/token auth requires the http or https transport".into(),
                    ));
                }
            }
            #[cfg(feature = "ecdsa-auth")]
            AuthParams::Ecdsa(_) => {
                if self.protocol.is_http() {
                    return Err(Error::Config(
                        "key-pair auth requires the tcp or tcps transport".into(),
                    ));
                }
            }
        }
        if self.tls_client_cert.is_some() != self.tls_client_key.is_some() {
            return Err(Error::Config(
                "mutual TLS needs both tls_client_cert and tls_client_key".into(),
            ));
        }
        #[cfg(not(feature = "tls"))]
        if self.protocol.is_tls() {
            return Err(Error::Config(
                "TLS transports require the 'tls' feature".into(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // YAML loading
    // ========================================================================

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: SenderConfigFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("YAML parse error: {}", e)))?;
        file.into_config()
    }

    /// Parse a configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// File-facing mirror of [`SenderConfig`] with millisecond durations.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SenderConfigFile {
    protocol: Protocol,
    host: String,
    port: Option<u16>,
    auth: Option<AuthParams>,
    auto_flush_rows: Option<usize>,
    auto_flush_bytes: Option<usize>,
    auto_flush_interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    retry_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
    tls_verify: Option<TlsVerifyMode>,
    tls_roots: Option<PathBuf>,
    tls_client_cert: Option<PathBuf>,
    tls_client_key: Option<PathBuf>,
    max_name_len: Option<usize>,
}

impl SenderConfigFile {
    fn into_config(self) -> Result<SenderConfig> {
        let port = self.port.unwrap_or_else(|| self.protocol.default_port());
        let mut config = SenderConfig::new(self.protocol, self.host, port);
        if let Some(auth) = self.auth {
            config.auth = auth;
        }
        if let Some(rows) = self.auto_flush_rows {
            config.auto_flush_rows = (rows > 0).then_some(rows);
        }
        if let Some(bytes) = self.auto_flush_bytes {
            config.auto_flush_bytes = (bytes > 0).then_some(bytes);
        }
        if let Some(ms) = self.auto_flush_interval_ms {
            config.auto_flush_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.retry_attempts {
            config.retry_attempts = attempts;
        }
        if let Some(ms) = self.retry_backoff_ms {
            config.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(mode) = self.tls_verify {
            config.tls_verify = mode;
        }
        config.tls_roots = self.tls_roots;
        config.tls_client_cert = self.tls_client_cert;
        config.tls_client_key = self.tls_client_key;
        if let Some(len) = self.max_name_len {
            config.max_name_len = len;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SenderConfig::new(Protocol::Tcp, "localhost", 9009);
        assert_eq!(config.auto_flush_rows, Some(DEFAULT_AUTO_FLUSH_ROWS));
        assert_eq!(config.auto_flush_bytes, Some(DEFAULT_AUTO_FLUSH_BYTES));
        assert_eq!(config.auto_flush_interval, Some(DEFAULT_AUTO_FLUSH_INTERVAL));
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(config.tls_verify, TlsVerifyMode::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = SenderConfig::new(Protocol::Http, "db.example.com", 9000)
            .with_auth(AuthParams::Token { token: "tok".into() })
            .with_auto_flush_rows(Some(10))
            .with_auto_flush_interval(None)
            .with_retry_attempts(0)
            .with_max_name_len(64);
        assert_eq!(config.auto_flush_rows, Some(10));
        assert!(config.auto_flush_interval.is_none());
        assert_eq!(config.retry_attempts, 0);
        assert_eq!(config.max_name_len, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_auth_transport_pairing() {
        let config = SenderConfig::new(Protocol::Tcp, "h", 9009).with_auth(AuthParams::Token {
            token: "t".into(),
        });
        assert!(matches!(config.validate().unwrap_err(), Error::Config(_)));

        #[cfg(feature = "ecdsa-auth")]
        {
            let key = crate::auth::EcdsaKey {
                key_id: "id".into(),
                private_key: "d".into(),
                public_key_x: "x".into(),
                public_key_y: "y".into(),
            };
            let config =
                SenderConfig::new(Protocol::Http, "h", 9000).with_auth(AuthParams::Ecdsa(key));
            assert!(matches!(config.validate().unwrap_err(), Error::Config(_)));
        }
    }

    #[test]
    fn test_validate_mtls_needs_both_halves() {
        let config = SenderConfig::new(Protocol::Tcps, "h", 9009)
            .with_tls_client_auth("client.crt", "client.key");
        assert!(config.validate().is_ok());

        let mut config = SenderConfig::new(Protocol::Tcps, "h", 9009);
        config.tls_client_cert = Some("client.crt".into());
        assert!(matches!(config.validate().unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_validate_empty_host_and_zero_port() {
        assert!(SenderConfig::new(Protocol::Tcp, "", 9009).validate().is_err());
        assert!(SenderConfig::new(Protocol::Tcp, "h", 0).validate().is_err());
    }

    #[test]
    fn test_protocol_helpers() {
        assert!(Protocol::Tcps.is_tls());
        assert!(Protocol::Https.is_tls());
        assert!(!Protocol::Tcp.is_tls());
        assert!(Protocol::Http.is_http());
        assert!(!Protocol::Tcp.is_http());
        assert_eq!(Protocol::Tcp.default_port(), 9009);
        assert_eq!(Protocol::Https.default_port(), 9000);
        assert!(Protocol::from_schema("udp").is_err());
    }

    #[test]
    fn test_yaml_minimal() {
        let config = SenderConfig::from_yaml(
            r#"
protocol: tcp
host: localhost
"#,
        )
        .expect("parse minimal yaml");
        assert_eq!(config.protocol, Protocol::Tcp);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 9009);
        assert_eq!(config.auth, AuthParams::None);
    }

    #[test]
    fn test_yaml_full() {
        let config = SenderConfig::from_yaml(
            r#"
protocol: https
host: db.example.com
port: 443
auth:
  kind: token
  token: "jwt-here"
auto_flush_rows: 500
auto_flush_bytes: 32768
auto_flush_interval_ms: 2000
connect_timeout_ms: 1500
request_timeout_ms: 3000
retry_attempts: 5
retry_backoff_ms: 50
tls_verify: relaxed
max_name_len: 64
"#,
        )
        .expect("parse full yaml");
        assert_eq!(config.protocol, Protocol::Https);
        assert_eq!(config.port, 443);
        assert_eq!(
            config.auth,
            AuthParams::Token { token: "jwt-here".into() }
        );
        assert_eq!(config.auto_flush_rows, Some(500));
        assert_eq!(config.auto_flush_bytes, Some(32768));
        assert_eq!(config.auto_flush_interval, Some(Duration::from_millis(2000)));
        assert_eq!(config.connect_timeout, Duration::from_millis(1500));
        assert_eq!(config.request_timeout, Duration::from_millis(3000));
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_backoff, Duration::from_millis(50));
        assert_eq!(config.tls_verify, TlsVerifyMode::Relaxed);
        assert_eq!(config.max_name_len, 64);
    }

    #[test]
    fn test_yaml_zero_disables_trigger() {
        let config = SenderConfig::from_yaml(
            r#"
protocol: tcp
host: localhost
auto_flush_rows: 0
auto_flush_interval_ms: 0
"#,
        )
        .unwrap();
        assert!(config.auto_flush_rows.is_none());
        assert!(config.auto_flush_interval.is_none());
        // Unset trigger keeps its default.
        assert_eq!(config.auto_flush_bytes, Some(DEFAULT_AUTO_FLUSH_BYTES));
    }

    #[test]
    fn test_yaml_unknown_field_rejected() {
        let err = SenderConfig::from_yaml(
            r#"
protocol: tcp
host: localhost
no_such_option: 1
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "protocol: http\nhost: localhost\nport: 9000\n").unwrap();
        let config = SenderConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.protocol, Protocol::Http);
    }
}
