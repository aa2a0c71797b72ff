use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use xfer_ftp_lowlevel::{DEFAULT_CHUNK_SIZE, DEFAULT_FTP_PORT};

/// Port an SFTP server listens on unless told otherwise.
pub const DEFAULT_SFTP_PORT: u16 = 22;

const DEFAULT_NONZERO_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CHUNK_SIZE) {
    Some(chunk_size) => chunk_size,
    None => panic!("DEFAULT_CHUNK_SIZE must not be 0"),
};

/// Backend used to talk to the remote host.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// [`FtpClient`](crate::FtpClient).
    Ftp,
    /// [`SftpClient`](crate::SftpClient).
    Sftp,
    /// [`RawFtpClient`](crate::RawFtpClient).
    RawFtp,
}

impl Protocol {
    /// Port used when none is configured.
    pub const fn default_port(self) -> u16 {
        match self {
            Protocol::Ftp | Protocol::RawFtp => DEFAULT_FTP_PORT,
            Protocol::Sftp => DEFAULT_SFTP_PORT,
        }
    }
}

/// How data connections are opened.
///
/// Only honoured by [`RawFtpClient`](crate::RawFtpClient).
///
/// In configuration files the mode is a string: `"passive"` selects
/// [`Mode::Passive`] and any other value selects [`Mode::Active`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Mode {
    /// The client connects to an endpoint announced by the server.
    #[default]
    Passive,
    /// The server connects back to an endpoint announced by the client.
    Active,
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mode = String::deserialize(deserializer)?;

        Ok(if mode == "passive" {
            Mode::Passive
        } else {
            Mode::Active
        })
    }
}

/// Which path the recursive upload derives the ancestor directories
/// from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AncestorSource {
    /// Ancestors of the remote destination.
    #[default]
    Remote,
    /// Ancestors of the local source file, created on the remote side.
    ///
    /// Only useful to reproduce the directory layout produced by older
    /// deployments of this client.
    Local,
}

/// Options used to open a session.
///
/// ```
/// use std::time::Duration;
/// use xfer_client::{Mode, Protocol, TransferOptions};
///
/// let options = TransferOptions::new(Protocol::RawFtp, "ftp.example.com")
///     .credentials("user", "password")
///     .mode(Mode::Active)
///     .timeout(Duration::from_secs(30));
///
/// assert_eq!(options.addr(), "ftp.example.com:21");
/// ```
#[derive(Clone, Eq, PartialEq, Deserialize)]
pub struct TransferOptions {
    protocol: Protocol,
    host: String,
    #[serde(default)]
    port: Option<u16>,

    #[serde(default)]
    user: String,
    #[serde(default)]
    password: String,

    #[serde(default)]
    mode: Mode,
    #[serde(default, deserialize_with = "deserialize_timeout")]
    timeout: Option<Duration>,
    #[serde(default)]
    chunk_size: Option<NonZeroUsize>,
    #[serde(default)]
    ancestor_source: AncestorSource,
}

impl fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOptions")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<hidden>")
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .field("chunk_size", &self.chunk_size)
            .field("ancestor_source", &self.ancestor_source)
            .finish()
    }
}

impl TransferOptions {
    /// Create options for an anonymous session to `host`.
    pub fn new(protocol: Protocol, host: impl Into<String>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: None,
            user: String::new(),
            password: String::new(),
            mode: Mode::Passive,
            timeout: None,
            chunk_size: None,
            ancestor_source: AncestorSource::Remote,
        }
    }

    /// Set `port`, default is [`Protocol::default_port`].
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the data connection mode, default is [`Mode::Passive`].
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Fail any single operation that takes longer than `timeout`.
    ///
    /// Only honoured by [`RawFtpClient`](crate::RawFtpClient), the other
    /// backends block until the transport gives up.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the number of bytes moved per read/write of a raw transfer,
    /// default is [`DEFAULT_CHUNK_SIZE`].
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Set where recursive uploads take their ancestor directories from,
    /// default is [`AncestorSource::Remote`].
    #[must_use]
    pub fn ancestor_source(mut self, ancestor_source: AncestorSource) -> Self {
        self.ancestor_source = ancestor_source;
        self
    }

    pub fn get_protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn get_host(&self) -> &str {
        &self.host
    }

    pub fn get_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    pub fn get_user(&self) -> &str {
        &self.user
    }

    pub(crate) fn get_password(&self) -> &str {
        &self.password
    }

    pub fn get_mode(&self) -> Mode {
        self.mode
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn get_chunk_size(&self) -> NonZeroUsize {
        self.chunk_size.unwrap_or(DEFAULT_NONZERO_CHUNK_SIZE)
    }

    pub fn get_ancestor_source(&self) -> AncestorSource {
        self.ancestor_source
    }

    /// `host:port` of the remote end.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.get_port())
        } else {
            format!("{}:{}", self.host, self.get_port())
        }
    }
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn default_ports() {
        assert_eq!(TransferOptions::new(Protocol::Ftp, "h").get_port(), 21);
        assert_eq!(TransferOptions::new(Protocol::RawFtp, "h").get_port(), 21);
        assert_eq!(TransferOptions::new(Protocol::Sftp, "h").get_port(), 22);
        assert_eq!(
            TransferOptions::new(Protocol::Sftp, "h").port(2222).get_port(),
            2222
        );
    }

    #[test]
    fn addr_brackets_ipv6_hosts() {
        assert_eq!(TransferOptions::new(Protocol::Ftp, "::1").addr(), "[::1]:21");
        assert_eq!(
            TransferOptions::new(Protocol::Sftp, "example.com").addr(),
            "example.com:22"
        );
    }

    #[test]
    fn debug_hides_password() {
        let options = TransferOptions::new(Protocol::Ftp, "h").credentials("user", "hunter2");
        let debug = format!("{options:?}");

        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn deserialize_from_config() {
        let options: TransferOptions = serde_json::from_str(
            r#"{
                "protocol": "raw_ftp",
                "host": "10.0.0.7",
                "user": "u",
                "password": "p",
                "mode": "active",
                "timeout": 2.5,
                "chunk_size": 4096,
                "ancestor_source": "local"
            }"#,
        )
        .unwrap();

        assert_eq!(options.get_protocol(), Protocol::RawFtp);
        assert_eq!(options.get_port(), 21);
        assert_eq!(options.get_mode(), Mode::Active);
        assert_eq!(options.get_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(options.get_chunk_size().get(), 4096);
        assert_eq!(options.get_ancestor_source(), AncestorSource::Local);

        let options: TransferOptions =
            serde_json::from_str(r#"{"protocol": "sftp", "host": "h"}"#).unwrap();
        assert_eq!(options.get_port(), 22);
        assert_eq!(options.get_mode(), Mode::Passive);
        assert_eq!(options.get_timeout(), None);
        assert_eq!(options.get_chunk_size().get(), DEFAULT_CHUNK_SIZE);

        assert!(serde_json::from_str::<TransferOptions>(
            r#"{"protocol": "sftp", "host": "h", "timeout": -1}"#
        )
        .is_err());
    }

    #[test]
    fn mode_other_than_passive_is_active() {
        let mode = |json: &str| serde_json::from_str::<Mode>(json).unwrap();

        assert_eq!(mode(r#""passive""#), Mode::Passive);
        assert_eq!(mode(r#""active""#), Mode::Active);
        assert_eq!(mode(r#""port""#), Mode::Active);
        assert_eq!(mode(r#""Passive""#), Mode::Active);
        assert_eq!(mode(r#""""#), Mode::Active);

        assert!(serde_json::from_str::<Mode>("1").is_err());
    }
}
