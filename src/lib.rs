//! This crate moves files between the local filesystem and a remote server
//! through one blocking interface, [`TransferClient`], with three backends
//! to choose from:
//!
//!  - [`FtpClient`]: plain FTP built on the [`ftp`](::ftp) crate, which
//!    negotiates a passive data connection for every transfer.
//!  - [`SftpClient`]: SFTP over SSH with password authentication, built on
//!    [`ssh2`].
//!  - [`RawFtpClient`]: FTP spoken directly through
//!    [`xfer_ftp_lowlevel`], with switchable passive/active data
//!    connections and chunked transfers.
//!
//! [`connect`] picks the backend named by [`TransferOptions`], and
//! [`with_client`] additionally closes the session once done.
//!
//! [`TransferClient::upload_recursive`] creates missing directories on the
//! way to the destination and retries the upload once, which makes it
//! suitable for unattended exports into dated directory trees.
//!
//! # Errors
//!
//! Every backend reports failures with the same [`Error`] type. Use
//! [`Error::kind`] to react to the category of a failure, independent of
//! the backend that raised it.
//!
//! # Feature flags
//!
//!  - `tracing`: enabled by default, logs sessions, transfers and the
//!    decisions of recursive uploads with [`tracing`](https://docs.rs/tracing).

#![forbid(unsafe_code)]

pub use xfer_error::{Error, ErrorKind, RecursiveError};
pub use xfer_ftp_lowlevel::{DEFAULT_CHUNK_SIZE, DEFAULT_FTP_PORT};

mod options;
pub use options::{AncestorSource, Mode, Protocol, TransferOptions, DEFAULT_SFTP_PORT};

mod path;
pub use path::RemotePath;

mod metadata;
pub use metadata::{DirectoryEntry, EntryType, FileMetadata};

mod client;
pub use client::TransferClient;

mod recursive;

mod backend;
pub use backend::{connect, AnyClient, FtpClient, RawFtpClient, SftpClient};

mod scoped;
pub use scoped::{with_client, with_session};

#[cfg(doc)]
/// Changelog for this crate.
pub mod changelog;
