//! This crate provides the async building blocks to talk to an FTP server
//! as described in RFC 959, RFC 2428 and RFC 3659, implemented in pure Rust
//! on top of tokio.
//!
//! A session consists of one [`ControlChannel`] which sends commands and
//! decodes the replies with [`ReplyCodec`]. Every transfer opens its own
//! data connection, either by asking the server for a passive endpoint
//! (`PASV`/`EPSV`) or by listening locally and announcing it (`PORT`/`EPRT`),
//! see [`ControlChannel::set_passive`].
//!
//! Bytes are moved in fixed-size chunks, so the memory used by a transfer
//! does not depend on the size of the file.
//!
//! Replies that indicate a failure are mapped to the shared
//! [`Error`] vocabulary by [`classify`].

#![forbid(unsafe_code)]

pub use xfer_error::{Error, ErrorKind};

/// Port an FTP server listens on unless told otherwise.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Default number of bytes moved per read/write during a transfer.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Upper bound of a single reply, including all lines of a multiline reply.
pub const MAX_REPLY_LEN: usize = 64 * 1024;

#[cfg(doc)]
/// Changelog for this crate.
pub mod changelog;

mod reply;
pub use reply::{classify, Reply, ReplyCodec};

mod time;
pub use time::parse_modification_time;

mod connection;
pub use connection::{ControlChannel, TransferType};

mod data;
