#![forbid(unsafe_code)]

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error as ThisError;

/// Boxed error reported by the library a backend is built on.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by
/// [`xfer-ftp-lowlevel`](https://docs.rs/xfer-ftp-lowlevel)
/// and [`xfer-client`](https://docs.rs/xfer-client)
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum Error {
    /// Failed to establish the session: unreachable host, rejected
    /// credentials or failed handshake.
    #[error("Failed to establish session with {addr}: {source}")]
    Connection {
        /// `host:port` the session was opened against.
        addr: String,
        /// Underlying cause.
        #[source]
        source: BoxedError,
    },

    /// The session has already been closed.
    #[error("Session is closed")]
    SessionClosed,

    /// An operation did not complete within the configured timeout.
    ///
    /// The session is unusable afterwards.
    #[error("Operation timed out after {0:?}")]
    TimedOut(Duration),

    /// Remote path does not exist.
    #[error("Remote path {path:?} not found: {msg}")]
    NotFound {
        /// Remote path the operation referenced.
        path: String,
        /// Message reported by the server.
        msg: String,
    },

    /// Remote path already exists.
    #[error("Remote path {path:?} already exists: {msg}")]
    AlreadyExists {
        /// Remote path the operation referenced.
        path: String,
        /// Message reported by the server.
        msg: String,
    },

    /// Operation rejected by remote authorization.
    #[error("Permission denied on remote path {path:?}: {msg}")]
    PermissionDenied {
        /// Remote path the operation referenced.
        path: String,
        /// Message reported by the server.
        msg: String,
    },

    /// Local file missing, unreadable or unwritable.
    #[error("Local IO error on {path:?}: {source}")]
    LocalIo {
        /// Local path involved.
        path: PathBuf,
        /// Underlying io error.
        #[source]
        source: io::Error,
    },

    /// The byte stream of a transfer ended early.
    #[error("Transfer of {path:?} incomplete: {msg}")]
    TransferIncomplete {
        /// Remote path being transferred.
        path: String,
        /// Description of what went missing.
        msg: String,
    },

    /// IO Error on the session transport: {0}.
    #[error("IO Error on the session transport: {0}.")]
    IOError(#[from] io::Error),

    /// Server answered with a reply the client does not expect.
    #[error("Server replied {code}: {msg}")]
    UnexpectedReply {
        /// Reply code, `0` if the backend does not report codes.
        code: u16,
        /// Reply text.
        msg: String,
    },

    /// Path contains characters that cannot be sent over the control
    /// connection.
    #[error("Path {0:?} cannot be sent to the server")]
    InvalidPath(String),

    /// Invalid response from the server
    #[error("Response from server is invalid: {0}")]
    InvalidResponse(
        // Use `&&str` since `&str` takes 16 bytes while `&str` only takes 8 bytes.
        &'static &'static str,
    ),

    /// Raised 2 errors when cleaning up.
    #[error(transparent)]
    RecursiveErrors(Box<RecursiveError>),
}

/// Common vocabulary every backend maps its failures to.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Session establishment failed or the session is no longer usable.
    Connection,
    /// Referenced remote path does not exist.
    NotFound,
    /// Referenced remote path already exists.
    AlreadyExists,
    /// Operation rejected by remote authorization.
    PermissionDenied,
    /// Local file missing, unreadable or unwritable.
    LocalIo,
    /// Partial byte transfer.
    TransferIncomplete,
    /// Reply the client cannot map to any of the above.
    Protocol,
}

impl Error {
    /// Classify this error.
    ///
    /// For [`Error::RecursiveErrors`] the kind of the original error is
    /// returned.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. }
            | Error::SessionClosed
            | Error::TimedOut(_)
            | Error::IOError(_) => ErrorKind::Connection,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::LocalIo { .. } => ErrorKind::LocalIo,
            Error::TransferIncomplete { .. } => ErrorKind::TransferIncomplete,
            Error::UnexpectedReply { .. } | Error::InvalidPath(_) | Error::InvalidResponse(_) => {
                ErrorKind::Protocol
            }
            Error::RecursiveErrors(err) => err.original_error.kind(),
        }
    }

    /// Create [`Error::Connection`].
    pub fn connection(addr: impl Into<String>, source: impl Into<BoxedError>) -> Self {
        Error::Connection {
            addr: addr.into(),
            source: source.into(),
        }
    }

    /// Create [`Error::LocalIo`].
    pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Combine `self` with an error raised while cleaning up after it.
    pub fn error_on_cleanup(self, occuring_error: Error) -> Self {
        Error::RecursiveErrors(Box::new(RecursiveError {
            original_error: self,
            occuring_error,
        }))
    }
}

#[derive(Debug, ThisError)]
#[error("OriginalError: {original_error}, curr err raised when cleaning up: {occuring_error}.")]
pub struct RecursiveError {
    /// Original error
    pub original_error: Error,

    /// Current error raised when performing cleanup
    /// for original error.
    #[source]
    pub occuring_error: Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_recursive_error_is_the_original_kind() {
        let err = Error::NotFound {
            path: "/a".into(),
            msg: "gone".into(),
        }
        .error_on_cleanup(Error::SessionClosed);

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn closed_and_timed_out_sessions_are_connection_errors() {
        assert_eq!(Error::SessionClosed.kind(), ErrorKind::Connection);
        assert_eq!(
            Error::TimedOut(Duration::from_secs(1)).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::connection("h:21", "refused").kind(),
            ErrorKind::Connection
        );
    }

    #[test]
    fn local_io_keeps_path() {
        let err = Error::local_io("/tmp/x", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.kind(), ErrorKind::LocalIo);
        assert!(err.to_string().contains("/tmp/x"));
    }
}
