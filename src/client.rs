use super::{DirectoryEntry, Error, FileMetadata, RemotePath};

use std::path::Path;
use std::time::SystemTime;

/// Operations every backend provides.
///
/// All methods block until the server has answered. A client holds exactly
/// one session and is not meant to be shared between threads; open one
/// client per concurrent unit of work instead.
///
/// Remote paths are `/` separated and either absolute or relative to
/// [`TransferClient::current_dir`].
///
/// Dropping a client does not close its session gracefully, use
/// [`TransferClient::close`] or [`with_session`](crate::with_session).
pub trait TransferClient {
    /// Change the working directory of the session.
    fn change_dir(&mut self, path: &str) -> Result<(), Error>;

    /// Absolute path of the working directory.
    fn current_dir(&mut self) -> Result<RemotePath, Error>;

    /// Entries of the directory `path`, or of the working directory if
    /// `path` is `None`.
    ///
    /// Names are base names. Order is unspecified.
    fn list(&mut self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, Error>;

    /// Copy the remote file `remote` to `local`, overwriting it.
    ///
    /// The parent directory of `local` must exist. On failure `local` may
    /// be left partially written.
    fn download(&mut self, remote: &str, local: &Path) -> Result<(), Error>;

    /// Copy the local file `local` to `remote`.
    ///
    /// The parent directory of `remote` must exist, otherwise this fails
    /// without creating anything. See [`TransferClient::upload_recursive`].
    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), Error>;

    /// Like [`TransferClient::upload`], but create the missing ancestor
    /// directories and retry once if the first attempt fails.
    ///
    /// Failures to create individual directories are logged and otherwise
    /// ignored; the caller only sees the result of the retried upload.
    /// Connection and local IO errors are returned without a retry.
    fn upload_recursive(&mut self, local: &Path, remote: &str) -> Result<(), Error>;

    /// Size of the remote file in bytes.
    fn size(&mut self, path: &str) -> Result<u64, Error>;

    /// Last modification time of the remote file.
    fn modified(&mut self, path: &str) -> Result<SystemTime, Error>;

    /// Size and last modification time of the remote file.
    fn metadata(&mut self, path: &str) -> Result<FileMetadata, Error> {
        let len = self.size(path)?;
        let modified = self.modified(path)?;

        Ok(FileMetadata::new(len, modified))
    }

    /// Release the session.
    ///
    /// Every call afterwards, including another `close`, fails with
    /// [`Error::SessionClosed`].
    fn close(&mut self) -> Result<(), Error>;
}
