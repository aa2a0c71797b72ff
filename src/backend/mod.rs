use super::{DirectoryEntry, Error, FileMetadata, Protocol, RemotePath, TransferClient, TransferOptions};

use std::path::Path;
use std::time::SystemTime;

mod ftp;
pub use self::ftp::FtpClient;

mod sftp;
pub use self::sftp::SftpClient;

mod raw;
pub use self::raw::RawFtpClient;

/// A client of the backend selected by [`TransferOptions`].
#[derive(Debug)]
pub enum AnyClient {
    Ftp(FtpClient),
    Sftp(SftpClient),
    RawFtp(RawFtpClient),
}

macro_rules! dispatch {
    ($self:ident, $client:ident => $expr:expr) => {
        match $self {
            AnyClient::Ftp($client) => $expr,
            AnyClient::Sftp($client) => $expr,
            AnyClient::RawFtp($client) => $expr,
        }
    };
}

impl AnyClient {
    /// Backend of this client.
    pub fn protocol(&self) -> Protocol {
        match self {
            AnyClient::Ftp(_) => Protocol::Ftp,
            AnyClient::Sftp(_) => Protocol::Sftp,
            AnyClient::RawFtp(_) => Protocol::RawFtp,
        }
    }
}

/// Open a session with the backend named by [`TransferOptions::get_protocol`].
pub fn connect(options: &TransferOptions) -> Result<AnyClient, Error> {
    Ok(match options.get_protocol() {
        Protocol::Ftp => AnyClient::Ftp(FtpClient::connect(options)?),
        Protocol::Sftp => AnyClient::Sftp(SftpClient::connect(options)?),
        Protocol::RawFtp => AnyClient::RawFtp(RawFtpClient::connect(options)?),
    })
}

impl TransferClient for AnyClient {
    fn change_dir(&mut self, path: &str) -> Result<(), Error> {
        dispatch!(self, client => client.change_dir(path))
    }

    fn current_dir(&mut self) -> Result<RemotePath, Error> {
        dispatch!(self, client => client.current_dir())
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, Error> {
        dispatch!(self, client => client.list(path))
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<(), Error> {
        dispatch!(self, client => client.download(remote, local))
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        dispatch!(self, client => client.upload(local, remote))
    }

    fn upload_recursive(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        dispatch!(self, client => client.upload_recursive(local, remote))
    }

    fn size(&mut self, path: &str) -> Result<u64, Error> {
        dispatch!(self, client => client.size(path))
    }

    fn modified(&mut self, path: &str) -> Result<SystemTime, Error> {
        dispatch!(self, client => client.modified(path))
    }

    fn metadata(&mut self, path: &str) -> Result<FileMetadata, Error> {
        dispatch!(self, client => client.metadata(path))
    }

    fn close(&mut self) -> Result<(), Error> {
        dispatch!(self, client => client.close())
    }
}
