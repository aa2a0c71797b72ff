use crate::metadata::{base_name, EntryType};
use crate::recursive::{self, DirectoryCreator};
use crate::{AncestorSource, DirectoryEntry, Error, RemotePath, TransferClient, TransferOptions};

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ssh2::{ErrorCode, FileStat, Session, Sftp};
use xfer_ftp_lowlevel::DEFAULT_CHUNK_SIZE;

/// Size of the buffer used to copy between local and remote files.
const COPY_BUFLEN: usize = 4 * DEFAULT_CHUNK_SIZE;

// Status codes of libssh2's sftp subsystem.
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_NO_CONNECTION: i32 = 6;
const FX_CONNECTION_LOST: i32 = 7;
const FX_NO_SUCH_PATH: i32 = 10;
const FX_FILE_ALREADY_EXISTS: i32 = 11;
const FX_WRITE_PROTECT: i32 = 12;

/// The sftp requests [`SftpClient`] is built from.
trait RemoteFs {
    type File: Read + Write;

    fn realpath(&self, path: &Path) -> Result<PathBuf, ssh2::Error>;

    fn stat(&self, path: &Path) -> Result<FileStat, ssh2::Error>;

    fn readdir(&self, path: &Path) -> Result<Vec<(PathBuf, FileStat)>, ssh2::Error>;

    fn open(&self, path: &Path) -> Result<Self::File, ssh2::Error>;

    fn create(&self, path: &Path) -> Result<Self::File, ssh2::Error>;

    fn mkdir(&self, path: &Path) -> Result<(), ssh2::Error>;
}

impl RemoteFs for Sftp {
    type File = ssh2::File;

    fn realpath(&self, path: &Path) -> Result<PathBuf, ssh2::Error> {
        Sftp::realpath(self, path)
    }

    fn stat(&self, path: &Path) -> Result<FileStat, ssh2::Error> {
        Sftp::stat(self, path)
    }

    fn readdir(&self, path: &Path) -> Result<Vec<(PathBuf, FileStat)>, ssh2::Error> {
        Sftp::readdir(self, path)
    }

    fn open(&self, path: &Path) -> Result<Self::File, ssh2::Error> {
        Sftp::open(self, path)
    }

    fn create(&self, path: &Path) -> Result<Self::File, ssh2::Error> {
        Sftp::create(self, path)
    }

    fn mkdir(&self, path: &Path) -> Result<(), ssh2::Error> {
        Sftp::mkdir(self, path, 0o755)
    }
}

/// Remote filesystem plus the working directory tracked for it.
struct SftpSession<F = Sftp> {
    fs: F,
    cwd: RemotePath,
}

struct Connection {
    ssh: Session,
    sftp: SftpSession,
}

/// Client of the authenticated-transport backend.
///
/// Authenticates with a password over SSH and runs the sftp subsystem.
/// The working directory is tracked on the client side, starting at the
/// account's home directory.
pub struct SftpClient {
    inner: Option<Connection>,
    addr: String,
    ancestor_source: AncestorSource,
}

impl fmt::Debug for SftpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpClient")
            .field("addr", &self.addr)
            .field("cwd", &self.inner.as_ref().map(|inner| &inner.sftp.cwd))
            .finish()
    }
}

impl SftpClient {
    /// Connect, complete the SSH handshake, authenticate with the
    /// configured password and open the sftp subsystem.
    pub fn connect(options: &TransferOptions) -> Result<Self, Error> {
        let addr = options.addr();
        let connection_err = |err: ssh2::Error| Error::connection(&*addr, err);

        let tcp = TcpStream::connect(&addr).map_err(|err| Error::connection(&*addr, err))?;

        let mut ssh = Session::new().map_err(connection_err)?;
        ssh.set_tcp_stream(tcp);
        ssh.handshake().map_err(connection_err)?;

        ssh.userauth_password(options.get_user(), options.get_password())
            .map_err(connection_err)?;
        if !ssh.authenticated() {
            return Err(Error::connection(&*addr, "password authentication failed"));
        }

        let fs = ssh.sftp().map_err(connection_err)?;
        let home = fs.realpath(Path::new(".")).map_err(connection_err)?;
        let cwd = RemotePath::new(home.to_string_lossy());

        #[cfg(feature = "tracing")]
        tracing::info!(addr = %addr, user = options.get_user(), home = %cwd, "sftp session established");

        Ok(Self {
            inner: Some(Connection {
                ssh,
                sftp: SftpSession { fs, cwd },
            }),
            addr,
            ancestor_source: options.get_ancestor_source(),
        })
    }

    fn session(&mut self) -> Result<&mut SftpSession, Error> {
        self.inner
            .as_mut()
            .map(|inner| &mut inner.sftp)
            .ok_or(Error::SessionClosed)
    }
}

impl<F: RemoteFs> SftpSession<F> {
    /// Resolve `path` against the working directory.
    fn resolve(&self, path: &str) -> RemotePath {
        self.cwd.join(path)
    }

    fn stat(&self, path: &str) -> Result<FileStat, Error> {
        let resolved = self.resolve(path);
        self.fs
            .stat(Path::new(resolved.as_str()))
            .map_err(|err| map_err(err, path))
    }

    fn change_dir(&mut self, path: &str) -> Result<(), Error> {
        let resolved = self.resolve(path);

        let real = self
            .fs
            .realpath(Path::new(resolved.as_str()))
            .map_err(|err| map_err(err, path))?;
        let real = RemotePath::new(real.to_string_lossy());

        if !self.stat(&real)?.is_dir() {
            return Err(Error::NotFound {
                path: path.to_owned(),
                msg: "not a directory".to_owned(),
            });
        }

        self.cwd = real;
        Ok(())
    }

    fn list(&self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, Error> {
        let dir = match path {
            Some(path) => self.resolve(path),
            None => self.cwd.clone(),
        };

        let entries = self
            .fs
            .readdir(Path::new(dir.as_str()))
            .map_err(|err| map_err(err, &dir))?;

        Ok(entries
            .iter()
            .filter_map(|(path, stat)| {
                let name = base_name(path.to_str()?)?;

                let entry_type = if stat.is_dir() {
                    EntryType::Directory
                } else if stat.is_file() {
                    EntryType::File
                } else {
                    EntryType::Other
                };

                Some(DirectoryEntry::new(name, Some(entry_type)))
            })
            .collect())
    }

    fn download(&self, remote: &str, local: &Path) -> Result<(), Error> {
        let resolved = self.resolve(remote);

        let mut source = self
            .fs
            .open(Path::new(resolved.as_str()))
            .map_err(|err| map_err(err, remote))?;
        let mut sink = File::create(local).map_err(|err| Error::local_io(local, err))?;

        let len = copy(&mut source, &mut sink, |err| Error::TransferIncomplete {
            path: remote.to_owned(),
            msg: err.to_string(),
        }, |err| Error::local_io(local, err))?;

        #[cfg(feature = "tracing")]
        tracing::info!(remote, local = %local.display(), len, "downloaded");
        #[cfg(not(feature = "tracing"))]
        let _ = len;

        Ok(())
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<(), Error> {
        let mut source = File::open(local).map_err(|err| Error::local_io(local, err))?;
        let resolved = self.resolve(remote);

        let mut sink = self
            .fs
            .create(Path::new(resolved.as_str()))
            .map_err(|err| map_err(err, remote))?;

        let len = copy(&mut source, &mut sink, |err| Error::local_io(local, err), |err| {
            Error::TransferIncomplete {
                path: remote.to_owned(),
                msg: err.to_string(),
            }
        })?;
        drop(sink);

        // Confirm the server has every byte.
        let stored = self.stat(remote)?.size.unwrap_or(0);
        if stored != len {
            return Err(Error::TransferIncomplete {
                path: remote.to_owned(),
                msg: format!("remote file has {stored} bytes, expected {len}"),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::info!(local = %local.display(), remote, len, "uploaded");

        Ok(())
    }

    fn size(&self, path: &str) -> Result<u64, Error> {
        self.stat(path)?
            .size
            .ok_or(Error::InvalidResponse(&"server did not report a size"))
    }

    fn modified(&self, path: &str) -> Result<SystemTime, Error> {
        let mtime = self
            .stat(path)?
            .mtime
            .ok_or(Error::InvalidResponse(&"server did not report a modification time"))?;

        Ok(UNIX_EPOCH + Duration::from_secs(mtime))
    }
}

impl<F: RemoteFs> DirectoryCreator for SftpSession<F> {
    fn try_upload(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        self.upload(local, remote)
    }

    fn try_create_dir(&mut self, path: &str) -> Result<(), Error> {
        let resolved = self.resolve(path);

        self.fs
            .mkdir(Path::new(resolved.as_str()))
            .map_err(|err| map_err(err, path))
    }
}

impl TransferClient for SftpClient {
    fn change_dir(&mut self, path: &str) -> Result<(), Error> {
        self.session()?.change_dir(path)
    }

    fn current_dir(&mut self) -> Result<RemotePath, Error> {
        Ok(self.session()?.cwd.clone())
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, Error> {
        self.session()?.list(path)
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<(), Error> {
        self.session()?.download(remote, local)
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        self.session()?.upload(local, remote)
    }

    fn upload_recursive(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        let ancestor_source = self.ancestor_source;
        recursive::upload_recursive(self.session()?, local, remote, ancestor_source)
    }

    fn size(&mut self, path: &str) -> Result<u64, Error> {
        self.session()?.size(path)
    }

    fn modified(&mut self, path: &str) -> Result<SystemTime, Error> {
        self.session()?.modified(path)
    }

    fn close(&mut self) -> Result<(), Error> {
        let Connection { ssh, sftp } = self.inner.take().ok_or(Error::SessionClosed)?;
        drop(sftp);

        ssh.disconnect(None, "closing session", None)
            .map_err(|err| map_err(err, ""))
    }
}

/// Copy `reader` into `writer` and return the number of bytes copied.
///
/// Read and write failures are mapped separately since only one side is
/// local.
fn copy<R, W>(
    reader: &mut R,
    writer: &mut W,
    read_err: impl Fn(io::Error) -> Error,
    write_err: impl Fn(io::Error) -> Error,
) -> Result<u64, Error>
where
    R: Read,
    W: Write,
{
    let mut buffer = vec![0; COPY_BUFLEN];
    let mut copied = 0;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(read_err(err)),
        };

        writer.write_all(&buffer[..n]).map_err(&write_err)?;
        copied += n as u64;
    }

    writer.flush().map_err(write_err)?;

    Ok(copied)
}

fn map_err(err: ssh2::Error, path: &str) -> Error {
    let path = path.to_owned();
    let msg = err.message().to_owned();

    match err.code() {
        ErrorCode::SFTP(FX_NO_SUCH_FILE | FX_NO_SUCH_PATH) => Error::NotFound { path, msg },
        ErrorCode::SFTP(FX_PERMISSION_DENIED | FX_WRITE_PROTECT) => {
            Error::PermissionDenied { path, msg }
        }
        ErrorCode::SFTP(FX_FILE_ALREADY_EXISTS) => Error::AlreadyExists { path, msg },
        ErrorCode::SFTP(FX_NO_CONNECTION | FX_CONNECTION_LOST) => {
            Error::IOError(io::Error::new(io::ErrorKind::ConnectionAborted, msg))
        }
        ErrorCode::SFTP(code) => Error::UnexpectedReply {
            code: u16::try_from(code).unwrap_or(0),
            msg,
        },
        ErrorCode::Session(_) => Error::IOError(io::Error::new(io::ErrorKind::Other, err)),
    }
}
