use crate::metadata::base_name;
use crate::recursive::{self, DirectoryCreator};
use crate::{AncestorSource, DirectoryEntry, Error, RemotePath, TransferClient, TransferOptions};

use std::cell::Cell;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ::ftp::types::FileType;
use ::ftp::{FtpError, FtpStream};
use xfer_ftp_lowlevel::classify;

/// Client of the plain-session backend.
///
/// Built on the [`ftp`](::ftp) crate, which negotiates a passive data
/// connection for every transfer and moves whole files at once.
pub struct FtpClient {
    stream: Option<FtpStream>,
    addr: String,
    ancestor_source: AncestorSource,
}

impl fmt::Debug for FtpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpClient")
            .field("addr", &self.addr)
            .field("closed", &self.stream.is_none())
            .finish()
    }
}

impl FtpClient {
    /// Connect, log in and switch to binary transfers.
    pub fn connect(options: &TransferOptions) -> Result<Self, Error> {
        let addr = options.addr();

        let mut stream =
            FtpStream::connect(addr.as_str()).map_err(|err| Error::connection(&*addr, err))?;

        stream
            .login(options.get_user(), options.get_password())
            .map_err(|err| Error::connection(&*addr, err))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|err| Error::connection(&*addr, err))?;

        #[cfg(feature = "tracing")]
        tracing::info!(addr = %addr, user = options.get_user(), "ftp session established");

        Ok(Self {
            stream: Some(stream),
            addr,
            ancestor_source: options.get_ancestor_source(),
        })
    }

    fn session(&mut self) -> Result<&mut FtpStream, Error> {
        self.stream.as_mut().ok_or(Error::SessionClosed)
    }
}

impl TransferClient for FtpClient {
    fn change_dir(&mut self, path: &str) -> Result<(), Error> {
        self.session()?.cwd(path).map_err(|err| map_err(err, path))
    }

    fn current_dir(&mut self) -> Result<RemotePath, Error> {
        self.session()?
            .pwd()
            .map(RemotePath::new)
            .map_err(|err| map_err(err, ""))
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, Error> {
        let stream = self.session()?;
        let names = stream
            .nlst(path)
            .map_err(|err| map_err(err, path.unwrap_or("")));

        // `nlst` leaves the session in ascii mode.
        stream
            .transfer_type(FileType::Binary)
            .map_err(|err| map_err(err, ""))?;
        let names = names?;

        Ok(names
            .iter()
            .filter_map(|name| base_name(name))
            .map(|name| DirectoryEntry::new(name, None))
            .collect())
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<(), Error> {
        let file = File::create(local).map_err(|err| Error::local_io(local, err))?;
        let write_error = Cell::new(None);

        let _len = self
            .session()?
            .retr(remote, |reader| {
                write_to_file(reader, &file, &write_error).map_err(FtpError::ConnectionError)
            })
            .map_err(|err| map_err(err, remote))?;

        if let Some(err) = write_error.into_inner() {
            return Err(Error::local_io(local, err));
        }

        #[cfg(feature = "tracing")]
        tracing::info!(remote, local = %local.display(), len = _len, "downloaded");

        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        let mut file = File::open(local).map_err(|err| Error::local_io(local, err))?;

        self.session()?
            .put(remote, &mut file)
            .map_err(|err| map_err(err, remote))?;

        #[cfg(feature = "tracing")]
        tracing::info!(local = %local.display(), remote, "uploaded");

        Ok(())
    }

    fn upload_recursive(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        let ancestor_source = self.ancestor_source;
        recursive::upload_recursive(self, local, remote, ancestor_source)
    }

    fn size(&mut self, path: &str) -> Result<u64, Error> {
        match self.session()?.size(path) {
            Ok(Some(size)) => Ok(size as u64),
            Ok(None) => Err(Error::NotFound {
                path: path.to_owned(),
                msg: "server did not report a size".to_owned(),
            }),
            Err(err) => Err(map_err(err, path)),
        }
    }

    fn modified(&mut self, path: &str) -> Result<SystemTime, Error> {
        match self.session()?.mdtm(path) {
            Ok(Some(modified)) => {
                // Same conversion as chrono 0.4's `From<DateTime> for SystemTime`;
                // the `ftp` crate hands back a chrono 0.2 value.
                let sec = modified.timestamp();
                let nsec = modified.timestamp_subsec_nanos();
                Ok(if sec < 0 {
                    UNIX_EPOCH - Duration::new(-sec as u64, 0) + Duration::new(0, nsec)
                } else {
                    UNIX_EPOCH + Duration::new(sec as u64, nsec)
                })
            }
            Ok(None) => Err(Error::NotFound {
                path: path.to_owned(),
                msg: "server did not report a modification time".to_owned(),
            }),
            Err(err) => Err(map_err(err, path)),
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        let mut stream = self.stream.take().ok_or(Error::SessionClosed)?;
        stream.quit().map_err(|err| map_err(err, ""))
    }
}

impl DirectoryCreator for FtpClient {
    fn try_upload(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        self.upload(local, remote)
    }

    fn try_create_dir(&mut self, path: &str) -> Result<(), Error> {
        self.session()?
            .mkdir(path)
            .map_err(|err| map_err(err, path))
    }
}

/// Copy the data connection into `file` as it arrives.
///
/// A failed local write is stored in `write_error` and the rest of the
/// data is drained, so the server's final reply is still read.
fn write_to_file<R: Read + ?Sized>(
    reader: &mut R,
    mut file: &File,
    write_error: &Cell<Option<io::Error>>,
) -> io::Result<u64> {
    let mut buf = vec![0; 64 * 1024];
    let mut len = 0;
    let mut writing = true;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };

        if writing {
            if let Err(err) = file.write_all(&buf[..n]) {
                write_error.set(Some(err));
                writing = false;
            }
        }
        len += n as u64;
    }

    Ok(len)
}

/// Map an error of the `ftp` crate, recovering the reply code from the
/// message of [`FtpError::InvalidResponse`].
fn map_err(err: FtpError, path: &str) -> Error {
    match err {
        FtpError::ConnectionError(err) => Error::IOError(err),
        FtpError::InvalidResponse(text) => match parse_reply(&text) {
            Some((code, msg)) => classify(code, msg, path),
            None => Error::UnexpectedReply {
                code: 0,
                msg: text.trim().to_owned(),
            },
        },
        err => Error::UnexpectedReply {
            code: 0,
            msg: err.to_string(),
        },
    }
}

/// Find the reply in a message such as
/// `Expected code [250], got response: 550 Failed to change directory.`
fn parse_reply(text: &str) -> Option<(u16, &str)> {
    let mut rest = text;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (token, tail) = rest.split_at(end);

        if token.len() == 3 && token.bytes().all(|byte| byte.is_ascii_digit()) {
            return Some((token.parse().ok()?, tail.trim()));
        }

        rest = tail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    use std::fs;
    use std::io::{self, Cursor};

    use xfer_test_common::tempdir;

    #[test]
    fn download_is_written_as_it_arrives() {
        let dir = tempdir();
        let path = dir.path().join("f.bin");
        let data: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();

        let file = File::create(&path).unwrap();
        let write_error = Cell::new(None);
        let len = write_to_file(&mut Cursor::new(&data), &file, &write_error).unwrap();

        assert_eq!(len, 200_000);
        assert!(write_error.into_inner().is_none());
        assert_eq!(fs::read(&path).unwrap(), data);
    }

    #[test]
    fn failed_local_write_drains_the_data() {
        let dir = tempdir();
        let path = dir.path().join("f.bin");
        fs::write(&path, b"").unwrap();

        // Opened for reading only, so every write fails.
        let file = File::open(&path).unwrap();
        let write_error = Cell::new(None);
        let mut reader = Cursor::new(vec![7; 100_000]);
        let len = write_to_file(&mut reader, &file, &write_error).unwrap();

        assert_eq!(len, 100_000);
        assert_eq!(reader.position(), 100_000);
        assert!(write_error.into_inner().is_some());
    }

    #[test]
    fn reply_in_invalid_response() {
        assert_eq!(
            parse_reply("Expected code [250], got response: 550 Failed to change directory.\r\n"),
            Some((550, "Failed to change directory."))
        );
        assert_eq!(
            parse_reply("Expected code [125, 150], got response: 553 Could not create file."),
            Some((553, "Could not create file."))
        );
        assert_eq!(parse_reply("Expected code [250], got response: "), None);
    }

    #[test]
    fn map_errors() {
        let err = FtpError::InvalidResponse(
            "Expected code [226, 250], got response: 426 Connection closed; transfer aborted.\r\n"
                .to_owned(),
        );
        assert_eq!(map_err(err, "/f").kind(), ErrorKind::TransferIncomplete);

        let err = FtpError::InvalidResponse("garbage".to_owned());
        assert_eq!(map_err(err, "/f").kind(), ErrorKind::Protocol);

        let err = FtpError::ConnectionError(io::ErrorKind::BrokenPipe.into());
        assert_eq!(map_err(err, "/f").kind(), ErrorKind::Connection);
    }
}
