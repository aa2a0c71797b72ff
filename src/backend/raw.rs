use crate::metadata::base_name;
use crate::recursive::{self, DirectoryCreator};
use crate::{
    AncestorSource, DirectoryEntry, Error, Mode, RemotePath, TransferClient, TransferOptions,
};

use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::fs::File;
use tokio::runtime::{self, Runtime};
use xfer_ftp_lowlevel::ControlChannel;

/// Client of the raw-protocol backend.
///
/// Drives an [`xfer_ftp_lowlevel::ControlChannel`] on a runtime owned by
/// the client, so every call blocks the calling thread. Unlike the other
/// backends the data connection mode can be switched at any time, and
/// files are moved in chunks of
/// [`TransferOptions::get_chunk_size`] bytes.
pub struct RawFtpClient {
    // Declared before `runtime` so the sockets are dropped first.
    control: Option<ControlChannel>,
    runtime: Runtime,

    timeout: Option<Duration>,
    chunk_size: NonZeroUsize,
    ancestor_source: AncestorSource,
    addr: String,
}

impl fmt::Debug for RawFtpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFtpClient")
            .field("addr", &self.addr)
            .field("passive", &self.control.as_ref().map(ControlChannel::is_passive))
            .field("timeout", &self.timeout)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Run `future` to completion on `runtime`, giving up after `timeout`.
fn block_on<T, F>(runtime: &Runtime, timeout: Option<Duration>, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    runtime.block_on(async move {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, future)
                .await
                .map_err(|_elapsed| Error::TimedOut(timeout))?,
            None => future.await,
        }
    })
}

impl RawFtpClient {
    /// Connect, log in and select the data connection mode of
    /// [`TransferOptions::get_mode`].
    pub fn connect(options: &TransferOptions) -> Result<Self, Error> {
        let addr = options.addr();

        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| Error::connection(&*addr, err))?;

        let timeout = options.get_timeout();

        let mut control = block_on(&runtime, timeout, async {
            let mut control = ControlChannel::connect(addr.as_str()).await?;
            control
                .login(options.get_user(), options.get_password())
                .await?;
            Ok::<_, Error>(control)
        })
        .map_err(|err| Error::connection(&*addr, err))?;

        control.set_passive(options.get_mode() == Mode::Passive);

        #[cfg(feature = "tracing")]
        tracing::info!(
            addr = %addr,
            user = options.get_user(),
            passive = control.is_passive(),
            welcome = control.welcome().text(),
            "raw ftp session established"
        );

        Ok(Self {
            control: Some(control),
            runtime,
            timeout,
            chunk_size: options.get_chunk_size(),
            ancestor_source: options.get_ancestor_source(),
            addr,
        })
    }

    /// Use passive (`true`) or active (`false`) data connections from now
    /// on.
    pub fn set_passive(&mut self, passive: bool) -> Result<(), Error> {
        self.session()?.set_passive(passive);
        Ok(())
    }

    /// Return true if data connections are opened in passive mode.
    pub fn is_passive(&self) -> Result<bool, Error> {
        self.control
            .as_ref()
            .map(ControlChannel::is_passive)
            .ok_or(Error::SessionClosed)
    }

    fn session(&mut self) -> Result<&mut ControlChannel, Error> {
        self.control.as_mut().ok_or(Error::SessionClosed)
    }

    /// A session whose operation timed out is in an unknown state, drop it.
    fn check_timeout<T>(&mut self, res: Result<T, Error>) -> Result<T, Error> {
        if let Err(Error::TimedOut(_timeout)) = &res {
            #[cfg(feature = "tracing")]
            tracing::warn!(addr = %self.addr, timeout = ?_timeout, "operation timed out, dropping session");

            self.control = None;
        }
        res
    }
}

/// Fill in the local path of [`Error::LocalIo`] raised while streaming.
fn with_local_path(err: Error, local: &Path) -> Error {
    match err {
        Error::LocalIo { path, source } if path.as_os_str().is_empty() => {
            Error::local_io(local, source)
        }
        err => err,
    }
}

impl TransferClient for RawFtpClient {
    fn change_dir(&mut self, path: &str) -> Result<(), Error> {
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;
        let res = block_on(&self.runtime, self.timeout, control.change_dir(path));
        self.check_timeout(res)
    }

    fn current_dir(&mut self) -> Result<RemotePath, Error> {
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;
        let res = block_on(&self.runtime, self.timeout, control.print_working_dir());
        self.check_timeout(res).map(RemotePath::new)
    }

    fn list(&mut self, path: Option<&str>) -> Result<Vec<DirectoryEntry>, Error> {
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;
        let res = block_on(&self.runtime, self.timeout, control.name_list(path));
        let names = self.check_timeout(res)?;

        Ok(names
            .iter()
            .filter_map(|name| base_name(name))
            .map(|name| DirectoryEntry::new(name, None))
            .collect())
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<(), Error> {
        let chunk_size = self.chunk_size;
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;

        let res = block_on(&self.runtime, self.timeout, async {
            let mut file = File::create(local)
                .await
                .map_err(|err| Error::local_io(local, err))?;

            control
                .retrieve(remote, &mut file, chunk_size)
                .await
                .map_err(|err| with_local_path(err, local))
        });
        let _len = self.check_timeout(res)?;

        #[cfg(feature = "tracing")]
        tracing::info!(remote, local = %local.display(), len = _len, "downloaded");

        Ok(())
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        let chunk_size = self.chunk_size;
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;

        let res = block_on(&self.runtime, self.timeout, async {
            let mut file = File::open(local)
                .await
                .map_err(|err| Error::local_io(local, err))?;

            control
                .store(remote, &mut file, chunk_size)
                .await
                .map_err(|err| with_local_path(err, local))
        });
        let _len = self.check_timeout(res)?;

        #[cfg(feature = "tracing")]
        tracing::info!(local = %local.display(), remote, len = _len, "uploaded");

        Ok(())
    }

    fn upload_recursive(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        let ancestor_source = self.ancestor_source;
        recursive::upload_recursive(self, local, remote, ancestor_source)
    }

    fn size(&mut self, path: &str) -> Result<u64, Error> {
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;
        let res = block_on(&self.runtime, self.timeout, control.size(path));
        self.check_timeout(res)
    }

    fn modified(&mut self, path: &str) -> Result<SystemTime, Error> {
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;
        let res = block_on(&self.runtime, self.timeout, control.modification_time(path));
        self.check_timeout(res)
    }

    fn close(&mut self) -> Result<(), Error> {
        let control = self.control.take().ok_or(Error::SessionClosed)?;
        block_on(&self.runtime, self.timeout, control.quit())
    }
}

impl DirectoryCreator for RawFtpClient {
    fn try_upload(&mut self, local: &Path, remote: &str) -> Result<(), Error> {
        self.upload(local, remote)
    }

    fn try_create_dir(&mut self, path: &str) -> Result<(), Error> {
        let control = self.control.as_mut().ok_or(Error::SessionClosed)?;
        let res = block_on(&self.runtime, self.timeout, control.make_dir(path));
        self.check_timeout(res)
    }
}
