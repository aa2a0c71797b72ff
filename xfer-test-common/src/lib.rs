use std::env;
use std::fmt::Debug;
use std::fs;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use libunftp::auth::{AuthenticationError, Authenticator, Credentials, DefaultUser};
use libunftp::options::ActivePassiveMode;
use libunftp::storage::{self, Fileinfo, Metadata, StorageBackend};
use libunftp::ServerBuilder;
use once_cell::sync::OnceCell;
use tempfile::TempDir;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::runtime;
use tokio::sync::oneshot;
use unftp_sbe_fs::Filesystem;

/// User accepted by [`FtpServer::start`].
pub const USER: &str = "tester";
/// Password accepted by [`FtpServer::start`].
pub const PASSWORD: &str = "secret";

pub fn get_path_for_tmp_files() -> &'static Path {
    static TMP_DIR: OnceCell<PathBuf> = OnceCell::new();

    TMP_DIR.get_or_init(|| {
        let path = env::var_os("XFER_TEST_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir)
            .join("xfer_client");

        fs::create_dir_all(&path).expect("Failed to create directory for test files");

        path
    })
}

/// A fresh directory removed on drop.
pub fn tempdir() -> TempDir {
    tempfile::tempdir_in(get_path_for_tmp_files()).unwrap()
}

/// `path` relative to the server root, without `/`, `.` or `..`.
fn virtual_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect()
}

#[derive(Debug)]
pub struct FtpServerBuilder {
    user: String,
    password: String,
    read_only: Vec<PathBuf>,
    truncate_downloads_after: Option<usize>,
}

impl FtpServerBuilder {
    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_owned();
        self.password = password.to_owned();
        self
    }

    /// Refuse `MKD` and `STOR` at or below the absolute virtual path
    /// `path`. The directory is created when the server starts.
    pub fn read_only(mut self, path: &str) -> Self {
        self.read_only.push(virtual_path(Path::new(path)));
        self
    }

    /// Fail every download after `len` bytes, so the server reports a
    /// local error instead of `226`.
    pub fn truncate_downloads_after(mut self, len: usize) -> Self {
        self.truncate_downloads_after = Some(len);
        self
    }

    /// Serve `root` on an ephemeral port of 127.0.0.1.
    pub fn start(self, root: impl Into<PathBuf>) -> FtpServer {
        let root = root.into();

        for path in &self.read_only {
            fs::create_dir_all(root.join(path)).unwrap();
        }

        // libunftp binds by address, so reserve a free port first.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .unwrap();

        let authenticator = PasswordAuthenticator {
            user: self.user,
            password: self.password,
        };
        let read_only = Arc::new(self.read_only);
        let truncate_downloads_after = self.truncate_downloads_after;
        let fs_root = root.clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = thread::Builder::new()
            .name("xfer-test-ftp-server".to_owned())
            .spawn(move || {
                let server = ServerBuilder::new(Box::new(move || FaultyFilesystem {
                    inner: Filesystem::new(fs_root.clone()),
                    read_only: read_only.clone(),
                    truncate_downloads_after,
                }))
                .greeting("xfer-test-common ftp server")
                .authenticator(Arc::new(authenticator))
                .active_passive_mode(ActivePassiveMode::ActiveAndPassive)
                .build()
                .unwrap();

                let runtime = runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();

                runtime.block_on(async move {
                    tokio::select! {
                        res = server.listen(addr.to_string()) => {
                            if let Err(err) = res {
                                eprintln!("ftp server: {err}");
                            }
                        }
                        _ = shutdown_rx => (),
                    }
                });
            })
            .unwrap();

        wait_until_listening(addr);

        FtpServer {
            addr,
            root,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }
}

fn wait_until_listening(addr: SocketAddr) {
    for _ in 0..500 {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("ftp server on {addr} did not start");
}

/// An FTP server serving a local directory from a background thread.
///
/// Stopped when dropped.
#[derive(Debug)]
pub struct FtpServer {
    addr: SocketAddr,
    root: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FtpServer {
    pub fn builder() -> FtpServerBuilder {
        FtpServerBuilder {
            user: USER.to_owned(),
            password: PASSWORD.to_owned(),
            read_only: Vec::new(),
            truncate_downloads_after: None,
        }
    }

    /// Serve `root`, accepting [`USER`] and [`PASSWORD`].
    pub fn start(root: impl Into<PathBuf>) -> Self {
        Self::builder().start(root)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FtpServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[derive(Debug)]
struct PasswordAuthenticator {
    user: String,
    password: String,
}

#[async_trait]
impl Authenticator<DefaultUser> for PasswordAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        creds: &Credentials,
    ) -> Result<DefaultUser, AuthenticationError> {
        if username != self.user {
            return Err(AuthenticationError::BadUser);
        }

        match &creds.password {
            Some(password) if *password == self.password => Ok(DefaultUser {}),
            _ => Err(AuthenticationError::BadPassword),
        }
    }
}

/// [`Filesystem`] with the faults configured on [`FtpServerBuilder`].
#[derive(Debug)]
struct FaultyFilesystem {
    inner: Filesystem,
    read_only: Arc<Vec<PathBuf>>,
    truncate_downloads_after: Option<usize>,
}

impl FaultyFilesystem {
    fn check_writable(&self, path: &Path) -> storage::Result<()> {
        let path = virtual_path(path);

        if self.read_only.iter().any(|prefix| path.starts_with(prefix)) {
            Err(storage::Error::from(storage::ErrorKind::PermissionDenied))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend<DefaultUser> for FaultyFilesystem {
    type Metadata = <Filesystem as StorageBackend<DefaultUser>>::Metadata;

    async fn metadata<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
    ) -> storage::Result<Self::Metadata> {
        self.inner.metadata(user, path).await
    }

    async fn list<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
    ) -> storage::Result<Vec<Fileinfo<PathBuf, Self::Metadata>>>
    where
        <Self as StorageBackend<DefaultUser>>::Metadata: Metadata,
    {
        self.inner.list(user, path).await
    }

    async fn get<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
        start_pos: u64,
    ) -> storage::Result<Box<dyn AsyncRead + Send + Sync + Unpin>> {
        let reader = self.inner.get(user, path, start_pos).await?;

        Ok(match self.truncate_downloads_after {
            Some(remaining) => Box::new(CutShort { inner: reader, remaining }),
            None => reader,
        })
    }

    async fn put<P: AsRef<Path> + Send + Debug, R: AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        user: &DefaultUser,
        input: R,
        path: P,
        start_pos: u64,
    ) -> storage::Result<u64> {
        self.check_writable(path.as_ref())?;
        self.inner.put(user, input, path, start_pos).await
    }

    async fn del<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
    ) -> storage::Result<()> {
        self.inner.del(user, path).await
    }

    async fn mkd<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
    ) -> storage::Result<()> {
        self.check_writable(path.as_ref())?;
        self.inner.mkd(user, path).await
    }

    async fn rename<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        from: P,
        to: P,
    ) -> storage::Result<()> {
        self.inner.rename(user, from, to).await
    }

    async fn rmd<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
    ) -> storage::Result<()> {
        self.inner.rmd(user, path).await
    }

    async fn cwd<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
    ) -> storage::Result<()> {
        self.inner.cwd(user, path).await
    }
}

/// Yields at most `remaining` bytes of `inner`, then fails.
struct CutShort {
    inner: Box<dyn AsyncRead + Send + Sync + Unpin>,
    remaining: usize,
}

impl AsyncRead for CutShort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        if this.remaining == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "download cut short",
            )));
        }

        let mut chunk = vec![0; this.remaining.min(buf.remaining())];
        let mut chunk_buf = ReadBuf::new(&mut chunk);
        ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk_buf))?;

        let filled = chunk_buf.filled();
        this.remaining -= filled.len();
        buf.put_slice(filled);

        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_paths() {
        assert_eq!(virtual_path(Path::new("/locked/sub")), Path::new("locked/sub"));
        assert_eq!(virtual_path(Path::new("locked/./sub/")), Path::new("locked/sub"));
        assert_eq!(virtual_path(Path::new("/")), Path::new(""));

        assert!(virtual_path(Path::new("/locked/sub")).starts_with("locked"));
        assert!(!virtual_path(Path::new("/lockedout")).starts_with("locked"));
    }

    #[tokio::test]
    async fn cut_short_fails_after_the_limit() {
        let mut reader = CutShort {
            inner: Box::new(&[1_u8; 5000][..]),
            remaining: 1000,
        };

        let mut copied = Vec::new();
        let err = tokio::io::copy(&mut reader, &mut copied).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(copied.len(), 1000);
    }

    #[tokio::test]
    async fn cut_short_passes_short_files_through() {
        let mut reader = CutShort {
            inner: Box::new(&b"short"[..]),
            remaining: 1000,
        };

        let mut copied = Vec::new();
        tokio::io::copy(&mut reader, &mut copied).await.unwrap();

        assert_eq!(copied, b"short");
    }

    #[test]
    fn server_accepts_connections_until_dropped() {
        let dir = tempdir();
        let server = FtpServer::builder().read_only("/locked").start(dir.path());
        let addr = server.addr();

        assert!(dir.path().join("locked").is_dir());
        TcpStream::connect(addr).unwrap();

        drop(server);
        assert!(TcpStream::connect(addr).is_err());
    }
}
