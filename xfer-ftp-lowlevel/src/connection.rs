#![forbid(unsafe_code)]

use super::{parse_modification_time, Error, Reply, ReplyCodec};

use std::future::poll_fn;
use std::io::{self, IoSlice};
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::SystemTime;

use futures_core::Stream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_io_utility::write_vectored_all;
use tokio_util::codec::FramedRead;

/// Representation type of the data connection (`TYPE`).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransferType {
    /// `TYPE A`, used for listings.
    Ascii,
    /// `TYPE I`, used for file contents.
    Binary,
}

impl TransferType {
    fn as_arg(self) -> &'static str {
        match self {
            TransferType::Ascii => "A",
            TransferType::Binary => "I",
        }
    }
}

/// The control connection of one FTP session.
///
/// Commands and replies are strictly sequential: every method takes
/// `&mut self` and reads the reply of its command before returning.
#[derive(Debug)]
pub struct ControlChannel {
    reader: FramedRead<OwnedReadHalf, ReplyCodec>,
    writer: OwnedWriteHalf,

    pub(crate) peer_addr: SocketAddr,
    pub(crate) local_addr: SocketAddr,

    pub(crate) passive: bool,
    transfer_type: Option<TransferType>,

    welcome: Reply,
}

impl ControlChannel {
    /// Open the control connection and wait for the `220` greeting.
    ///
    /// The data connection mode defaults to passive.
    ///
    /// # Cancel Safety
    ///
    /// This function is not cancel safe.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;

        let (reader, writer) = stream.into_split();
        let mut reader = FramedRead::new(reader, ReplyCodec::new());

        let welcome = next_reply(&mut reader).await?;
        if welcome.code() != 220 {
            return Err(welcome.into_error(""));
        }

        Ok(Self {
            reader,
            writer,
            peer_addr,
            local_addr,
            passive: true,
            transfer_type: None,
            welcome,
        })
    }

    /// The greeting sent by the server on connect.
    pub fn welcome(&self) -> &Reply {
        &self.welcome
    }

    /// Address of the server end of the control connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Use passive (`true`) or active (`false`) data connections for
    /// subsequent transfers.
    pub fn set_passive(&mut self, passive: bool) {
        self.passive = passive;
    }

    /// Return true if data connections are opened in passive mode.
    pub fn is_passive(&self) -> bool {
        self.passive
    }

    /// Send one command line.
    ///
    /// `arg` must not contain `\r` or `\n`.
    pub async fn send(&mut self, verb: &str, arg: Option<&str>) -> Result<(), Error> {
        if let Some(arg) = arg {
            if arg.contains(|c: char| c == '\r' || c == '\n') {
                return Err(Error::InvalidPath(arg.to_owned()));
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            verb,
            arg = ?if verb == "PASS" { Some("<hidden>") } else { arg },
            "sending ftp command"
        );

        let mut io_slices = Vec::with_capacity(4);
        io_slices.push(IoSlice::new(verb.as_bytes()));
        if let Some(arg) = arg {
            io_slices.push(IoSlice::new(b" "));
            io_slices.push(IoSlice::new(arg.as_bytes()));
        }
        io_slices.push(IoSlice::new(b"\r\n"));

        write_vectored_all(&mut self.writer, io_slices.as_mut_slice()).await?;

        Ok(())
    }

    /// Wait for the next reply.
    pub async fn read_reply(&mut self) -> Result<Reply, Error> {
        let reply = next_reply(&mut self.reader).await?;

        #[cfg(feature = "tracing")]
        tracing::trace!(code = reply.code(), text = reply.text(), "received ftp reply");

        Ok(reply)
    }

    /// Send a command and wait for its reply, whatever the reply code.
    pub async fn command(&mut self, verb: &str, arg: Option<&str>) -> Result<Reply, Error> {
        self.send(verb, arg).await?;
        self.read_reply().await
    }

    /// Send a command and require a `2xx` reply.
    ///
    /// Any other reply is mapped with [`Reply::into_error`] using `path`.
    pub async fn expect_completion(
        &mut self,
        verb: &str,
        arg: Option<&str>,
        path: &str,
    ) -> Result<Reply, Error> {
        let reply = self.command(verb, arg).await?;
        if reply.is_completion() {
            Ok(reply)
        } else {
            Err(reply.into_error(path))
        }
    }

    /// Log in with `USER`/`PASS`.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), Error> {
        let mut reply = self.command("USER", Some(user)).await?;

        if reply.is_intermediate() {
            reply = self.command("PASS", Some(password)).await?;
        }

        if reply.is_completion() {
            Ok(())
        } else {
            Err(reply.into_error(user))
        }
    }

    /// Switch the representation type, skipping the round trip if the
    /// session already uses `transfer_type`.
    pub async fn set_transfer_type(&mut self, transfer_type: TransferType) -> Result<(), Error> {
        if self.transfer_type == Some(transfer_type) {
            return Ok(());
        }

        self.expect_completion("TYPE", Some(transfer_type.as_arg()), "")
            .await?;
        self.transfer_type = Some(transfer_type);

        Ok(())
    }

    /// `PWD`: return the current working directory.
    pub async fn print_working_dir(&mut self) -> Result<String, Error> {
        let reply = self.expect_completion("PWD", None, "").await?;

        parse_quoted_path(reply.text())
            .ok_or(Error::InvalidResponse(&"PWD reply does not contain a quoted path"))
    }

    /// `CWD`: change the working directory.
    pub async fn change_dir(&mut self, path: &str) -> Result<(), Error> {
        self.expect_completion("CWD", Some(path), path).await?;
        Ok(())
    }

    /// `MKD`: create a directory.
    pub async fn make_dir(&mut self, path: &str) -> Result<(), Error> {
        self.expect_completion("MKD", Some(path), path).await?;
        Ok(())
    }

    /// `SIZE`: size of a file in bytes.
    ///
    /// Switches to binary type first since some servers refuse `SIZE` in
    /// ascii mode.
    pub async fn size(&mut self, path: &str) -> Result<u64, Error> {
        self.set_transfer_type(TransferType::Binary).await?;

        let reply = self.expect_completion("SIZE", Some(path), path).await?;

        reply
            .text()
            .trim()
            .parse()
            .map_err(|_| Error::InvalidResponse(&"SIZE reply does not contain a number"))
    }

    /// `MDTM`: last modification time of a file.
    pub async fn modification_time(&mut self, path: &str) -> Result<SystemTime, Error> {
        let reply = self.expect_completion("MDTM", Some(path), path).await?;

        parse_modification_time(reply.text())
            .ok_or(Error::InvalidResponse(&"MDTM reply does not contain a timestamp"))
    }

    /// `QUIT` and close the control connection.
    ///
    /// A server that hangs up without replying is not an error.
    pub async fn quit(mut self) -> Result<(), Error> {
        self.send("QUIT", None).await?;

        match self.read_reply().await {
            Ok(_) => Ok(()),
            Err(Error::IOError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
            Err(err) => Err(err),
        }
    }
}

async fn next_reply(reader: &mut FramedRead<OwnedReadHalf, ReplyCodec>) -> Result<Reply, Error> {
    match poll_fn(|cx| Pin::new(&mut *reader).poll_next(cx)).await {
        Some(res) => res,
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "control connection closed by server",
        )
        .into()),
    }
}

/// Extract the path from a `257 "/some ""quoted"" dir" ...` reply text.
fn parse_quoted_path(text: &str) -> Option<String> {
    let rest = &text[text.find('"')? + 1..];

    let mut path = String::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
            } else {
                return Some(path);
            }
        }
        path.push(c);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::parse_quoted_path;

    #[test]
    fn quoted_path() {
        assert_eq!(
            parse_quoted_path(r#""/home/user" is the current directory"#).as_deref(),
            Some("/home/user")
        );
        assert_eq!(
            parse_quoted_path(r#""/a ""b"" c" created"#).as_deref(),
            Some(r#"/a "b" c"#)
        );
        assert_eq!(parse_quoted_path("no quotes"), None);
        assert_eq!(parse_quoted_path(r#""unterminated"#), None);
    }
}
