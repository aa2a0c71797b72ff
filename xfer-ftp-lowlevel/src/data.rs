use super::{ControlChannel, Error, Reply, TransferType};

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Transfer failures on the data connection mean the remote side has only
/// part of the bytes.
fn incomplete(path: &str, err: io::Error) -> Error {
    Error::TransferIncomplete {
        path: path.to_owned(),
        msg: err.to_string(),
    }
}

/// Errors of the local reader/writer are reported with an empty path, the
/// caller knows which local file it handed in.
fn local(err: io::Error) -> Error {
    Error::local_io("", err)
}

impl ControlChannel {
    /// Ask the server for a passive endpoint.
    ///
    /// Only the port of the reply is used; the host is always the peer of
    /// the control connection, since servers behind NAT tend to announce
    /// unreachable addresses.
    async fn enter_passive(&mut self) -> Result<SocketAddr, Error> {
        let peer_ip = self.peer_addr.ip();

        let port = if peer_ip.is_ipv4() {
            let reply = self.expect_completion("PASV", None, "").await?;
            parse_pasv_port(reply.text())
                .ok_or(Error::InvalidResponse(&"PASV reply does not contain an address"))?
        } else {
            let reply = self.expect_completion("EPSV", None, "").await?;
            parse_epsv_port(reply.text())
                .ok_or(Error::InvalidResponse(&"EPSV reply does not contain a port"))?
        };

        Ok(SocketAddr::new(peer_ip, port))
    }

    /// Listen locally and announce the endpoint with `PORT`/`EPRT`.
    async fn announce_port(&mut self) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(SocketAddr::new(self.local_addr.ip(), 0)).await?;
        let addr = listener.local_addr()?;

        match addr.ip() {
            IpAddr::V4(ip) => {
                let [a, b, c, d] = ip.octets();
                let arg = format!("{a},{b},{c},{d},{},{}", addr.port() >> 8, addr.port() & 0xff);
                self.expect_completion("PORT", Some(&arg), "").await?;
            }
            IpAddr::V6(ip) => {
                let arg = format!("|2|{ip}|{}|", addr.port());
                self.expect_completion("EPRT", Some(&arg), "").await?;
            }
        }

        Ok(listener)
    }

    /// Open a data connection for `verb path` and wait for the server to
    /// accept the transfer.
    async fn open_data(&mut self, verb: &str, arg: Option<&str>) -> Result<TcpStream, Error> {
        let path = arg.unwrap_or("");

        if self.passive {
            let addr = self.enter_passive().await?;
            let stream = TcpStream::connect(addr).await?;

            self.expect_preliminary(verb, arg, path).await?;

            Ok(stream)
        } else {
            let listener = self.announce_port().await?;

            self.expect_preliminary(verb, arg, path).await?;

            let (stream, _addr) = listener.accept().await?;
            Ok(stream)
        }
    }

    async fn expect_preliminary(
        &mut self,
        verb: &str,
        arg: Option<&str>,
        path: &str,
    ) -> Result<Reply, Error> {
        let mut reply = self.command(verb, arg).await?;

        // Some servers send a 2xx before the 1xx of a transfer command.
        if reply.is_completion() {
            reply = self.read_reply().await?;
        }

        if reply.is_preliminary() {
            Ok(reply)
        } else {
            Err(reply.into_error(path))
        }
    }

    /// Read the reply closing a transfer.
    async fn finish_transfer(&mut self, path: &str) -> Result<(), Error> {
        let reply = self.read_reply().await?;
        if reply.is_completion() {
            Ok(())
        } else {
            Err(reply.into_error(path))
        }
    }

    /// Drop the data connection after a failure and resynchronise the
    /// control connection with the reply the server sends for it.
    async fn abandon_transfer(&mut self, data: TcpStream, err: Error) -> Error {
        drop(data);

        match self.read_reply().await {
            Ok(_) => err,
            Err(occuring_error) => err.error_on_cleanup(occuring_error),
        }
    }

    /// `RETR`: copy the remote file `path` into `sink`, `chunk_size` bytes
    /// at a time.
    ///
    /// Return the number of bytes copied. Errors raised by `sink` are
    /// returned as [`Error::LocalIo`] with an empty path.
    pub async fn retrieve<W>(
        &mut self,
        path: &str,
        sink: &mut W,
        chunk_size: NonZeroUsize,
    ) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin,
    {
        self.set_transfer_type(TransferType::Binary).await?;

        let mut data = self.open_data("RETR", Some(path)).await?;
        let mut buffer = BytesMut::with_capacity(chunk_size.get());
        let mut copied = 0;

        loop {
            buffer.clear();

            let n = match data.read_buf(&mut buffer).await {
                Ok(n) => n,
                Err(err) => return Err(self.abandon_transfer(data, incomplete(path, err)).await),
            };
            if n == 0 {
                break;
            }

            if let Err(err) = sink.write_all(&buffer).await {
                return Err(self.abandon_transfer(data, local(err)).await);
            }
            copied += n as u64;
        }

        drop(data);
        sink.flush().await.map_err(local)?;

        self.finish_transfer(path).await?;

        Ok(copied)
    }

    /// `STOR`: copy everything `source` yields into the remote file
    /// `path`, `chunk_size` bytes at a time.
    ///
    /// Return the number of bytes copied. Errors raised by `source` are
    /// returned as [`Error::LocalIo`] with an empty path.
    pub async fn store<R>(
        &mut self,
        path: &str,
        source: &mut R,
        chunk_size: NonZeroUsize,
    ) -> Result<u64, Error>
    where
        R: AsyncRead + Unpin,
    {
        self.set_transfer_type(TransferType::Binary).await?;

        let mut data = self.open_data("STOR", Some(path)).await?;
        let mut buffer = BytesMut::with_capacity(chunk_size.get());
        let mut copied = 0;

        loop {
            buffer.clear();

            let n = match source.read_buf(&mut buffer).await {
                Ok(n) => n,
                Err(err) => return Err(self.abandon_transfer(data, local(err)).await),
            };
            if n == 0 {
                break;
            }

            if let Err(err) = data.write_all(&buffer).await {
                return Err(self.abandon_transfer(data, incomplete(path, err)).await);
            }
            copied += n as u64;
        }

        if let Err(err) = data.shutdown().await {
            return Err(self.abandon_transfer(data, incomplete(path, err)).await);
        }
        drop(data);

        self.finish_transfer(path).await?;

        Ok(copied)
    }

    /// `NLST`: names in the directory `path`, or in the working directory
    /// if `path` is `None`.
    ///
    /// Entries are returned as sent by the server, which may include the
    /// directory prefix.
    pub async fn name_list(&mut self, path: Option<&str>) -> Result<Vec<String>, Error> {
        self.set_transfer_type(TransferType::Ascii).await?;

        let mut data = self.open_data("NLST", path).await?;
        let mut listing = Vec::new();

        if let Err(err) = data.read_to_end(&mut listing).await {
            let err = incomplete(path.unwrap_or(""), err);
            return Err(self.abandon_transfer(data, err).await);
        }
        drop(data);

        self.finish_transfer(path.unwrap_or("")).await?;

        Ok(String::from_utf8_lossy(&listing)
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

/// Port of a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
fn parse_pasv_port(text: &str) -> Option<u16> {
    text.split(|c: char| !(c.is_ascii_digit() || c == ','))
        .find_map(|token| {
            let numbers = token
                .split(',')
                .map(|part| part.parse::<u8>().ok())
                .collect::<Option<Vec<u8>>>()?;

            match numbers.as_slice() {
                [_, _, _, _, p1, p2] => Some(u16::from(*p1) << 8 | u16::from(*p2)),
                _ => None,
            }
        })
}

/// Port of a `229 Entering Extended Passive Mode (|||port|)` reply.
fn parse_epsv_port(text: &str) -> Option<u16> {
    let start = text.find('(')? + 1;
    let end = start + text[start..].find(')')?;
    let inner = &text[start..end];

    let delimiter = inner.chars().next()?;
    inner.split(delimiter).nth(3)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pasv_reply() {
        assert_eq!(
            parse_pasv_port("Entering Passive Mode (127,0,0,1,195,80)."),
            Some(195 * 256 + 80)
        );
        assert_eq!(parse_pasv_port("Entering Passive Mode 10,0,0,7,4,1"), Some(1025));
        assert_eq!(parse_pasv_port("Entering Passive Mode (1,2,3)"), None);
        assert_eq!(parse_pasv_port("Entering Passive Mode (300,0,0,1,4,1)"), None);
    }

    #[test]
    fn epsv_reply() {
        assert_eq!(
            parse_epsv_port("Entering Extended Passive Mode (|||6446|)"),
            Some(6446)
        );
        assert_eq!(parse_epsv_port("Entering Extended Passive Mode (!!!21!)"), Some(21));
        assert_eq!(parse_epsv_port("Entering Extended Passive Mode"), None);
    }
}
