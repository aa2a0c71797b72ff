use super::{Error, MAX_REPLY_LEN};

use std::fmt;
use std::io;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A complete reply of the server, possibly spanning several lines.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Reply {
    code: u16,
    /// Text of every line with the code and separator stripped.
    lines: Vec<String>,
}

impl Reply {
    /// Create a single line reply.
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Parse one reply line such as `550 No such file`.
    ///
    /// Return `None` if the line does not start with a three digit code.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        let code = parse_code(line.as_bytes())?;
        let text = line.get(4..).unwrap_or("");

        Some(Self::new(code, text))
    }

    /// The three digit reply code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Text of the first line.
    pub fn text(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or("")
    }

    /// Text of every line.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// `1xx`: the command was accepted and another reply will follow.
    pub fn is_preliminary(&self) -> bool {
        self.code / 100 == 1
    }

    /// `2xx`: the command completed.
    pub fn is_completion(&self) -> bool {
        self.code / 100 == 2
    }

    /// `3xx`: the server needs more information, e.g. a password.
    pub fn is_intermediate(&self) -> bool {
        self.code / 100 == 3
    }

    /// Map this reply to an [`Error`] about `path`.
    pub fn into_error(self, path: &str) -> Error {
        classify(self.code, &self.lines.join("\n"), path)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" / "))
    }
}

fn parse_code(line: &[u8]) -> Option<u16> {
    let digits = line.get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if !matches!(line.get(3), None | Some(b' ') | Some(b'-')) {
        return None;
    }

    digits
        .iter()
        .try_fold(0_u16, |acc, digit| Some(acc * 10 + u16::from(digit - b'0')))
}

/// Map a failed reply to the shared error vocabulary.
///
/// Servers disagree on which `5xx` code to use for a missing path versus a
/// rejected one, so the text is consulted for `450`, `550` and `553`.
pub fn classify(code: u16, msg: &str, path: &str) -> Error {
    let path = path.to_owned();
    let msg = msg.trim().to_owned();

    match code {
        421 => Error::IOError(io::Error::new(io::ErrorKind::ConnectionAborted, msg)),
        425 | 426 | 451 | 552 => Error::TransferIncomplete { path, msg },
        530 | 532 => Error::PermissionDenied { path, msg },
        521 => Error::AlreadyExists { path, msg },
        450 | 550 | 553 => {
            let lower = msg.to_ascii_lowercase();

            if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
                Error::PermissionDenied { path, msg }
            } else if lower.contains("already exist") || lower.contains("file exists") {
                Error::AlreadyExists { path, msg }
            } else {
                Error::NotFound { path, msg }
            }
        }
        code => Error::UnexpectedReply { code, msg },
    }
}

/// Decodes the byte stream of a control connection into [`Reply`]s.
///
/// A multiline reply starts with `xyz-` and ends with the first line
/// starting with `xyz `; lines in between are kept verbatim.
#[derive(Debug, Default)]
pub struct ReplyCodec(());

impl ReplyCodec {
    /// Create a codec.
    pub fn new() -> Self {
        Self(())
    }
}

impl Decoder for ReplyCodec {
    type Item = Reply;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, Error> {
        let mut offset = 0;
        let mut code = None;
        let mut lines = Vec::new();

        loop {
            let end = match src[offset..].iter().position(|byte| *byte == b'\n') {
                Some(pos) => offset + pos,
                None => {
                    if src.len() > MAX_REPLY_LEN {
                        return Err(Error::InvalidResponse(&"reply exceeds the maximum length"));
                    }
                    return Ok(None);
                }
            };

            let line = &src[offset..end];
            let line = line.strip_suffix(&b"\r"[..]).unwrap_or(line);
            offset = end + 1;

            match code {
                None => {
                    let first = parse_code(line)
                        .ok_or(Error::InvalidResponse(&"reply does not start with a code"))?;
                    lines.push(text_of(line));
                    code = Some(first);

                    if line.get(3) != Some(&b'-') {
                        break;
                    }
                }
                Some(first) => {
                    if parse_code(line) == Some(first) && line.get(3) != Some(&b'-') {
                        lines.push(text_of(line));
                        break;
                    }
                    lines.push(String::from_utf8_lossy(line).into_owned());
                }
            }
        }

        let _ = src.split_to(offset);

        Ok(code.map(|code| Reply { code, lines }))
    }
}

fn text_of(line: &[u8]) -> String {
    String::from_utf8_lossy(line.get(4..).unwrap_or_default()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfer_error::ErrorKind;

    use pretty_assertions::assert_eq;

    fn decode_all(input: &[u8]) -> (Vec<Reply>, BytesMut) {
        let mut codec = ReplyCodec::new();
        let mut buffer = BytesMut::from(input);
        let mut replies = Vec::new();

        while let Some(reply) = codec.decode(&mut buffer).unwrap() {
            replies.push(reply);
        }

        (replies, buffer)
    }

    #[test]
    fn single_line_replies() {
        let (replies, rest) = decode_all(b"220 ready\r\n331 Password required\r\n230");

        assert_eq!(
            replies,
            vec![Reply::new(220, "ready"), Reply::new(331, "Password required")]
        );
        assert_eq!(&rest[..], b"230");
    }

    #[test]
    fn multiline_reply() {
        let (replies, rest) = decode_all(b"211-Features:\r\n MDTM\r\n SIZE\r\n211 End\r\n");

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].code(), 211);
        assert_eq!(replies[0].lines(), &["Features:", " MDTM", " SIZE", "End"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn multiline_reply_waits_for_terminator() {
        let (replies, rest) = decode_all(b"211-Features:\r\n MDTM\r\n");

        assert!(replies.is_empty());
        assert_eq!(rest.len(), 22);
    }

    #[test]
    fn garbage_is_rejected() {
        let mut buffer = BytesMut::from(&b"hello\r\n"[..]);
        let err = ReplyCodec::new().decode(&mut buffer).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn parse_line_strips_code() {
        let reply = Reply::parse_line("550 No such file or directory\r\n").unwrap();

        assert_eq!(reply.code(), 550);
        assert_eq!(reply.text(), "No such file or directory");
        assert!(Reply::parse_line("Expected code").is_none());
    }

    #[test]
    fn classify_reply_codes() {
        let kind = |code, msg| classify(code, msg, "/x").kind();

        assert_eq!(kind(550, "No such file or directory"), ErrorKind::NotFound);
        assert_eq!(kind(550, "Permission denied"), ErrorKind::PermissionDenied);
        assert_eq!(kind(550, "File exists"), ErrorKind::AlreadyExists);
        assert_eq!(kind(550, "Directory does not exist"), ErrorKind::NotFound);
        assert_eq!(kind(550, "Directory already exists"), ErrorKind::AlreadyExists);
        assert_eq!(kind(550, "Can't check for file existence"), ErrorKind::NotFound);
        assert_eq!(kind(550, "File doesn't exist"), ErrorKind::NotFound);
        assert_eq!(kind(553, "Could not create file."), ErrorKind::NotFound);
        assert_eq!(kind(530, "Login incorrect."), ErrorKind::PermissionDenied);
        assert_eq!(kind(426, "Connection closed; transfer aborted."), ErrorKind::TransferIncomplete);
        assert_eq!(kind(421, "Timeout."), ErrorKind::Connection);
        assert_eq!(kind(502, "Command not implemented."), ErrorKind::Protocol);
    }
}
