#![allow(dead_code)]

use xfer_client::{DirectoryEntry, Protocol, TransferOptions};

use std::fs;
use std::path::{Path, PathBuf};

use xfer_test_common::{FtpServer, PASSWORD, USER};

/// Backends that can be tested against [`FtpServer`].
pub const FTP_PROTOCOLS: [Protocol; 2] = [Protocol::Ftp, Protocol::RawFtp];

pub fn options(server: &FtpServer, protocol: Protocol) -> TransferOptions {
    let addr = server.addr();

    TransferOptions::new(protocol, addr.ip().to_string())
        .port(addr.port())
        .credentials(USER, PASSWORD)
}

/// Deterministic content that is not all the same byte.
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn write_local(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn names(entries: &[DirectoryEntry]) -> Vec<&str> {
    let mut names: Vec<_> = entries.iter().map(DirectoryEntry::name).collect();
    names.sort_unstable();
    names
}
