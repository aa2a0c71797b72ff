//! These tests need an SSH server and are ignored by default.
//!
//! Run them with `cargo test --test sftp -- --ignored` after setting
//! `XFER_SFTP_HOST`, `XFER_SFTP_USER` and `XFER_SFTP_PASSWORD`.
//! `XFER_SFTP_PORT` defaults to 22 and `XFER_SFTP_DIR`, a writable
//! directory on the server, to `/tmp`.

mod common;
use common::*;

use xfer_client::*;

use std::env;
use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use xfer_test_common::tempdir;

use pretty_assertions::assert_eq;

fn options() -> TransferOptions {
    let var = |name: &str| env::var(name).unwrap_or_else(|_| panic!("{name} is not set"));

    let mut options = TransferOptions::new(Protocol::Sftp, var("XFER_SFTP_HOST"))
        .credentials(var("XFER_SFTP_USER"), var("XFER_SFTP_PASSWORD"));
    if let Ok(port) = env::var("XFER_SFTP_PORT") {
        options = options.port(port.parse().unwrap());
    }
    options
}

/// A directory on the server no other test run uses.
fn unique_dir(func: &str) -> String {
    let base = env::var("XFER_SFTP_DIR").unwrap_or_else(|_| "/tmp".to_owned());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();

    format!("{}/xfer-client-{func}-{nanos}", base.trim_end_matches('/'))
}

#[test]
#[ignore]
fn recursive_upload_and_download() {
    let local = tempdir();
    let dir = unique_dir("recursive");

    let data = content(70_000);
    let source = write_local(local.path(), "data.bin", &data);
    let target = local.path().join("back.bin");
    let remote = format!("{dir}/a/b/data.bin");

    let mut client = SftpClient::connect(&options()).unwrap();
    let before = SystemTime::now();

    client.upload_recursive(&source, &remote).unwrap();
    assert_eq!(client.size(&remote).unwrap(), 70_000);
    assert!(client.modified(&remote).unwrap() + Duration::from_secs(1) >= before);

    client.download(&remote, &target).unwrap();
    assert_eq!(fs::read(&target).unwrap(), data);

    let entries = client.list(Some(&format!("{dir}/a/b"))).unwrap();
    let entry = entries.iter().find(|entry| entry.name() == "data.bin").unwrap();
    assert_eq!(entry.entry_type(), Some(EntryType::File));

    client.close().unwrap();
}

#[test]
#[ignore]
fn working_directory() {
    let local = tempdir();
    let dir = unique_dir("cwd");
    let source = write_local(local.path(), "f.txt", b"f");

    let mut client = SftpClient::connect(&options()).unwrap();
    let home = client.current_dir().unwrap();
    assert!(home.is_absolute());

    client
        .upload_recursive(&source, &format!("{dir}/f.txt"))
        .unwrap();

    client.change_dir(&dir).unwrap();
    assert_eq!(client.current_dir().unwrap(), dir.as_str());
    assert_eq!(client.size("f.txt").unwrap(), 1);

    let err = client.change_dir("f.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = client.change_dir("missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(client.current_dir().unwrap(), dir.as_str());
}

#[test]
#[ignore]
fn errors() {
    let local = tempdir();
    let dir = unique_dir("errors");
    let source = write_local(local.path(), "f.txt", b"f");

    let mut client = SftpClient::connect(&options()).unwrap();

    let err = client
        .upload(&source, &format!("{dir}/missing/f.txt"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = client.size(&format!("{dir}/missing")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    client.close().unwrap();
    assert_eq!(client.size("f.txt").unwrap_err().kind(), ErrorKind::Connection);
}

#[test]
#[ignore]
fn bad_password() {
    let options = options().credentials(
        env::var("XFER_SFTP_USER").unwrap(),
        "definitely not the password",
    );

    let err = SftpClient::connect(&options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
