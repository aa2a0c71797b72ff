#[allow(unused_imports)]
use crate::*;

#[doc(hidden)]
pub mod unreleased {}

/// This is the first release!
///
/// ## Added
///  - [`TransferClient`] with [`FtpClient`], [`SftpClient`] and
///    [`RawFtpClient`] as backends
///  - [`TransferOptions`], which can also be deserialized with serde
///  - [`connect`], [`with_client`] and [`with_session`]
///  - [`TransferClient::upload_recursive`], creating missing ancestors
///    taken from [`AncestorSource`]
///  - [`RawFtpClient::set_passive`] to switch data connection modes
///    mid-session
pub mod v0_1_0 {}
