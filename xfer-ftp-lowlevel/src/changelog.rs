#[allow(unused_imports)]
use crate::*;

#[doc(hidden)]
pub mod unreleased {}

/// This is the first release!
///
/// ## Added
///  - [`ControlChannel`] with passive (`PASV`/`EPSV`) and active
///    (`PORT`/`EPRT`) data connections
///  - [`ReplyCodec`] decoding single and multiline replies
///  - [`classify`] mapping reply codes to [`ErrorKind`]
///  - [`parse_modification_time`] for `MDTM` replies
pub mod v0_1_0 {}
