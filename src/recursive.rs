use super::{path::local_ancestors, AncestorSource, Error, ErrorKind, RemotePath};

use std::path::Path;

/// The two primitives the recursive upload is built from.
pub(crate) trait DirectoryCreator {
    fn try_upload(&mut self, local: &Path, remote: &str) -> Result<(), Error>;

    fn try_create_dir(&mut self, path: &str) -> Result<(), Error>;
}

/// Errors that creating directories cannot fix.
fn is_fatal(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Connection | ErrorKind::LocalIo)
}

/// Upload `local` to `remote`; if that fails, create the ancestor
/// directories root first and upload once more.
///
/// At most two uploads are attempted and nothing created is removed
/// again.
pub(crate) fn upload_recursive<C>(
    client: &mut C,
    local: &Path,
    remote: &str,
    ancestor_source: AncestorSource,
) -> Result<(), Error>
where
    C: DirectoryCreator + ?Sized,
{
    let err = match client.try_upload(local, remote) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if is_fatal(err.kind()) {
        return Err(err);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(remote, error = %err, "upload failed, creating ancestor directories");

    let ancestors = match ancestor_source {
        AncestorSource::Remote => RemotePath::new(remote).ancestors().collect(),
        AncestorSource::Local => local_ancestors(local),
    };

    for dir in ancestors.into_iter().rev() {
        match client.try_create_dir(&dir) {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!(path = %dir, "created remote directory");
            }
            #[cfg(feature = "tracing")]
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                tracing::warn!(path = %dir, error = %err, "permission denied creating remote directory");
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(path = %dir, error = %_err, "skipped remote directory");
            }
        }
    }

    client.try_upload(local, remote)
}
