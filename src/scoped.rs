use super::{connect, AnyClient, Error, TransferClient, TransferOptions};

use scopeguard::ScopeGuard;

/// Run `f` with `client` and close the session afterwards, even if `f`
/// fails or panics.
///
/// If `f` already closed the session this is not an error. If both `f`
/// and closing fail, the error of `f` is returned with the close error
/// attached, see [`Error::RecursiveErrors`].
pub fn with_session<C, T, F>(client: C, f: F) -> Result<T, Error>
where
    C: TransferClient,
    F: FnOnce(&mut C) -> Result<T, Error>,
{
    // Only runs if `f` unwinds.
    let mut guard = scopeguard::guard(client, |mut client| {
        let _res = client.close();

        #[cfg(feature = "tracing")]
        if let Err(err) = _res {
            tracing::debug!(error = %err, "failed to close session while unwinding");
        }
    });

    let res = f(&mut *guard);

    let mut client = ScopeGuard::into_inner(guard);
    let closed = match client.close() {
        Err(Error::SessionClosed) => Ok(()),
        closed => closed,
    };

    match (res, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
        (Err(original_error), Err(occuring_error)) => {
            Err(original_error.error_on_cleanup(occuring_error))
        }
    }
}

/// [`connect`] with `options` and run `f` as [`with_session`] does.
///
/// ```no_run
/// use std::path::Path;
/// use xfer_client::{with_client, Protocol, TransferClient, TransferOptions};
///
/// let options = TransferOptions::new(Protocol::Sftp, "sftp.example.com")
///     .credentials("user", "password");
///
/// with_client(&options, |client| {
///     client.upload_recursive(Path::new("report.csv"), "/exports/2024/01/report.csv")
/// })?;
/// # Ok::<(), xfer_client::Error>(())
/// ```
pub fn with_client<T, F>(options: &TransferOptions, f: F) -> Result<T, Error>
where
    F: FnOnce(&mut AnyClient) -> Result<T, Error>,
{
    with_session(connect(options)?, f)
}
