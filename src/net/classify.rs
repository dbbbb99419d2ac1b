//! Accept error classification.
//!
//! An accept failure is either temporary (the listener is fine, the process
//! or the peer momentarily is not) or permanent (the listener is unusable).
//! Temporary failures are retried with backoff, permanent ones end the loop.

use std::io;

/// Whether an accept error is transient and worth retrying.
pub fn is_temporary(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::OutOfMemory => return true,
        _ => {}
    }

    match err.raw_os_error() {
        Some(code) => is_temporary_os_error(code),
        None => false,
    }
}

#[cfg(unix)]
fn is_temporary_os_error(code: i32) -> bool {
    // Descriptor and buffer exhaustion clear up once connections close.
    matches!(
        code,
        libc::EMFILE
            | libc::ENFILE
            | libc::ENOBUFS
            | libc::ENOMEM
            | libc::ECONNABORTED
            | libc::EAGAIN
            | libc::EINTR
            | libc::EPROTO
    )
}

#[cfg(not(unix))]
fn is_temporary_os_error(_code: i32) -> bool {
    false
}

/// Short label used in logs and metrics.
pub fn error_class(err: &io::Error) -> &'static str {
    if is_temporary(err) {
        "temporary"
    } else {
        "permanent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_are_temporary() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
            io::ErrorKind::WouldBlock,
            io::ErrorKind::TimedOut,
        ] {
            assert!(is_temporary(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[test]
    fn closed_listener_is_permanent() {
        let err = io::Error::new(io::ErrorKind::NotConnected, "listener closed");
        assert!(!is_temporary(&err));
        assert_eq!(error_class(&err), "permanent");

        assert!(!is_temporary(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(!is_temporary(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[cfg(unix)]
    #[test]
    fn descriptor_exhaustion_is_temporary() {
        assert!(is_temporary(&io::Error::from_raw_os_error(libc::EMFILE)));
        assert!(is_temporary(&io::Error::from_raw_os_error(libc::ENFILE)));
        assert!(is_temporary(&io::Error::from_raw_os_error(libc::ENOBUFS)));
        assert!(!is_temporary(&io::Error::from_raw_os_error(libc::EBADF)));
        assert!(!is_temporary(&io::Error::from_raw_os_error(libc::EINVAL)));
    }
}
