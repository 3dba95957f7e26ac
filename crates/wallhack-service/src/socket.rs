//! Socket-activation listener takeover.

use std::os::fd::{FromRawFd, RawFd};

use crate::ServiceError;

const LISTEN_PID_ENV: &str = "LISTEN_PID";
const LISTEN_FDS_ENV: &str = "LISTEN_FDS";
const LISTEN_FDNAMES_ENV: &str = "LISTEN_FDNAMES";

/// First inherited fd after stdio.
const LISTEN_FDS_START: RawFd = 3;

/// Takes over the TCP listeners passed by the supervisor, if any.
///
/// The activation environment is consumed either way so child processes do
/// not inherit stale fd announcements. Fds addressed to a different pid are
/// ignored.
pub(crate) fn take_activation_listeners() -> Result<Vec<std::net::TcpListener>, ServiceError> {
    let pid = std::env::var(LISTEN_PID_ENV);
    let fds = std::env::var(LISTEN_FDS_ENV);
    std::env::remove_var(LISTEN_PID_ENV);
    std::env::remove_var(LISTEN_FDS_ENV);
    std::env::remove_var(LISTEN_FDNAMES_ENV);

    let (Ok(pid), Ok(fds)) = (pid, fds) else {
        return Ok(Vec::new());
    };

    if pid.parse::<u32>() != Ok(std::process::id()) {
        return Ok(Vec::new());
    }

    let count: usize = fds
        .parse()
        .map_err(|_| ServiceError::Activation(format!("bad {LISTEN_FDS_ENV} value: {fds}")))?;

    let mut listeners = Vec::with_capacity(count);
    for index in 0..count {
        let fd = LISTEN_FDS_START + index as RawFd;
        // The supervisor leaves the fds open across exec without CLOEXEC.
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        if rc < 0 {
            return Err(ServiceError::Activation(format!(
                "inherited fd {fd} is not usable: {}",
                std::io::Error::last_os_error()
            )));
        }
        listeners.push(unsafe { std::net::TcpListener::from_raw_fd(fd) });
    }

    Ok(listeners)
}
