//! Linux TUN device access.
//!
//! A [`TunDevice`] attaches to a pre-existing kernel TUN interface by name
//! and exposes whole-packet reads and writes over the device fd. The
//! interface itself must already have been created and administered by the
//! host's network manager; wallhack only attaches to it.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use tokio::io::unix::AsyncFd;

use crate::error::TransportError;

/// Maximum length of a kernel interface name in bytes.
pub const IFACE_NAME_MAX: usize = 16;

const TUN_PATH: &[u8] = b"/dev/net/tun\0";
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const SIOCGIFMTU: libc::c_ulong = 0x8921;

/// Request a TUN device (layer 3, not TAP).
const IFF_TUN: u16 = 0x0001;
/// No packet-info prefix on reads and writes.
const IFF_NO_PI: u16 = 0x1000;

/// ioctl request payload: zero-padded interface name followed by the union
/// the kernel interprets per request (flags for TUNSETIFF, mtu for
/// SIOCGIFMTU). Padded out to the full kernel `struct ifreq` size.
#[repr(C)]
struct IfReq {
    name: [u8; IFACE_NAME_MAX],
    flags: u16,
    _pad: [u8; 22],
}

#[repr(C)]
struct IfReqMtu {
    name: [u8; IFACE_NAME_MAX],
    mtu: libc::c_int,
    _pad: [u8; 20],
}

fn iface_name(name: &str) -> Result<[u8; IFACE_NAME_MAX], TransportError> {
    let bytes = name.as_bytes();
    if bytes.len() > IFACE_NAME_MAX {
        return Err(TransportError::IfaceName(bytes.len()));
    }
    let mut padded = [0u8; IFACE_NAME_MAX];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

/// Handle for an attached kernel TUN interface.
///
/// Reads and writes go directly to the device fd and carry exactly one IP
/// packet each. The fd is registered with the tokio reactor, so a reader and
/// a writer may use the handle concurrently; the kernel permits this for TUN
/// fds. Dropping the handle closes the fd and detaches from the interface.
pub struct TunDevice {
    fd: AsyncFd<OwnedFd>,
    name: String,
}

impl TunDevice {
    /// Attaches to the TUN interface named `name`.
    ///
    /// Names longer than [`IFACE_NAME_MAX`] bytes are rejected before
    /// anything is opened. The attach fails if the interface does not exist or the
    /// process lacks the privileges to claim it.
    pub fn attach(name: &str) -> Result<Self, TransportError> {
        let padded = iface_name(name)?;

        let raw = unsafe {
            libc::open(
                TUN_PATH.as_ptr().cast(),
                libc::O_RDWR | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if raw < 0 {
            return Err(TransportError::TunAttach(std::io::Error::last_os_error()));
        }
        // Owns the fd from here on; early returns close it.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut request = IfReq {
            name: padded,
            flags: IFF_TUN | IFF_NO_PI,
            _pad: [0u8; 22],
        };
        let rc = unsafe { libc::ioctl(fd.as_raw_fd(), TUNSETIFF as _, &mut request) };
        if rc < 0 {
            return Err(TransportError::TunAttach(std::io::Error::last_os_error()));
        }

        let fd = AsyncFd::new(fd).map_err(TransportError::TunAttach)?;

        Ok(Self {
            fd,
            name: name.to_owned(),
        })
    }

    /// Name of the attached interface.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queries the interface's current MTU from the kernel.
    ///
    /// Fails if the interface can no longer be resolved, meaning it was
    /// removed underneath us.
    pub fn mtu(&self) -> std::io::Result<usize> {
        let mut request = IfReqMtu {
            // Attach validated the length, so this cannot fail here.
            name: iface_name(&self.name)
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?,
            mtu: 0,
            _pad: [0u8; 20],
        };

        let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
        if sock < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let sock = unsafe { OwnedFd::from_raw_fd(sock) };

        let rc = unsafe { libc::ioctl(sock.as_raw_fd(), SIOCGIFMTU as _, &mut request) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }

        Ok(request.mtu as usize)
    }

    /// Receives one packet from the device into `buf`.
    pub async fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            let result = guard.try_io(|inner| {
                let count = unsafe {
                    libc::read(
                        inner.get_ref().as_raw_fd(),
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                    )
                };
                if count < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(count as usize)
                }
            });
            match result {
                Ok(outcome) => return outcome,
                Err(_would_block) => continue,
            }
        }
    }

    /// Writes one packet to the device. The kernel consumes TUN writes
    /// whole, so a short write is a device error.
    pub async fn send(&self, buf: &[u8]) -> std::io::Result<()> {
        loop {
            let mut guard = self.fd.writable().await?;
            let result = guard.try_io(|inner| {
                let count = unsafe {
                    libc::write(inner.get_ref().as_raw_fd(), buf.as_ptr().cast(), buf.len())
                };
                if count < 0 {
                    Err(std::io::Error::last_os_error())
                } else {
                    Ok(count as usize)
                }
            });
            match result {
                Ok(outcome) => {
                    let written = outcome?;
                    if written != buf.len() {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::WriteZero,
                            "tun accepted a partial packet",
                        ));
                    }
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlong_name_without_opening() {
        let name = "interface-name-is-way-too-long";
        assert!(matches!(
            TunDevice::attach(name),
            Err(TransportError::IfaceName(len)) if len == name.len()
        ));
    }

    #[test]
    fn name_is_zero_padded() {
        let padded = iface_name("wallhack").unwrap();
        assert_eq!(&padded[..8], b"wallhack");
        assert!(padded[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn exact_max_length_name_is_accepted() {
        let name = "a".repeat(IFACE_NAME_MAX);
        assert!(iface_name(&name).is_ok());
        let name = "a".repeat(IFACE_NAME_MAX + 1);
        assert!(iface_name(&name).is_err());
    }

    #[test]
    fn ifreq_matches_kernel_layout() {
        assert_eq!(std::mem::size_of::<IfReq>(), 40);
        assert_eq!(std::mem::size_of::<IfReqMtu>(), 40);
        assert_eq!(std::mem::offset_of!(IfReq, flags), IFACE_NAME_MAX);
        assert_eq!(std::mem::offset_of!(IfReqMtu, mtu), IFACE_NAME_MAX);
    }
}
