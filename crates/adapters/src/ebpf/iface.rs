//! Low-level interface plumbing: ifindex lookup and promiscuous mode.

use std::ffi::CString;
use std::io;

use domain::common::error::CoreError;
use tracing::warn;

/// Resolve an interface name to its kernel ifindex.
pub fn resolve_ifindex(name: &str) -> Result<u32, CoreError> {
    let c_name = CString::new(name)
        .map_err(|_| CoreError::InvalidArgument(format!("interface name '{name}'")))?;
    // SAFETY: if_nametoindex reads a NUL-terminated string and returns 0 on error.
    let idx = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if idx == 0 {
        return Err(CoreError::NotFound(format!("interface '{name}'")));
    }
    Ok(idx)
}

/// Toggle IFF_PROMISC on an interface via SIOCGIFFLAGS/SIOCSIFFLAGS.
///
/// Failures are logged, not fatal: a missing promisc bit degrades the
/// service (frames for foreign MACs are dropped by the NIC) but does not
/// invalidate the map state.
pub fn set_promiscuous(name: &str, enable: bool) {
    if let Err(e) = try_set_promiscuous(name, enable) {
        warn!(interface = name, enable, error = %e, "failed to toggle promiscuous mode");
    }
}

fn try_set_promiscuous(name: &str, enable: bool) -> io::Result<()> {
    let c_name = CString::new(name).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

    // SAFETY: a plain AF_INET datagram socket used only as an ioctl handle.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let result = (|| {
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let name_bytes = c_name.as_bytes_with_nul();
        if name_bytes.len() > ifr.ifr_name.len() {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        for (dst, &src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
            *dst = src as libc::c_char;
        }

        // SAFETY: ifr is a properly initialized ifreq for both ioctls.
        unsafe {
            if libc::ioctl(fd, libc::SIOCGIFFLAGS, &mut ifr) < 0 {
                return Err(io::Error::last_os_error());
            }
            if enable {
                ifr.ifr_ifru.ifru_flags |= libc::IFF_PROMISC as libc::c_short;
            } else {
                ifr.ifr_ifru.ifru_flags &= !(libc::IFF_PROMISC as libc::c_short);
            }
            if libc::ioctl(fd, libc::SIOCSIFFLAGS, &ifr) < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    })();

    // SAFETY: fd was opened above and is not used after this point.
    unsafe { libc::close(fd) };
    result
}

/// Kernel program and map operations require CAP_BPF/CAP_NET_ADMIN; surface
/// a distinct error instead of a confusing syscall failure.
pub fn ensure_privileged(op: &str) -> Result<(), CoreError> {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } != 0 {
        return Err(CoreError::PermissionDenied(format!(
            "'{op}' requires root (CAP_BPF + CAP_NET_ADMIN)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_resolves() {
        // "lo" exists on any Linux test host.
        assert!(resolve_ifindex("lo").unwrap() > 0);
    }

    #[test]
    fn missing_interface_is_not_found() {
        assert!(matches!(
            resolve_ifindex("edgemark-does-not-exist0"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn embedded_nul_is_invalid() {
        assert!(matches!(
            resolve_ifindex("eth\00"),
            Err(CoreError::InvalidArgument(_))
        ));
    }
}
