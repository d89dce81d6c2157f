//! UDP socket construction for measurement sessions.
//!
//! TWAMP test traffic carries operator-chosen TTL/hop-limit, TOS/traffic
//! class, and (IPv4) the DF bit, all of which must be set before the socket
//! is handed to tokio.

use std::net::SocketAddr;

use domain::common::error::CoreError;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    pub ttl: u8,
    pub tos: u8,
    pub do_not_fragment: bool,
}

/// Bind a UDP socket with session options applied, ready for tokio.
pub fn bind_udp(bind: SocketAddr, opts: SocketOptions) -> Result<UdpSocket, CoreError> {
    let domain = if bind.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(network)?;
    socket.set_reuse_address(true).map_err(network)?;

    if bind.is_ipv6() {
        socket
            .set_unicast_hops_v6(u32::from(opts.ttl))
            .map_err(network)?;
        socket.set_tclass_v6(u32::from(opts.tos)).map_err(network)?;
        // The DF bit is an IPv4 concept; v6 specs reject it upstream.
    } else {
        socket.set_ttl(u32::from(opts.ttl)).map_err(network)?;
        socket.set_tos(u32::from(opts.tos)).map_err(network)?;
        if opts.do_not_fragment {
            set_dont_fragment(&socket)?;
        }
    }

    socket.bind(&bind.into()).map_err(network)?;
    socket.set_nonblocking(true).map_err(network)?;

    UdpSocket::from_std(socket.into()).map_err(network)
}

/// Set IP_MTU_DISCOVER to IP_PMTUDISC_DO, which makes the kernel emit the
/// DF bit and fail sends that would need fragmentation.
#[cfg(target_os = "linux")]
fn set_dont_fragment(socket: &Socket) -> Result<(), CoreError> {
    use std::os::fd::AsRawFd;

    let value: libc::c_int = libc::IP_PMTUDISC_DO;
    // SAFETY: fd is a live socket; value points at a c_int for the whole call.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_MTU_DISCOVER,
            std::ptr::addr_of!(value).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(network(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_dont_fragment(_socket: &Socket) -> Result<(), CoreError> {
    Err(CoreError::Network(
        "do-not-fragment is only supported on Linux".to_string(),
    ))
}

fn network(e: impl std::fmt::Display) -> CoreError {
    CoreError::Network(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn opts() -> SocketOptions {
        SocketOptions {
            ttl: 64,
            tos: 0,
            do_not_fragment: false,
        }
    }

    #[tokio::test]
    async fn binds_ephemeral_v4_port() {
        let socket = bind_udp((Ipv4Addr::LOCALHOST, 0).into(), opts()).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn binds_ephemeral_v6_port() {
        let socket = bind_udp((Ipv6Addr::LOCALHOST, 0).into(), opts()).unwrap();
        assert!(socket.local_addr().unwrap().is_ipv6());
    }

    #[tokio::test]
    async fn ttl_and_tos_are_applied() {
        let mut options = opts();
        options.ttl = 12;
        options.tos = 0xB8; // ef
        let socket = bind_udp((Ipv4Addr::LOCALHOST, 0).into(), options).unwrap();
        assert_eq!(socket.ttl().unwrap(), 12);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dont_fragment_bind_succeeds_unprivileged() {
        let mut options = opts();
        options.do_not_fragment = true;
        assert!(bind_udp((Ipv4Addr::LOCALHOST, 0).into(), options).is_ok());
    }
}
