//! Raw IPv4 capture socket.
//!
//! Unix raw sockets only deliver the protocol they were opened for, so capture
//! is limited to ICMP there. Windows offers `SIO_RCVALL`, which widens a single
//! socket to every IP protocol seen by the bound interface; it is switched on
//! at open and back off when the socket is dropped.

use crate::config::CaptureConfig;
use crate::error::CaptureError;

use log::{debug, info, warn};
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything the capture loop can pull whole datagrams from.
pub trait DatagramSource {
    /// Blocks until one datagram is copied into `buf` and returns its length.
    /// An operator stop is reported as `io::ErrorKind::Interrupted`.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// What the platform's raw sockets can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Every IP protocol, toggled with a promiscuous-capture control.
    ReceiveAll,
    /// Only the protocol the socket was created for.
    ProtocolOnly,
}

impl Capability {
    pub fn detect() -> Capability {
        sys::CAPABILITY
    }

    pub fn has_promiscuous_control(self) -> bool {
        self == Capability::ReceiveAll
    }
}

pub struct CaptureSocket {
    socket: Arc<sys::Socket>,
    bind_address: Ipv4Addr,
    capability: Capability,
    promiscuous: bool,
    stop_requested: Arc<AtomicBool>,
}

impl CaptureSocket {

    /// Opens a raw socket bound to `config.bind_address` that receives
    /// datagrams with their IP header.
    pub fn open(config: &CaptureConfig) -> Result<CaptureSocket, CaptureError> {
        let capability = Capability::detect();
        let socket = sys::Socket::raw(sys::CAPTURE_PROTOCOL).map_err(CaptureError::from_create)?;

        socket
            .bind(config.bind_address)
            .map_err(|e| CaptureError::setup("bind", e))?;
        socket
            .set_header_included()
            .map_err(|e| CaptureError::setup("IP_HDRINCL", e))?;

        let mut capture_socket = CaptureSocket {
            socket: Arc::new(socket),
            bind_address: config.bind_address,
            capability,
            promiscuous: false,
            stop_requested: Arc::new(AtomicBool::new(false)),
        };

        if capability.has_promiscuous_control() {
            capture_socket
                .socket
                .set_receive_all(true)
                .map_err(|e| CaptureError::setup("SIO_RCVALL", e))?;
            capture_socket.promiscuous = true;
            info!("Promiscuous capture enabled on {}", config.bind_address);
        } else {
            info!("Promiscuous capture not available on this platform, capturing ICMP only");
        }

        if config.filters.is_customized() {
            debug!("Capture filters are recorded but not applied: {:?}", config.filters);
        }

        info!("Raw socket bound to {}", config.bind_address);
        Ok(capture_socket)
    }

    pub fn bind_address(&self) -> Ipv4Addr {
        self.bind_address
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn is_promiscuous(&self) -> bool {
        self.promiscuous
    }

    /// Handle for stopping a capture from another thread, e.g. a signal handler.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            requested: Arc::clone(&self.stop_requested),
            socket: Arc::clone(&self.socket),
        }
    }

}

fn stopped() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "capture stopped")
}

/// Maps a raw receive result to what the capture loop sees. Only a requested
/// stop is reported as `Interrupted`; a signal interrupting the receive
/// otherwise counts as a receive failure.
fn settle_receive(result: io::Result<usize>, stop_requested: bool) -> io::Result<usize> {
    // the receive side is shut down on stop, so whatever came back is moot
    if stop_requested {
        return Err(stopped());
    }
    match result {
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(io::Error::other(format!(
            "receive interrupted without a stop request: {}",
            e
        ))),
        other => other,
    }
}

impl DatagramSource for CaptureSocket {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(stopped());
        }
        let result = self.socket.recv(buf);
        settle_receive(result, self.stop_requested.load(Ordering::SeqCst))
    }
}

impl Drop for CaptureSocket {
    fn drop(&mut self) {
        if self.promiscuous {
            match self.socket.set_receive_all(false) {
                Ok(()) => info!("Promiscuous capture disabled on {}", self.bind_address),
                Err(e) => warn!("Failed to disable promiscuous capture: {}", e),
            }
            self.promiscuous = false;
        }
    }
}

#[derive(Clone)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    socket: Arc<sys::Socket>,
}

impl StopHandle {

    /// Requests the capture to stop and wakes a receive blocked on the socket.
    pub fn stop(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        // unconnected sockets report ENOTCONN but are still shut down
        if let Err(e) = self.socket.shutdown_read() {
            debug!("shutdown of capture socket: {}", e);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
mod sys {
    use super::Capability;
    use std::io;
    use std::mem;
    use std::net::Ipv4Addr;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    pub const CAPABILITY: Capability = Capability::ProtocolOnly;
    pub const CAPTURE_PROTOCOL: libc::c_int = libc::IPPROTO_ICMP;

    pub struct Socket(OwnedFd);

    fn check(ret: libc::c_int) -> io::Result<()> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    impl Socket {
        pub fn raw(protocol: libc::c_int) -> io::Result<Socket> {
            let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, protocol) };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(Socket(unsafe { OwnedFd::from_raw_fd(fd) }))
        }

        pub fn bind(&self, address: Ipv4Addr) -> io::Result<()> {
            let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = 0;
            // s_addr is kept in network byte order
            sin.sin_addr = libc::in_addr { s_addr: u32::from_ne_bytes(address.octets()) };
            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd"
            ))]
            {
                sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
            }

            check(unsafe {
                libc::bind(
                    self.0.as_raw_fd(),
                    &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            })
        }

        pub fn set_header_included(&self) -> io::Result<()> {
            let on: libc::c_int = 1;
            check(unsafe {
                libc::setsockopt(
                    self.0.as_raw_fd(),
                    libc::IPPROTO_IP,
                    libc::IP_HDRINCL,
                    &on as *const libc::c_int as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            })
        }

        pub fn set_receive_all(&self, _on: bool) -> io::Result<()> {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "promiscuous capture control is not available on raw IP sockets here",
            ))
        }

        pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let n = unsafe {
                libc::recv(
                    self.0.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }

        pub fn shutdown_read(&self) -> io::Result<()> {
            check(unsafe { libc::shutdown(self.0.as_raw_fd(), libc::SHUT_RD) })
        }
    }
}

#[cfg(windows)]
mod sys {
    use super::Capability;
    use std::ffi::c_void;
    use std::io;
    use std::mem;
    use std::net::Ipv4Addr;
    use std::os::windows::io::{AsRawSocket, FromRawSocket, OwnedSocket, RawSocket};
    use std::ptr;
    use std::sync::OnceLock;

    pub const CAPABILITY: Capability = Capability::ReceiveAll;
    pub const CAPTURE_PROTOCOL: i32 = IPPROTO_IP;

    #[allow(non_camel_case_types)]
    type SOCKET = usize;

    const INVALID_SOCKET: SOCKET = !0;
    const SOCKET_ERROR: i32 = -1;
    const AF_INET: i32 = 2;
    const SOCK_RAW: i32 = 3;
    const IPPROTO_IP: i32 = 0;
    const IP_HDRINCL: i32 = 2;
    const SIO_RCVALL: u32 = 0x9800_0001;
    const RCVALL_ON: u32 = 1;
    const RCVALL_OFF: u32 = 0;
    const SD_RECEIVE: i32 = 0;

    #[repr(C)]
    struct SockAddrIn {
        sin_family: u16,
        sin_port: u16,
        sin_addr: u32,
        sin_zero: [u8; 8],
    }

    #[link(name = "ws2_32")]
    unsafe extern "system" {
        fn WSAStartup(version: u16, data: *mut u8) -> i32;
        fn WSAGetLastError() -> i32;
        fn socket(af: i32, kind: i32, protocol: i32) -> SOCKET;
        fn bind(s: SOCKET, name: *const SockAddrIn, namelen: i32) -> i32;
        fn setsockopt(s: SOCKET, level: i32, optname: i32, optval: *const u8, optlen: i32) -> i32;
        fn WSAIoctl(
            s: SOCKET,
            code: u32,
            in_buf: *const c_void,
            in_len: u32,
            out_buf: *mut c_void,
            out_len: u32,
            returned: *mut u32,
            overlapped: *mut c_void,
            completion: *const c_void,
        ) -> i32;
        fn recv(s: SOCKET, buf: *mut u8, len: i32, flags: i32) -> i32;
        fn shutdown(s: SOCKET, how: i32) -> i32;
    }

    fn last_error() -> io::Error {
        io::Error::from_raw_os_error(unsafe { WSAGetLastError() })
    }

    fn check(ret: i32) -> io::Result<()> {
        if ret == SOCKET_ERROR {
            Err(last_error())
        } else {
            Ok(())
        }
    }

    static STARTUP_RESULT: OnceLock<i32> = OnceLock::new();

    fn startup() -> io::Result<()> {
        let result = *STARTUP_RESULT.get_or_init(|| {
            // large enough for WSADATA on both 32 and 64 bit
            let mut data = [0u8; 512];
            unsafe { WSAStartup(0x0202, data.as_mut_ptr()) }
        });
        if result != 0 {
            return Err(io::Error::from_raw_os_error(result));
        }
        Ok(())
    }

    pub struct Socket(OwnedSocket);

    impl Socket {
        fn handle(&self) -> SOCKET {
            self.0.as_raw_socket() as SOCKET
        }

        pub fn raw(protocol: i32) -> io::Result<Socket> {
            startup()?;
            let s = unsafe { socket(AF_INET, SOCK_RAW, protocol) };
            if s == INVALID_SOCKET {
                return Err(last_error());
            }
            Ok(Socket(unsafe { OwnedSocket::from_raw_socket(s as RawSocket) }))
        }

        pub fn bind(&self, address: Ipv4Addr) -> io::Result<()> {
            let sin = SockAddrIn {
                sin_family: AF_INET as u16,
                sin_port: 0,
                sin_addr: u32::from_ne_bytes(address.octets()),
                sin_zero: [0; 8],
            };
            check(unsafe { bind(self.handle(), &sin, mem::size_of::<SockAddrIn>() as i32) })
        }

        pub fn set_header_included(&self) -> io::Result<()> {
            let on: u32 = 1;
            check(unsafe {
                setsockopt(
                    self.handle(),
                    IPPROTO_IP,
                    IP_HDRINCL,
                    &on as *const u32 as *const u8,
                    mem::size_of::<u32>() as i32,
                )
            })
        }

        pub fn set_receive_all(&self, on: bool) -> io::Result<()> {
            let option: u32 = if on { RCVALL_ON } else { RCVALL_OFF };
            let mut returned: u32 = 0;
            check(unsafe {
                WSAIoctl(
                    self.handle(),
                    SIO_RCVALL,
                    &option as *const u32 as *const c_void,
                    mem::size_of::<u32>() as u32,
                    ptr::null_mut(),
                    0,
                    &mut returned,
                    ptr::null_mut(),
                    ptr::null(),
                )
            })
        }

        pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(i32::MAX as usize) as i32;
            let n = unsafe { recv(self.handle(), buf.as_mut_ptr(), len, 0) };
            if n == SOCKET_ERROR {
                Err(last_error())
            } else {
                Ok(n as usize)
            }
        }

        pub fn shutdown_read(&self) -> io::Result<()> {
            check(unsafe { shutdown(self.handle(), SD_RECEIVE) })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_startup_outcome_is_remembered() {
            let first = startup().map_err(|e| e.raw_os_error());
            let second = startup().map_err(|e| e.raw_os_error());
            assert_eq!(first, second);
            assert_eq!(STARTUP_RESULT.get().copied().map(|r| r == 0), Some(first.is_ok()));
        }
    }
}
