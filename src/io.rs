//! The router engine's only boundary onto the outside world: sending and
//! receiving raw Ethernet frames on named interfaces.
//!
//! `FrameIo` is the seam. `Router` depends only on the trait, so its
//! decision logic can be exercised with an in-memory fake; `RawSocketIo`
//! is the concrete adapter that talks to the kernel over `AF_PACKET`
//! sockets, one per attached interface (`spec.md` §1, §6).

use std::collections::HashMap;
use std::fs;
use std::io;

use crate::MacAddr;

/// A single captured frame together with the interface it arrived on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundFrame {
    /// The name of the interface the frame was captured on.
    pub interface: String,
    /// The raw bytes of the frame, starting at the Ethernet header.
    pub bytes: Vec<u8>,
}

/// The router core's I/O boundary: transmit a frame on a named interface,
/// and block for the next inbound frame on any attached interface.
///
/// Implementations are free to multiplex across interfaces however suits
/// the platform; the router never needs to know how.
pub trait FrameIo: Send + Sync {
    /// Transmit `frame` out of `interface` verbatim.
    fn send(&self, interface: &str, frame: &[u8]) -> io::Result<()>;

    /// Block until a frame arrives on any attached interface.
    fn recv(&self) -> io::Result<InboundFrame>;

    /// The hardware address of `interface`, discovered at attach time.
    fn mac_address(&self, interface: &str) -> Option<MacAddr>;
}

#[cfg(unix)]
mod raw {
    use super::*;
    use std::mem;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use std::sync::Mutex;

    const ETH_P_ALL: u16 = 0x0003;

    /// One `AF_PACKET`/`SOCK_RAW` socket, bound to a single interface, used
    /// for both capture and transmit on that interface.
    struct Interface {
        name: String,
        mac: MacAddr,
        socket: OwnedFd,
        index: libc::c_int,
    }

    /// A `FrameIo` backed by real Linux `AF_PACKET` sockets, one per
    /// attached interface.
    pub struct RawSocketIo {
        interfaces: Mutex<Vec<Interface>>,
    }

    impl RawSocketIo {
        /// Open a raw socket on each named interface and discover its MAC
        /// address from `/sys/class/net/<interface>/address`.
        pub fn attach(interface_names: &[&str]) -> io::Result<Self> {
            let mut interfaces = Vec::with_capacity(interface_names.len());
            for name in interface_names {
                interfaces.push(Self::attach_one(name)?);
            }
            Ok(RawSocketIo {
                interfaces: Mutex::new(interfaces),
            })
        }

        fn attach_one(name: &str) -> io::Result<Interface> {
            let mac = read_mac_address(name)?;
            let index = interface_index(name)?;

            // SAFETY: a plain three-argument socket(2) call; the returned
            // fd is immediately owned and never leaked.
            let raw_fd = unsafe {
                libc::socket(
                    libc::AF_PACKET,
                    libc::SOCK_RAW,
                    (ETH_P_ALL as u16).to_be() as libc::c_int,
                )
            };
            if raw_fd < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: raw_fd was just returned by socket(2) above and is
            // not otherwise owned.
            let socket = unsafe { OwnedFd::from_raw_fd(raw_fd) };

            let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as u16;
            addr.sll_protocol = (ETH_P_ALL as u16).to_be();
            addr.sll_ifindex = index;

            // SAFETY: addr is a validly initialized sockaddr_ll of the
            // advertised size, and socket.as_raw_fd() is the fd we just
            // opened.
            let result = unsafe {
                libc::bind(
                    socket.as_raw_fd(),
                    &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if result < 0 {
                return Err(io::Error::last_os_error());
            }

            Ok(Interface {
                name: name.to_string(),
                mac,
                socket,
                index,
            })
        }
    }

    impl FrameIo for RawSocketIo {
        fn send(&self, interface: &str, frame: &[u8]) -> io::Result<()> {
            let interfaces = self.interfaces.lock().unwrap();
            let iface = interfaces
                .iter()
                .find(|i| i.name == interface)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown interface"))?;

            let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as u16;
            addr.sll_protocol = (ETH_P_ALL as u16).to_be();
            addr.sll_ifindex = iface.index;
            addr.sll_halen = 6;

            // SAFETY: frame points to a live slice of frame.len() bytes
            // for the duration of the call, and addr is a validly
            // initialized sockaddr_ll of the advertised size.
            let sent = unsafe {
                libc::sendto(
                    iface.socket.as_raw_fd(),
                    frame.as_ptr() as *const libc::c_void,
                    frame.len(),
                    0,
                    &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                    mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if sent < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn recv(&self) -> io::Result<InboundFrame> {
            let fds: Vec<(String, RawFd)> = {
                let interfaces = self.interfaces.lock().unwrap();
                interfaces
                    .iter()
                    .map(|i| (i.name.clone(), i.socket.as_raw_fd()))
                    .collect()
            };

            let mut poll_fds: Vec<libc::pollfd> = fds
                .iter()
                .map(|(_, fd)| libc::pollfd {
                    fd: *fd,
                    events: libc::POLLIN,
                    revents: 0,
                })
                .collect();

            // SAFETY: poll_fds is a live, correctly-sized array of
            // pollfd for the duration of the call.
            let ready = unsafe { libc::poll(poll_fds.as_mut_ptr(), poll_fds.len() as libc::nfds_t, -1) };
            if ready < 0 {
                return Err(io::Error::last_os_error());
            }

            let (name, fd) = poll_fds
                .iter()
                .zip(fds.iter())
                .find(|(pfd, _)| pfd.revents & libc::POLLIN != 0)
                .map(|(_, (name, fd))| (name.clone(), *fd))
                .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no interface ready"))?;

            let mut buf = vec![0_u8; 65536];
            // SAFETY: buf is a live, correctly-sized buffer for the
            // duration of the call.
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            buf.truncate(n as usize);
            Ok(InboundFrame {
                interface: name,
                bytes: buf,
            })
        }

        fn mac_address(&self, interface: &str) -> Option<MacAddr> {
            self.interfaces
                .lock()
                .unwrap()
                .iter()
                .find(|i| i.name == interface)
                .map(|i| i.mac)
        }
    }

    fn interface_index(name: &str) -> io::Result<libc::c_int> {
        let c_name = std::ffi::CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name has an embedded NUL"))?;
        // SAFETY: c_name is a valid, NUL-terminated C string for the
        // duration of the call.
        let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if index == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(index as libc::c_int)
    }

    fn read_mac_address(interface: &str) -> io::Result<MacAddr> {
        let path = format!("/sys/class/net/{interface}/address");
        let contents = fs::read_to_string(&path)?;
        contents
            .trim()
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "malformed MAC address in sysfs"))
    }
}

#[cfg(unix)]
pub use raw::RawSocketIo;

/// An in-memory `FrameIo` for tests: frames queued for a given interface
/// are handed back by `send` to a companion queue, and `recv` draws from
/// a queue the test fills directly.
#[derive(Default)]
pub struct MockFrameIo {
    inbound: std::sync::Mutex<std::collections::VecDeque<InboundFrame>>,
    outbound: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
    macs: HashMap<String, MacAddr>,
}

impl MockFrameIo {
    /// Build a mock with the given interface-to-MAC assignments.
    pub fn new(macs: HashMap<String, MacAddr>) -> Self {
        MockFrameIo {
            inbound: std::sync::Mutex::new(std::collections::VecDeque::new()),
            outbound: std::sync::Mutex::new(Vec::new()),
            macs,
        }
    }

    /// Queue a frame to be returned by a future `recv`.
    pub fn push_inbound(&self, frame: InboundFrame) {
        self.inbound.lock().unwrap().push_back(frame);
    }

    /// Drain every frame captured by `send` so far.
    pub fn take_sent(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.outbound.lock().unwrap())
    }
}

impl FrameIo for MockFrameIo {
    fn send(&self, interface: &str, frame: &[u8]) -> io::Result<()> {
        self.outbound
            .lock()
            .unwrap()
            .push((interface.to_string(), frame.to_vec()));
        Ok(())
    }

    fn recv(&self) -> io::Result<InboundFrame> {
        self.inbound
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no frame queued"))
    }

    fn mac_address(&self, interface: &str) -> Option<MacAddr> {
        self.macs.get(interface).copied()
    }
}
