use std::net::{Ipv4Addr, SocketAddrV4};

/// The errors which can arise while setting up or driving SSDP sockets
///
/// Construction of [`Service`](crate::Service) and
/// [`ServiceFinder`](crate::ServiceFinder) fails fatally with one of the
/// URL or socket-setup variants. Per-interface send failures are not
/// returned as `Error` from the send methods; they are collected and
/// drained via `last_send_errors`.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The discovery URL did not parse at all
    #[error("error parsing discovery url {url:?}: {source}")]
    UrlParse {
        /// The URL as supplied by the caller
        url: String,
        /// The underlying parse error
        source: url::ParseError,
    },

    /// The discovery URL's host is not a literal IPv4 address
    #[error("discovery url {0:?} must have a literal IPv4 host")]
    HostNotIpv4(String),

    /// The discovery URL carries no usable port
    #[error("discovery url {0:?} has no port")]
    MissingPort(String),

    /// Port 0 cannot be used as the SSDP port
    #[error("multicast port 0 has not been set up right")]
    PortZero,

    /// socket(2) failed
    #[error("error creating socket: {0}")]
    SocketNew(std::io::Error),

    /// Setting the socket non-blocking failed
    #[error("error setting nonblocking: {0}")]
    SetNonblocking(std::io::Error),

    /// setsockopt(SO_REUSEADDR) failed
    #[error("error setting SO_REUSEADDR: {0}")]
    ReuseAddress(std::io::Error),

    /// Setting FD_CLOEXEC failed
    #[error("error setting FD_CLOEXEC: {0}")]
    Cloexec(std::io::Error),

    /// Binding the receive socket to the SSDP port failed
    #[error("error binding to 0.0.0.0:{port}: {source}")]
    Bind {
        /// The SSDP port from the discovery URL
        port: u16,
        /// The underlying OS error
        source: std::io::Error,
    },

    /// setsockopt(IP_ADD_MEMBERSHIP) failed
    #[error("error joining multicast group {group}: {source}")]
    JoinGroup {
        /// The multicast group from the discovery URL
        group: Ipv4Addr,
        /// The underlying OS error
        source: std::io::Error,
    },

    /// Listing the host's network interfaces failed
    #[error("error listing network interfaces: {0}")]
    Interfaces(std::io::Error),

    /// Setting up or waiting on the readiness poll failed
    #[error("error polling socket: {0}")]
    Poll(std::io::Error),

    /// recvfrom(2) failed
    #[error("error receiving datagram: {0}")]
    Receive(std::io::Error),

    /// Binding the per-send socket to a source interface failed
    #[error("error binding send socket to {addr}: {source}")]
    SendBind {
        /// The source interface address
        addr: Ipv4Addr,
        /// The underlying OS error
        source: std::io::Error,
    },

    /// setsockopt(IP_MULTICAST_LOOP) failed
    #[error("error setting IP_MULTICAST_LOOP: {0}")]
    MulticastLoop(std::io::Error),

    /// sendto(2) failed
    #[error("error sending to {dest}: {source}")]
    Send {
        /// The destination address and port
        dest: SocketAddrV4,
        /// The underlying OS error
        source: std::io::Error,
    },
}

/// Shorthand for results carrying [`Error`]
pub type Result<T> = std::result::Result<T, Error>;
