use crate::error::{Error, Result};
use crate::packet::{parse, Packet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, trace};

const RECEIVE_BUFFER_LEN: usize = 2048;
const RECEIVE_TOKEN: mio::Token = mio::Token(0);

/// The readiness tick; the receive loop wakes at least this often
/// regardless of the caller's overall timeout.
const TICK: Duration = Duration::from_millis(100);

/// Split a discovery URL into its multicast group and SSDP port
///
/// The host must be a literal IPv4 address. Whether that address is
/// actually in the multicast range is deliberately not checked.
pub(crate) fn parse_discovery_url(
    discovery_url: &str,
) -> Result<(Ipv4Addr, u16)> {
    let url = url::Url::parse(discovery_url).map_err(|source| {
        Error::UrlParse {
            url: discovery_url.to_string(),
            source,
        }
    })?;
    let group = match url.host() {
        Some(url::Host::Ipv4(addr)) => addr,
        _ => return Err(Error::HostNotIpv4(discovery_url.to_string())),
    };
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::MissingPort(discovery_url.to_string()))?;
    Ok((group, port))
}

/// Send one datagram from a chosen source interface
///
/// A fresh socket is created per transmission, bound to `(source, 0)` to
/// pin the outbound interface, and released on every exit path. Multicast
/// loopback is enabled so peers on the sending host see the datagram too.
///
/// # Errors
///
/// Returns the failing step's OS error; callers record it against
/// `source` and carry on with the next interface.
pub(crate) fn send_datagram(
    message: &str,
    source: Ipv4Addr,
    dest: SocketAddrV4,
) -> Result<()> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )
    .map_err(Error::SocketNew)?;
    socket
        .bind(&socket2::SockAddr::from(SocketAddrV4::new(source, 0)))
        .map_err(|e| Error::SendBind {
            addr: source,
            source: e,
        })?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(Error::MulticastLoop)?;
    socket
        .send_to(message.as_bytes(), &socket2::SockAddr::from(dest))
        .map_err(|e| Error::Send { dest, source: e })?;
    trace!(%source, %dest, len = message.len(), "datagram sent");
    Ok(())
}

/// The bound, group-joined, non-blocking SSDP receive socket
///
/// Owns the readiness poll that drives the 100 ms receive tick. Reopened
/// from scratch whenever the owning façade notices an interface change.
pub(crate) struct MulticastSocket {
    socket: mio::net::UdpSocket,
    poll: mio::Poll,
    events: mio::Events,
    group: Ipv4Addr,
    port: u16,
}

impl MulticastSocket {
    pub fn open(group: Ipv4Addr, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(Error::PortZero);
        }
        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .map_err(Error::SocketNew)?;
        socket.set_nonblocking(true).map_err(Error::SetNonblocking)?;
        socket.set_reuse_address(true).map_err(Error::ReuseAddress)?;
        socket.set_cloexec(true).map_err(Error::Cloexec)?;
        socket
            .bind(&socket2::SockAddr::from(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                port,
            )))
            .map_err(|source| Error::Bind { port, source })?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(|source| Error::JoinGroup { group, source })?;

        let mut socket = mio::net::UdpSocket::from_std(socket.into());
        let poll = mio::Poll::new().map_err(Error::Poll)?;
        poll.registry()
            .register(&mut socket, RECEIVE_TOKEN, mio::Interest::READABLE)
            .map_err(Error::Poll)?;

        debug!(%group, port, "multicast socket open");
        Ok(Self {
            socket,
            poll,
            events: mio::Events::with_capacity(16),
            group,
            port,
        })
    }

    /// Close and reopen for the same group and port
    pub fn reopen(&mut self) -> Result<()> {
        debug!(group = %self.group, port = self.port, "reopening socket");
        *self = Self::open(self.group, self.port)?;
        Ok(())
    }

    /// Run the receive loop until `timeout` has elapsed
    ///
    /// Waits on readiness with a 100 ms tick, draining every available
    /// datagram on each wakeup and handing valid packets, stamped with
    /// sender address and arrival time, to `on_packet` in arrival order.
    /// Malformed datagrams are dropped silently. Returns within one tick
    /// of `timeout` on an idle network; a shorter timeout still performs
    /// one tick.
    ///
    /// # Errors
    ///
    /// Fails on a poll or receive error; packets already dispatched in
    /// this call stay dispatched.
    pub fn receive_until(
        &mut self,
        timeout: Duration,
        mut on_packet: impl FnMut(&Packet),
    ) -> Result<()> {
        let begin = Instant::now();
        loop {
            self.poll
                .poll(&mut self.events, Some(TICK))
                .map_err(Error::Poll)?;
            if !self.events.is_empty() {
                self.drain(&mut on_packet)?;
            }
            if begin.elapsed() >= timeout {
                return Ok(());
            }
        }
    }

    fn drain(&self, on_packet: &mut impl FnMut(&Packet)) -> Result<()> {
        let mut buf = [0u8; RECEIVE_BUFFER_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, SocketAddr::V4(from))) => {
                    if let Some(mut packet) = parse(&buf[..n]) {
                        packet.received_from = *from.ip();
                        packet.received_at = SystemTime::now();
                        on_packet(&packet);
                    } else {
                        trace!(%from, len = n, "dropping malformed datagram");
                    }
                }
                Ok((_, SocketAddr::V6(_))) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Ok(());
                }
                Err(e) => return Err(Error::Receive(e)),
            }
        }
    }
}
