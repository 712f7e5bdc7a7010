use crate::error::Result;
use crate::message;
use crate::netif::{self, NetworkInterface};
use crate::packet::Method;
use crate::udp::{self, MulticastSocket};
use crate::ServiceDescription;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tracing::debug;

/// An announced SSDP service: notifier and search responder
///
/// Construction opens the multicast socket immediately, so the service is
/// reachable for `M-SEARCH` requests as soon as `new` returns. The three
/// outbound messages are prebuilt once here; sending never allocates per
/// message.
///
/// A `Service` is single-threaded: the caller drives it by invoking
/// [`send_notify_alive`](Service::send_notify_alive) periodically and
/// running [`Service::check_m_search_and_send_response`] in between.
/// Moves transfer ownership of the socket; there is no `Clone`.
pub struct Service {
    description: ServiceDescription,
    discovery_url: String,
    group: Ipv4Addr,
    port: u16,
    notify_alive_message: String,
    notify_byebye_message: String,
    response_message: String,
    interfaces: Vec<NetworkInterface>,
    socket: MulticastSocket,
    send_errors: BTreeMap<String, String>,
}

impl Service {
    /// Create a service and open its multicast socket
    ///
    /// `discovery_url` names the multicast group and port, e.g.
    /// [`DEFAULT_DISCOVERY_URL`](crate::DEFAULT_DISCOVERY_URL); its host
    /// must be a literal IPv4 address (whether it is really a multicast
    /// address is not checked). `max_age` goes out in `CACHE-CONTROL`;
    /// the UPnP specification recommends at least 1800 seconds.
    ///
    /// # Errors
    ///
    /// Fails on a malformed discovery URL, on interface enumeration
    /// failure, or on any socket setup step; nothing is left open on
    /// failure.
    pub fn new(
        discovery_url: &str,
        max_age: Duration,
        description: ServiceDescription,
    ) -> Result<Self> {
        let (group, port) = udp::parse_discovery_url(discovery_url)?;

        let notify_alive_message =
            message::build_notify_alive(group, port, max_age, &description);
        let notify_byebye_message =
            message::build_notify_byebye(group, port, &description);
        let response_message = message::build_response(max_age, &description);

        let mut interfaces = Vec::new();
        netif::refresh_interfaces(&mut interfaces)?;
        let socket = MulticastSocket::open(group, port)?;

        Ok(Self {
            description,
            discovery_url: discovery_url.to_string(),
            group,
            port,
            notify_alive_message,
            notify_byebye_message,
            response_message,
            interfaces,
            socket,
            send_errors: BTreeMap::new(),
        })
    }

    /// Announce on every network that the service is alive
    ///
    /// Refreshes the interface list first (reopening the socket if it
    /// changed), then multicasts the `NOTIFY` / `ssdp:alive` message once
    /// per interface. Returns `false` iff any interface failed; details
    /// are available from [`last_send_errors`](Service::last_send_errors).
    pub fn send_notify_alive(&mut self) -> bool {
        self.send_notify(false)
    }

    /// Announce on every network that the service is shutting down
    ///
    /// As [`send_notify_alive`](Service::send_notify_alive), with the
    /// `NOTIFY` / `ssdp:byebye` message.
    pub fn send_notify_byebye(&mut self) -> bool {
        self.send_notify(true)
    }

    fn send_notify(&mut self, byebye: bool) -> bool {
        if !self.update_interfaces() {
            return false;
        }
        let message = if byebye {
            &self.notify_byebye_message
        } else {
            &self.notify_alive_message
        };
        let dest = SocketAddrV4::new(self.group, self.port);
        let mut failures = Vec::new();
        for interface in &self.interfaces {
            if let Err(e) = udp::send_datagram(message, interface.addr, dest)
            {
                debug!(interface = %interface.addr, error = %e, "notify failed");
                failures.push((interface.addr.to_string(), e.to_string()));
            }
        }
        let ok = failures.is_empty();
        self.send_errors.extend(failures);
        ok
    }

    fn update_interfaces(&mut self) -> bool {
        match netif::refresh_interfaces(&mut self.interfaces) {
            Ok(true) => {
                if let Err(e) = self.socket.reopen() {
                    self.send_errors
                        .insert(self.discovery_url.clone(), e.to_string());
                    return false;
                }
                true
            }
            Ok(false) => true,
            Err(e) => {
                self.send_errors
                    .insert(self.discovery_url.clone(), e.to_string());
                false
            }
        }
    }

    /// Listen for `M-SEARCH` requests and answer the ones aimed at us
    ///
    /// Runs the receive loop until `timeout` elapses (effective minimum
    /// one 100 ms tick). A request is answered iff its `ST` is `ssdp:all`
    /// or equals our search target; the prebuilt `200 OK` is then sent
    /// unicast to the requester at the SSDP port, from the interface
    /// sharing the requester's subnet. A requester on no local subnet is
    /// silently skipped.
    ///
    /// Returns `false` if receiving failed or any response send failed;
    /// details from [`last_send_errors`](Service::last_send_errors).
    pub fn check_m_search_and_send_response(
        &mut self,
        timeout: Duration,
    ) -> bool {
        let interfaces = &self.interfaces;
        let response = &self.response_message;
        let search_target = &self.description.search_target;
        let port = self.port;
        let mut failures = Vec::new();

        let received = self.socket.receive_until(timeout, |packet| {
            if packet.method != Method::MSearch {
                return;
            }
            if packet.search_target != message::SEARCH_TARGET_ALL
                && packet.search_target != *search_target
            {
                return;
            }
            let Some(interface) = interfaces
                .iter()
                .find(|i| netif::same_subnet(i, packet.received_from))
            else {
                return;
            };
            let dest = SocketAddrV4::new(packet.received_from, port);
            if let Err(e) = udp::send_datagram(response, interface.addr, dest)
            {
                debug!(%dest, error = %e, "search response failed");
                failures.push((interface.addr.to_string(), e.to_string()));
            }
        });

        let mut ok = failures.is_empty();
        self.send_errors.extend(failures);
        if let Err(e) = received {
            self.send_errors
                .insert(self.discovery_url.clone(), e.to_string());
            ok = false;
        }
        ok
    }

    /// The description this service was created with
    #[must_use]
    pub fn description(&self) -> &ServiceDescription {
        &self.description
    }

    /// Drain and concatenate the buffered per-interface send errors
    pub fn last_send_errors(&mut self) -> String {
        let mut drained = String::new();
        for (_, error) in std::mem::take(&mut self.send_errors) {
            drained.push_str(&error);
        }
        drained
    }
}

/// A service equals a description iff their SSDP identities match
impl PartialEq<ServiceDescription> for Service {
    fn eq(&self, other: &ServiceDescription) -> bool {
        self.description == *other
    }
}
