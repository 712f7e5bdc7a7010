use crate::error::Result;
use crate::message;
use crate::netif::{self, NetworkInterface};
use crate::packet::Method;
use crate::udp::{self, MulticastSocket};
use crate::{ServiceDescription, ServiceUpdateEvent, UpdateEvent};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tracing::debug;

/// A searcher for SSDP services announced by other hosts
///
/// Sends `M-SEARCH` requests on demand and turns the notifications and
/// responses it receives into [`ServiceUpdateEvent`]s, filtered by search
/// target and (optionally) device type.
///
/// Like [`Service`](crate::Service), a finder is single-threaded and
/// caller-driven; interleave [`send_m_search`](ServiceFinder::send_m_search)
/// and [`check_for_services`](ServiceFinder::check_for_services) from one
/// thread you own.
pub struct ServiceFinder {
    discovery_url: String,
    group: Ipv4Addr,
    port: u16,
    search_target: String,
    device_type_filter: String,
    m_search_message: String,
    interfaces: Vec<NetworkInterface>,
    socket: MulticastSocket,
    send_errors: BTreeMap<String, String>,
}

impl ServiceFinder {
    /// Create a finder and open its multicast socket
    ///
    /// With no `search_target` the finder searches for, and reacts to,
    /// `ssdp:all`. A non-empty `device_type_filter` restricts delivered
    /// events to messages carrying that exact `DEV_TYPE`.
    ///
    /// # Errors
    ///
    /// Fails on a malformed discovery URL, on interface enumeration
    /// failure, or on any socket setup step; nothing is left open on
    /// failure.
    pub fn new(
        discovery_url: &str,
        product_name: &str,
        product_version: &str,
        search_target: Option<&str>,
        device_type_filter: Option<&str>,
    ) -> Result<Self> {
        let (group, port) = udp::parse_discovery_url(discovery_url)?;

        let search_target = match search_target {
            Some(target) if !target.is_empty() => target.to_string(),
            _ => message::SEARCH_TARGET_ALL.to_string(),
        };
        let m_search_message = message::build_m_search(
            group,
            port,
            &search_target,
            product_name,
            product_version,
        );

        let mut interfaces = Vec::new();
        netif::refresh_interfaces(&mut interfaces)?;
        let socket = MulticastSocket::open(group, port)?;

        Ok(Self {
            discovery_url: discovery_url.to_string(),
            group,
            port,
            search_target,
            device_type_filter: device_type_filter
                .unwrap_or_default()
                .to_string(),
            m_search_message,
            interfaces,
            socket,
            send_errors: BTreeMap::new(),
        })
    }

    /// Multicast one `M-SEARCH` for our search target on every network
    ///
    /// Refreshes the interface list first (reopening the socket if it
    /// changed). Returns `false` iff any interface failed; details from
    /// [`last_send_errors`](ServiceFinder::last_send_errors).
    pub fn send_m_search(&mut self) -> bool {
        if !self.update_interfaces() {
            return false;
        }
        let dest = SocketAddrV4::new(self.group, self.port);
        let mut failures = Vec::new();
        for interface in &self.interfaces {
            if let Err(e) = udp::send_datagram(
                &self.m_search_message,
                interface.addr,
                dest,
            ) {
                debug!(interface = %interface.addr, error = %e, "search failed");
                failures.push((interface.addr.to_string(), e.to_string()));
            }
        }
        let ok = failures.is_empty();
        self.send_errors.extend(failures);
        ok
    }

    /// Re-enumerate interfaces, reopening the socket on change
    ///
    /// [`send_m_search`](ServiceFinder::send_m_search) does this anyway;
    /// call it directly if you only listen for notifications and never
    /// search.
    ///
    /// # Errors
    ///
    /// Fails if enumeration or the socket reopen fails; the call can be
    /// retried.
    pub fn check_network_changes(&mut self) -> Result<()> {
        if netif::refresh_interfaces(&mut self.interfaces)? {
            self.socket.reopen()?;
        }
        Ok(())
    }

    fn update_interfaces(&mut self) -> bool {
        match self.check_network_changes() {
            Ok(()) => true,
            Err(e) => {
                self.send_errors
                    .insert(self.discovery_url.clone(), e.to_string());
                false
            }
        }
    }

    /// Listen for notifications and search responses
    ///
    /// Runs the receive loop until `timeout` elapses (effective minimum
    /// one 100 ms tick), calling `update_callback` once per accepted
    /// message, in arrival order. A message is accepted iff it passes the
    /// device-type filter and, unless we search for `ssdp:all`, carries
    /// our exact search target. `NOTIFY` messages map to
    /// [`NotifyAlive`](UpdateEvent::NotifyAlive) or
    /// [`NotifyByeBye`](UpdateEvent::NotifyByeBye) by their `NTS` header
    /// (an absent or unrecognized `NTS` counts as alive); `200 OK`
    /// messages map to [`Response`](UpdateEvent::Response).
    ///
    /// Returns `true` iff the timeout was reached without a receive
    /// error.
    pub fn check_for_services(
        &mut self,
        mut update_callback: impl FnMut(&ServiceUpdateEvent),
        timeout: Duration,
    ) -> bool {
        let search_target = &self.search_target;
        let device_type_filter = &self.device_type_filter;

        let received = self.socket.receive_until(timeout, |packet| {
            if !device_type_filter.is_empty()
                && packet.device_type != *device_type_filter
            {
                return;
            }
            if !search_target.is_empty()
                && search_target != message::SEARCH_TARGET_ALL
                && packet.search_target != *search_target
            {
                return;
            }
            let event = match packet.method {
                Method::Notify => {
                    if packet.nts == message::NTS_BYEBYE {
                        UpdateEvent::NotifyByeBye
                    } else {
                        UpdateEvent::NotifyAlive
                    }
                }
                Method::Response => UpdateEvent::Response,
                Method::MSearch => return,
            };
            update_callback(&ServiceUpdateEvent {
                event,
                service: ServiceDescription {
                    location_url: packet.location.clone(),
                    unique_service_name: packet.unique_service_name.clone(),
                    search_target: packet.search_target.clone(),
                    sm_id: packet.sm_id.clone(),
                    device_type: packet.device_type.clone(),
                    product_name: String::new(),
                    product_version: String::new(),
                },
            });
        });

        if let Err(e) = received {
            self.send_errors
                .insert(self.discovery_url.clone(), e.to_string());
            return false;
        }
        true
    }

    /// The discovery URL this finder was created with
    #[must_use]
    pub fn url(&self) -> &str {
        &self.discovery_url
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
