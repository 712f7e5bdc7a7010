//! Lightweight SSDP, the Simple Service Discovery Protocol
//!
//! The lssdp crate announces a service on a local network and discovers
//! the services other hosts announce, using SSDP: HTTP-like text messages
//! over UDP multicast, conventionally on `239.255.255.250:1900`. SSDP is
//! the discovery portion of UPnP, but the mechanism is generic enough for
//! any resource that must be findable on a LAN without a directory server.
//!
//! Two symmetric participants are provided. A [`Service`] announces
//! itself (`NOTIFY` with `ssdp:alive`/`ssdp:byebye`) and answers incoming
//! `M-SEARCH` requests with a `200 OK` response; a [`ServiceFinder`]
//! sends `M-SEARCH` requests and listens for the notifications and
//! responses of others, delivering them as [`ServiceUpdateEvent`]s. Both
//! share the same wire-level core: one UDP socket bound to the SSDP port
//! and joined to the multicast group, and a per-interface sender that
//! emits every outbound message once per enumerated IPv4 interface so the
//! datagrams reach every attached network.
//!
//! Neither participant spawns threads. The caller drives progress by
//! invoking the send methods and the receive loops,
//! [`Service::check_m_search_and_send_response`] and
//! [`ServiceFinder::check_for_services`]; each receive loop polls with a
//! 100 ms tick and returns when the caller's timeout has elapsed, so a
//! termination flag can be checked between calls. Network interfaces are
//! re-enumerated before every outbound round, and the receive socket is
//! closed and reopened whenever the interface set has changed.
//!
//! The `SERVER` and `USER-AGENT` headers deliberately do not claim
//! `UPnP/1.1` conformance; messages carry the OS and product identity
//! only. IPv6 is not supported.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::fmt;

mod error;
mod finder;
mod host;
mod message;
mod packet;
mod service;
mod udp;

/// Enumerating IPv4 network interfaces and diffing snapshots
pub mod netif;

pub use error::{Error, Result};
pub use finder::ServiceFinder;
pub use netif::NetworkInterface;
pub use service::Service;

/// The conventional SSDP discovery URL, group 239.255.255.250 port 1900
pub const DEFAULT_DISCOVERY_URL: &str = "http://239.255.255.250:1900";

/// The properties of one announced or discovered service
///
/// A [`Service`] is constructed from a fully-populated description; the
/// descriptions carried by [`ServiceUpdateEvent`] are only as complete as
/// the received message, but always have at least the search target and
/// unique service name set.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescription {
    /// Well-formed URL where the service itself can be reached
    pub location_url: String,

    /// Unique name of this particular service instance (`USN`)
    pub unique_service_name: String,

    /// The notification type (`NT`) and search target (`ST`)
    pub search_target: String,

    /// Optional id carried in the `SM_ID` header; empty means absent
    pub sm_id: String,

    /// Optional device type carried in the `DEV_TYPE` header; empty
    /// means absent
    pub device_type: String,

    /// Product name for the `SERVER`/`USER-AGENT` header
    pub product_name: String,

    /// Product version for the `SERVER`/`USER-AGENT` header
    pub product_version: String,
}

/// Equality is SSDP identity: search target plus unique service name
impl PartialEq for ServiceDescription {
    fn eq(&self, other: &Self) -> bool {
        self.search_target == other.search_target
            && self.unique_service_name == other.unique_service_name
    }
}

impl Eq for ServiceDescription {}

impl fmt::Display for ServiceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "USN: {}", self.unique_service_name)?;
        writeln!(f, "ST:{}", self.search_target)?;
        writeln!(f, "DEV_TYPE:{}", self.device_type)?;
        writeln!(f, "LOCATION:{}", self.location_url)?;
        writeln!(
            f,
            "PRODUCT:{}/{}",
            self.product_name, self.product_version
        )
    }
}

/// What kind of message produced a [`ServiceUpdateEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    /// Unsolicited `NOTIFY` with subtype `ssdp:alive`
    NotifyAlive,
    /// Unsolicited `NOTIFY` with subtype `ssdp:byebye`
    NotifyByeBye,
    /// A `200 OK` response to one of our `M-SEARCH` requests
    Response,
}

/// One filtered discovery event, delivered by
/// [`ServiceFinder::check_for_services`]
///
/// Events are not de-duplicated; the same peer will produce one per
/// interface it announced on. Use
/// [`unique_service_name`](ServiceDescription::unique_service_name) to
/// tell genuinely new services apart.
#[derive(Debug, Clone)]
pub struct ServiceUpdateEvent {
    /// Which message kind was received
    pub event: UpdateEvent,
    /// The service information found in the message
    pub service: ServiceDescription,
}

impl fmt::Display for ServiceUpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event {
            UpdateEvent::NotifyAlive => write!(f, "notify_alive ")?,
            UpdateEvent::NotifyByeBye => write!(f, "notify_byebye ")?,
            UpdateEvent::Response => write!(f, "response OK ")?,
        }
        write!(f, "{}", self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(target: &str, usn: &str) -> ServiceDescription {
        ServiceDescription {
            search_target: target.to_string(),
            unique_service_name: usn.to_string(),
            ..ServiceDescription::default()
        }
    }

    #[test]
    fn description_equality_is_ssdp_identity() {
        let mut a = description("tgt", "uuid:1");
        let b = description("tgt", "uuid:1");
        assert_eq!(a, b);

        // differing location does not break identity
        a.location_url = "http://elsewhere".to_string();
        assert_eq!(a, b);

        assert_ne!(description("tgt", "uuid:2"), b);
        assert_ne!(description("other", "uuid:1"), b);
    }

    #[test]
    fn event_display_names_the_kind() {
        let e = ServiceUpdateEvent {
            event: UpdateEvent::NotifyByeBye,
            service: description("tgt", "uuid:1"),
        };
        let text = format!("{e}");
        assert!(text.starts_with("notify_byebye "));
        assert!(text.contains("USN: uuid:1"));
    }
}
