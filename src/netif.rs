use crate::error::{Error, Result};
use nix::ifaddrs::{self, InterfaceAddress};
use std::net::Ipv4Addr;
use tracing::debug;

/// One IPv4 network interface, as seen at the last enumeration
///
/// Equality is over all three fields; a changed address or netmask makes
/// an interface count as different even under the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name as reported by the OS (e.g. "eth0")
    pub name: String,
    /// IPv4 address of the interface
    pub addr: Ipv4Addr,
    /// IPv4 netmask of the interface
    pub netmask: Ipv4Addr,
}

/// Re-enumerate the host's IPv4 interfaces and diff against `snapshot`
///
/// On change the new enumeration replaces `snapshot` and `true` is
/// returned; otherwise `snapshot` is left alone. The comparison is
/// order-sensitive, which is sound because successive enumerations come
/// from the same OS call in the same order.
///
/// A loopback entry is always present in the result: the enumeration
/// normally yields it, and a synthetic `("localhost", 127.0.0.1/8)` entry
/// is prepended if it does not.
///
/// # Errors
///
/// Returns [`Error::Interfaces`] if the OS enumeration call fails; the
/// caller's snapshot is left untouched and the call can be retried.
pub fn refresh_interfaces(snapshot: &mut Vec<NetworkInterface>) -> Result<bool> {
    refresh_interfaces_inner(snapshot, ifaddrs::getifaddrs)
}

/* The inner function does the work, and is parameterised on the
 * enumeration call purely for testing reasons.
 */
fn refresh_interfaces_inner(
    snapshot: &mut Vec<NetworkInterface>,
    getifaddrs: fn() -> nix::Result<ifaddrs::InterfaceAddressIterator>,
) -> Result<bool> {
    let addrs = getifaddrs().map_err(|e| Error::Interfaces(e.into()))?;
    let fresh = collect_interfaces(addrs);
    if fresh == *snapshot {
        return Ok(false);
    }
    debug!(count = fresh.len(), "network interfaces changed");
    *snapshot = fresh;
    Ok(true)
}

fn collect_interfaces(
    addrs: impl IntoIterator<Item = InterfaceAddress>,
) -> Vec<NetworkInterface> {
    let mut interfaces = Vec::new();
    for ifaddr in addrs {
        let Some(addr) = ifaddr.address.as_ref().and_then(as_ipv4) else {
            continue;
        };
        let Some(netmask) = ifaddr.netmask.as_ref().and_then(as_ipv4) else {
            continue;
        };
        interfaces.push(NetworkInterface {
            name: ifaddr.interface_name,
            addr,
            netmask,
        });
    }

    if !interfaces.iter().any(|i| i.addr.is_loopback()) {
        interfaces.insert(
            0,
            NetworkInterface {
                name: "localhost".to_string(),
                addr: Ipv4Addr::LOCALHOST,
                netmask: Ipv4Addr::new(255, 0, 0, 0),
            },
        );
    }
    interfaces
}

fn as_ipv4(addr: &nix::sys::socket::SockaddrStorage) -> Option<Ipv4Addr> {
    addr.as_sockaddr_in().map(|sin| Ipv4Addr::from(sin.ip()))
}

/// True iff `peer` is on the same subnet as the interface
pub(crate) fn same_subnet(interface: &NetworkInterface, peer: Ipv4Addr) -> bool {
    let mask = u32::from(interface.netmask);
    (u32::from(interface.addr) & mask) == (u32::from(peer) & mask)
}
