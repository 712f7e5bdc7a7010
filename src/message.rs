use crate::host;
use crate::ServiceDescription;
use std::fmt::Write;
use std::net::Ipv4Addr;
use std::time::Duration;

pub(crate) const SEARCH_TARGET_ALL: &str = "ssdp:all";
pub(crate) const NTS_ALIVE: &str = "ssdp:alive";
pub(crate) const NTS_BYEBYE: &str = "ssdp:byebye";

// The SERVER/USER-AGENT value deliberately carries no "UPnP/1.1" token.
fn server_string(product_name: &str, product_version: &str) -> String {
    format!(
        "{}/{} {}/{}",
        host::os_name(),
        host::os_version(),
        product_name,
        product_version
    )
}

pub(crate) fn build_notify_alive(
    group: Ipv4Addr,
    port: u16,
    max_age: Duration,
    description: &ServiceDescription,
) -> String {
    let mut message = format!(
        "NOTIFY * HTTP/1.1\r
HOST:{group}:{port}\r
CACHE-CONTROL:max-age={age}\r
LOCATION:{location}\r
SERVER:{server}\r
NT:{target}\r
NTS:{nts}\r
USN:{usn}\r\n",
        age = max_age.as_secs(),
        location = description.location_url,
        server = server_string(
            &description.product_name,
            &description.product_version
        ),
        target = description.search_target,
        nts = NTS_ALIVE,
        usn = description.unique_service_name,
    );
    if !description.sm_id.is_empty() {
        let _ = write!(message, "SM_ID:{}\r\n", description.sm_id);
    }
    if !description.device_type.is_empty() {
        let _ = write!(message, "DEV_TYPE:{}\r\n", description.device_type);
    }
    message.push_str("\r\n");
    message
}

pub(crate) fn build_notify_byebye(
    group: Ipv4Addr,
    port: u16,
    description: &ServiceDescription,
) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r
HOST:{group}:{port}\r
NT:{target}\r
NTS:{nts}\r
USN:{usn}\r
\r\n",
        target = description.search_target,
        nts = NTS_BYEBYE,
        usn = description.unique_service_name,
    )
}

pub(crate) fn build_m_search(
    group: Ipv4Addr,
    port: u16,
    search_target: &str,
    product_name: &str,
    product_version: &str,
) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r
HOST:{group}:{port}\r
MAN:\"ssdp:discover\"\r
MX:5\r
ST:{search_target}\r
USER-AGENT:{agent}\r
\r\n",
        agent = server_string(product_name, product_version),
    )
}

// Note the space after the colon in the optional SM_ID/DEV_TYPE headers;
// peers accept the response in exactly this shape.
pub(crate) fn build_response(
    max_age: Duration,
    description: &ServiceDescription,
) -> String {
    let mut message = format!(
        "HTTP/1.1 200 OK\r
CACHE-CONTROL:max-age={age}\r
DATE:\r
EXT:\r
LOCATION:{location}\r
SERVER:{server}\r
ST:{target}\r
USN:{usn}\r\n",
        age = max_age.as_secs(),
        location = description.location_url,
        server = server_string(
            &description.product_name,
            &description.product_version
        ),
        target = description.search_target,
        usn = description.unique_service_name,
    );
    if !description.sm_id.is_empty() {
        let _ = write!(message, "SM_ID: {}\r\n", description.sm_id);
    }
    if !description.device_type.is_empty() {
        let _ = write!(message, "DEV_TYPE: {}\r\n", description.device_type);
    }
    message.push_str("\r\n");
    message
}
