use std::net::Ipv4Addr;
use std::time::SystemTime;

/// Every header field except LOCATION is capped at this many bytes
pub(crate) const FIELD_LEN: usize = 128;
/// LOCATION gets a larger cap, URLs being what they are
pub(crate) const LOCATION_LEN: usize = 256;

const HEADER_MSEARCH: &str = "M-SEARCH * HTTP/1.1\r\n";
const HEADER_NOTIFY: &str = "NOTIFY * HTTP/1.1\r\n";
const HEADER_RESPONSE: &str = "HTTP/1.1 200 OK\r\n";

/// SSDP message kind, from the start-line of the datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    MSearch,
    Notify,
    Response,
}

/// One parsed SSDP datagram
///
/// Header values longer than their cap are truncated to `cap - 1` bytes;
/// fields absent from the datagram are empty. `ST` and `NT` land in the
/// same slot (a conformant message carries only one of the two).
#[derive(Debug, Clone)]
pub(crate) struct Packet {
    pub method: Method,
    pub search_target: String,
    pub unique_service_name: String,
    pub location: String,
    pub nts: String,
    pub sm_id: String,
    pub device_type: String,
    pub received_from: Ipv4Addr,
    pub received_at: SystemTime,
}

impl Packet {
    fn new(method: Method) -> Self {
        Self {
            method,
            search_target: String::new(),
            unique_service_name: String::new(),
            location: String::new(),
            nts: String::new(),
            sm_id: String::new(),
            device_type: String::new(),
            received_from: Ipv4Addr::UNSPECIFIED,
            received_at: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Parse one datagram; `None` means it is not an SSDP message we accept
///
/// Total on any byte input and never fails the caller: a datagram that is
/// empty, contains an interior NUL, is not UTF-8, or does not start with a
/// known SSDP start-line is simply dropped. Unknown header fields are
/// ignored.
pub(crate) fn parse(data: &[u8]) -> Option<Packet> {
    if data.is_empty() || data.contains(&0) {
        return None;
    }
    let text = std::str::from_utf8(data).ok()?;

    let (method, header) = if text.starts_with(HEADER_MSEARCH) {
        (Method::MSearch, HEADER_MSEARCH)
    } else if text.starts_with(HEADER_NOTIFY) {
        (Method::Notify, HEADER_NOTIFY)
    } else if text.starts_with(HEADER_RESPONSE) {
        (Method::Response, HEADER_RESPONSE)
    } else {
        return None;
    };

    let mut packet = Packet::new(method);

    // Only complete CRLF-terminated lines count; a trailing fragment
    // without its CRLF is dropped.
    let mut rest = &text[header.len()..];
    while let Some(pos) = rest.find("\r\n") {
        parse_field_line(&rest[..pos], &mut packet);
        rest = &rest[pos + 2..];
    }
    Some(packet)
}

fn parse_field_line(line: &str, packet: &mut Packet) {
    if line.is_empty() || line.starts_with(':') {
        return;
    }
    let Some(colon) = line.find(':') else {
        return;
    };
    let field = trim(&line[..colon]);
    let value = trim(&line[colon + 1..]);
    if field.is_empty() || value.is_empty() {
        // empty values are tolerated and ignored (DATE:, EXT:)
        return;
    }

    if field.eq_ignore_ascii_case("st") || field.eq_ignore_ascii_case("nt") {
        packet.search_target = bounded(value, FIELD_LEN);
    } else if field.eq_ignore_ascii_case("usn") {
        packet.unique_service_name = bounded(value, FIELD_LEN);
    } else if field.eq_ignore_ascii_case("location") {
        packet.location = bounded(value, LOCATION_LEN);
    } else if field.eq_ignore_ascii_case("sm_id") {
        packet.sm_id = bounded(value, FIELD_LEN);
    } else if field.eq_ignore_ascii_case("dev_type") {
        packet.device_type = bounded(value, FIELD_LEN);
    } else if field.eq_ignore_ascii_case("nts") {
        packet.nts = bounded(value, FIELD_LEN);
    }
    // any other field is not ours to keep
}

fn trim(s: &str) -> &str {
    s.trim_matches(|c: char| !c.is_ascii_graphic())
}

/// Copy `value`, truncating to `cap - 1` bytes on overflow
fn bounded(value: &str, cap: usize) -> String {
    if value.len() < cap {
        return value.to_string();
    }
    let mut end = cap - 1;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(parse(b"").is_none());
    }

    #[test]
    fn rejects_embedded_nul() {
        assert!(parse(b"NOTIFY * HTTP/1.1\r\nNT: a\0b\r\n\r\n").is_none());
    }

    #[test]
    fn rejects_non_utf8() {
        assert!(parse(&[0x80, 0x80, b'\r', b'\n']).is_none());
    }

    #[test]
    fn rejects_unknown_start_line() {
        assert!(parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").is_none());
        assert!(parse(b"notify * HTTP/1.1\r\n\r\n").is_none());
    }

    #[test]
    fn rejects_bare_start_line_without_crlf() {
        assert!(parse(b"NOTIFY * HTTP/1.1").is_none());
    }

    #[test]
    fn method_identity() {
        let m = parse(b"M-SEARCH * HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(m.method, Method::MSearch);
        let n = parse(b"NOTIFY * HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(n.method, Method::Notify);
        let r = parse(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
        assert_eq!(r.method, Method::Response);
    }

    #[test]
    fn parses_all_known_fields() {
        let p = parse(
            b"NOTIFY * HTTP/1.1\r\n\
ST: fnord\r\n\
USN: uuid:37\r\n\
LOCATION: http://foo\r\n\
NTS: ssdp:alive\r\n\
SM_ID: sm99\r\n\
DEV_TYPE: gadget\r\n\
\r\n",
        )
        .unwrap();
        assert_eq!(p.search_target, "fnord");
        assert_eq!(p.unique_service_name, "uuid:37");
        assert_eq!(p.location, "http://foo");
        assert_eq!(p.nts, "ssdp:alive");
        assert_eq!(p.sm_id, "sm99");
        assert_eq!(p.device_type, "gadget");
    }

    #[test]
    fn field_names_are_case_insensitive() {
        let p = parse(b"HTTP/1.1 200 OK\r\nsT:fnord\r\nUsN:prod37\r\n\r\n")
            .unwrap();
        assert_eq!(p.search_target, "fnord");
        assert_eq!(p.unique_service_name, "prod37");
    }

    #[test]
    fn nt_aliases_into_st_slot() {
        let p = parse(b"NOTIFY * HTTP/1.1\r\nNT: fnord\r\n\r\n").unwrap();
        assert_eq!(p.search_target, "fnord");

        // later line wins if both appear
        let p = parse(b"NOTIFY * HTTP/1.1\r\nST: one\r\nNT: two\r\n\r\n")
            .unwrap();
        assert_eq!(p.search_target, "two");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let p = parse(
            b"NOTIFY * HTTP/1.1\r\nX-WEIRD: yes\r\nNT: fnord\r\n\r\n",
        )
        .unwrap();
        assert_eq!(p.search_target, "fnord");
    }

    #[test]
    fn empty_values_are_tolerated() {
        let p = parse(b"HTTP/1.1 200 OK\r\nDATE:\r\nEXT:\r\nST: a\r\n\r\n")
            .unwrap();
        assert_eq!(p.search_target, "a");
    }

    #[test]
    fn line_starting_with_colon_is_skipped() {
        let p = parse(b"HTTP/1.1 200 OK\r\n: b\r\nST: a\r\n\r\n").unwrap();
        assert_eq!(p.search_target, "a");
    }

    #[test]
    fn values_are_trimmed() {
        let p = parse(b"HTTP/1.1 200 OK\r\n  ST \t:   fnord  \r\n\r\n")
            .unwrap();
        assert_eq!(p.search_target, "fnord");
    }

    #[test]
    fn oversize_usn_keeps_first_127_bytes() {
        let usn = "u".repeat(200);
        let message =
            format!("NOTIFY * HTTP/1.1\r\nUSN: {usn}\r\n\r\n");
        let p = parse(message.as_bytes()).unwrap();
        assert_eq!(p.unique_service_name.len(), 127);
        assert_eq!(p.unique_service_name, usn[..127]);
    }

    #[test]
    fn oversize_location_keeps_first_255_bytes() {
        let location = format!("http://{}", "a".repeat(300));
        let message =
            format!("HTTP/1.1 200 OK\r\nLOCATION: {location}\r\n\r\n");
        let p = parse(message.as_bytes()).unwrap();
        assert_eq!(p.location.len(), 255);
        assert_eq!(p.location, location[..255]);
    }

    #[test]
    fn value_at_exactly_the_cap_is_truncated_by_one() {
        let usn = "u".repeat(FIELD_LEN);
        let message =
            format!("NOTIFY * HTTP/1.1\r\nUSN: {usn}\r\n\r\n");
        let p = parse(message.as_bytes()).unwrap();
        assert_eq!(p.unique_service_name.len(), FIELD_LEN - 1);
    }

    #[test]
    fn trailing_fragment_without_crlf_is_dropped() {
        let p = parse(b"NOTIFY * HTTP/1.1\r\nNT: a\r\nUSN: cutoff").unwrap();
        assert_eq!(p.search_target, "a");
        assert_eq!(p.unique_service_name, "");
    }
}
