use lssdp::{
    Service, ServiceDescription, ServiceFinder, ServiceUpdateEvent,
    UpdateEvent,
};
use serial_test::serial;
use std::time::{Duration, Instant};

const MAX_AGE: Duration = Duration::from_secs(1800);
const LOOP_TIMEOUT: Duration = Duration::from_millis(300);
const DEADLINE: Duration = Duration::from_secs(20);

fn discovery_url(port: u16) -> String {
    format!("http://239.255.255.250:{port}")
}

fn description(usn: &str, target: &str) -> ServiceDescription {
    ServiceDescription {
        location_url: "http://localhost:9090".to_string(),
        unique_service_name: usn.to_string(),
        search_target: target.to_string(),
        product_name: "MyTest".to_string(),
        product_version: "1.1".to_string(),
        ..ServiceDescription::default()
    }
}

fn count_for(
    events: &[ServiceUpdateEvent],
    service: &Service,
    kind: UpdateEvent,
) -> usize {
    events
        .iter()
        .filter(|e| e.event == kind && *service == e.service)
        .count()
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn alive_and_byebye_round_trip() {
    let url = discovery_url(29610);
    let mut service = Service::new(
        &url,
        MAX_AGE,
        description("service1", "my_search_target"),
    )
    .unwrap();
    let mut finder =
        ServiceFinder::new(&url, "MyTest", "1.1", None, None).unwrap();

    let mut events = Vec::new();
    let begin = Instant::now();
    loop {
        // some interfaces may legitimately lack a multicast route, so the
        // send results are not asserted; progress below is what counts
        service.send_notify_alive();
        finder.send_m_search();
        service.check_m_search_and_send_response(LOOP_TIMEOUT);
        assert!(finder
            .check_for_services(|e| events.push(e.clone()), LOOP_TIMEOUT));

        if count_for(&events, &service, UpdateEvent::NotifyAlive) >= 1
            && count_for(&events, &service, UpdateEvent::Response) >= 1
        {
            break;
        }
        assert!(
            begin.elapsed() < DEADLINE,
            "no alive+response seen, got {events:?}"
        );
    }

    // now say goodbye and drain until the finder has seen it
    service.send_notify_byebye();
    let begin = Instant::now();
    loop {
        assert!(finder
            .check_for_services(|e| events.push(e.clone()), LOOP_TIMEOUT));
        if count_for(&events, &service, UpdateEvent::NotifyByeBye) >= 1 {
            break;
        }
        assert!(
            begin.elapsed() < Duration::from_secs(5),
            "no byebye seen, got {events:?}"
        );
        service.send_notify_byebye();
    }
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn foreign_search_target_delivers_nothing() {
    let url = discovery_url(29611);
    let mut service = Service::new(
        &url,
        MAX_AGE,
        description("service1", "my_search_target"),
    )
    .unwrap();
    let mut finder = ServiceFinder::new(
        &url,
        "MyTest",
        "1.1",
        Some("other_target"),
        None,
    )
    .unwrap();

    let mut events = Vec::new();
    for _ in 0..4 {
        service.send_notify_alive();
        finder.send_m_search();
        service.check_m_search_and_send_response(LOOP_TIMEOUT);
        finder.check_for_services(|e| events.push(e.clone()), LOOP_TIMEOUT);
    }
    assert!(events.is_empty(), "unexpected events {events:?}");
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn generic_search_is_answered_with_own_target() {
    let url = discovery_url(29612);
    let mut service =
        Service::new(&url, MAX_AGE, description("service_x", "tgt_x"))
            .unwrap();
    // no search target, so the M-SEARCH goes out as literally ssdp:all
    let mut finder =
        ServiceFinder::new(&url, "MyTest", "1.1", None, None).unwrap();

    let mut responses = Vec::new();
    let begin = Instant::now();
    loop {
        finder.send_m_search();
        service.check_m_search_and_send_response(LOOP_TIMEOUT);
        assert!(finder.check_for_services(
            |e| {
                if e.event == UpdateEvent::Response {
                    responses.push(e.service.clone());
                }
            },
            LOOP_TIMEOUT
        ));
        if responses.iter().any(|s| s.search_target == "tgt_x") {
            break;
        }
        assert!(
            begin.elapsed() < DEADLINE,
            "no response seen, got {responses:?}"
        );
    }
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn two_services_on_one_host_are_both_discoverable() {
    let url = discovery_url(29613);
    let mut service1 = Service::new(
        &url,
        MAX_AGE,
        description("service1", "my_search_target"),
    )
    .unwrap();
    let mut service2 = Service::new(
        &url,
        MAX_AGE,
        description("service2", "my_search_target"),
    )
    .unwrap();
    let mut finder =
        ServiceFinder::new(&url, "MyTest", "1.1", None, None).unwrap();

    let mut events = Vec::new();
    let begin = Instant::now();
    loop {
        service1.send_notify_alive();
        service2.send_notify_alive();
        finder.send_m_search();
        service1.check_m_search_and_send_response(LOOP_TIMEOUT);
        service2.check_m_search_and_send_response(LOOP_TIMEOUT);
        assert!(finder
            .check_for_services(|e| events.push(e.clone()), LOOP_TIMEOUT));

        let seen1 = events.iter().any(|e| service1 == e.service);
        let seen2 = events.iter().any(|e| service2 == e.service);
        if seen1 && seen2 {
            break;
        }
        assert!(
            begin.elapsed() < DEADLINE,
            "both services not seen, got {events:?}"
        );
    }
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn notify_without_nts_counts_as_alive() {
    let url = discovery_url(29614);
    let mut finder =
        ServiceFinder::new(&url, "MyTest", "1.1", None, None).unwrap();

    let sender = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    sender.set_multicast_loop_v4(true).unwrap();
    let datagram = b"NOTIFY * HTTP/1.1\r\n\
HOST:239.255.255.250:29614\r\n\
NT:mystery_target\r\n\
USN:mystery\r\n\
\r\n";

    let mut events = Vec::new();
    let begin = Instant::now();
    loop {
        sender
            .send_to(datagram, "239.255.255.250:29614")
            .unwrap();
        assert!(finder
            .check_for_services(|e| events.push(e.clone()), LOOP_TIMEOUT));
        if let Some(event) = events.first() {
            assert_eq!(event.event, UpdateEvent::NotifyAlive);
            assert_eq!(event.service.unique_service_name, "mystery");
            break;
        }
        assert!(
            begin.elapsed() < DEADLINE,
            "nts-less notify never arrived"
        );
    }
}

#[test]
#[serial]
#[cfg_attr(miri, ignore)]
fn idle_check_returns_true_with_no_events() {
    let url = discovery_url(29615);
    let mut finder =
        ServiceFinder::new(&url, "MyTest", "1.1", None, None).unwrap();

    let mut calls = 0;
    let begin = Instant::now();
    let ok = finder
        .check_for_services(|_| calls += 1, Duration::from_millis(250));
    let elapsed = begin.elapsed();

    assert!(ok);
    assert_eq!(calls, 0);
    assert!(elapsed >= Duration::from_millis(250));
    assert!(elapsed < Duration::from_millis(450));
}
