use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener},
    thread,
    time::Duration,
};

use conveyor_network::{ConnectRetry, NetError, Session};

#[test]
fn connect_gives_up_after_the_attempt_cap() {
    // Bind then drop to find a port nothing is listening on.
    let addr = {
        let probe = TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).unwrap();
        probe.local_addr().unwrap()
    };

    let retry = ConnectRetry { delay: Duration::from_millis(10), max_attempts: Some(3) };
    let mut session = Session::new(retry).unwrap();
    match session.connect(addr) {
        Err(NetError::Io(err)) => {
            assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
        }
        other => panic!("expected refused connect, got {other:?}"),
    }
    assert!(!session.is_connected());
}

#[test]
fn connect_retries_until_the_listener_appears() {
    let addr = {
        let probe = TcpListener::bind((IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).unwrap();
        probe.local_addr().unwrap()
    };

    let server = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        let listener = TcpListener::bind(addr).unwrap();
        let (_stream, _) = listener.accept().unwrap();
    });

    let retry = ConnectRetry { delay: Duration::from_millis(50), max_attempts: Some(100) };
    let mut session = Session::new(retry).unwrap();
    session.connect(addr).unwrap();
    assert!(session.is_connected());
    server.join().unwrap();
}
