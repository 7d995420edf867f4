use ferrule::net::{ListenOptions, connect_tcp, listen_tcp};
use ferrule::task::spawn;
use ferrule::{Error, yield_now};

use std::net::SocketAddr;
use std::sync::Arc;

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[ferrule::test]
async fn test_listener_reports_bound_address() {
    let listener = listen_tcp(loopback(), ListenOptions::new()).await.expect("listen");
    let address = listener.address().expect("address");

    assert_ne!(address.port(), Some(0));
    assert_eq!(address.as_inet().map(|a| a.ip()), Some([127, 0, 0, 1].into()));
}

#[ferrule::test(worker_threads = 2)]
async fn test_accept_reports_peer_address() {
    let listener = listen_tcp(loopback(), ListenOptions::new().backlog(16))
        .await
        .expect("listen");
    let port = listener.address().expect("address").port().expect("port");

    let client = connect_tcp("127.0.0.1", port).await.expect("connect");
    let accepted = listener.accept().await.expect("accept");

    assert_eq!(
        accepted.peer_addr().expect("peer"),
        client.local_addr().expect("local")
    );
    assert!(!accepted.is_tls());
}

#[ferrule::test(worker_threads = 2)]
async fn test_accept_connections_until_closed() {
    let listener = Arc::new(listen_tcp(loopback(), ListenOptions::new()).await.expect("listen"));
    let port = listener.address().expect("address").port().expect("port");

    let acceptor = listener.clone();
    let server = spawn(async move {
        let mut served = 0;
        let mut incoming = acceptor.accept_connections();

        while let Some(stream) = incoming.next().await {
            let stream = stream.expect("accept");
            let byte = stream.receive_exactly(1).await.expect("read");
            stream.send_all(&byte).await.expect("echo");
            served += 1;
        }

        served
    });

    for i in 0..3u8 {
        let client = connect_tcp("127.0.0.1", port).await.expect("connect");
        client.send_all(&[i]).await.expect("send");
        assert_eq!(client.receive_exactly(1).await.expect("echo"), [i]);
    }

    listener.close().await;

    assert_eq!(server.await, 3);
}

#[ferrule::test]
async fn test_cancelled_accept_ends_sequence() {
    let listener = Arc::new(listen_tcp(loopback(), ListenOptions::new()).await.expect("listen"));

    let acceptor = listener.clone();
    let server = spawn(async move {
        let mut incoming = acceptor.accept_connections();
        let first = incoming.next().await;
        let second = incoming.next().await;

        (matches!(first, Some(Err(Error::Cancelled))), second.is_none())
    });

    for _ in 0..4 {
        yield_now().await;
    }

    server.cancel();

    assert_eq!(server.await, (true, true));
    assert!(!listener.socket().is_closed());
}

#[ferrule::test]
async fn test_accept_after_close_fails() {
    let listener = listen_tcp(loopback(), ListenOptions::new()).await.expect("listen");
    listener.close().await;

    assert!(matches!(listener.accept().await, Err(Error::ClosedResource)));
    assert!(listener.accept_connections().next().await.is_none());
}
