use ferrule::net::{ListenOptions, connect_tcp, connect_unix, listen_tcp, listen_unix, stream_pair};
use ferrule::task::spawn;
use ferrule::{Error, yield_now};

use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

#[ferrule::test]
async fn test_connect_refused_reports_os_error() {
    // Grab a free port, then stop listening on it.
    let listener = listen_tcp("127.0.0.1:0".parse::<SocketAddr>().unwrap(), ListenOptions::new())
        .await
        .expect("listen");
    let port = listener.address().expect("address").port().expect("port");
    listener.close().await;

    let err = connect_tcp("127.0.0.1", port).await.unwrap_err();

    assert!(matches!(err, Error::ConnectionFailed { .. } | Error::Io(_)));
    assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
}

#[ferrule::test]
async fn test_close_wakes_pending_receive() {
    let (a, b) = stream_pair().expect("socketpair");
    let a = Arc::new(a);

    let reader = a.clone();
    let task = spawn(async move { reader.receive_some(16).await });

    for _ in 0..4 {
        yield_now().await;
    }

    a.close().await;

    assert!(matches!(task.await, Err(Error::ClosedResource)));
    drop(b);
}

#[ferrule::test]
async fn test_operations_after_close_fail() {
    let (a, _b) = stream_pair().expect("socketpair");
    let socket = a.socket();

    socket.close().await;
    socket.close().await;

    assert!(socket.is_closed());
    assert!(matches!(socket.recv(1).await, Err(Error::ClosedResource)));
    assert!(matches!(socket.send(b"x").await, Err(Error::ClosedResource)));
    assert!(matches!(socket.peek(1).await, Err(Error::ClosedResource)));
    assert!(matches!(socket.local_addr(), Err(Error::ClosedResource)));
    assert!(matches!(a.receive_until(b"\n", 8).await, Err(Error::ClosedResource)));
}

#[ferrule::test]
async fn test_peer_close_reads_as_end_of_stream() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"last").await.expect("send");
    a.socket().shutdown(Shutdown::Write).expect("shutdown");

    assert_eq!(b.receive_some(16).await.expect("data"), b"last");
    assert!(b.receive_some(16).await.expect("eof").is_empty());
}

#[ferrule::test]
async fn test_tcp_stream_options() {
    let listener = listen_tcp("127.0.0.1:0".parse::<SocketAddr>().unwrap(), ListenOptions::new())
        .await
        .expect("listen");
    let port = listener.address().expect("address").port().expect("port");

    let client = connect_tcp("127.0.0.1", port).await.expect("connect");
    client.socket().set_nodelay(true).expect("nodelay");

    let server = listener.accept().await.expect("accept");
    assert_eq!(server.local_addr().expect("local"), listener.address().expect("address"));
}

#[ferrule::test(worker_threads = 2)]
async fn test_unix_listener_round_trip() {
    let path = std::env::temp_dir().join(format!("ferrule-listen-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let listener = listen_unix(&path, ListenOptions::new()).await.expect("listen");

    let server = spawn(async move {
        let stream = listener.accept().await.expect("accept");
        let line = stream.receive_until(b"\n", 64).await.expect("line");
        stream.send_all(&line).await.expect("echo");
    });

    let client = connect_unix(&path).await.expect("connect");
    client.send_all(b"over unix\n").await.expect("send");
    assert_eq!(client.receive_exactly(9).await.expect("echo"), b"over unix");

    server.await;
    std::fs::remove_file(&path).expect("cleanup");
}
