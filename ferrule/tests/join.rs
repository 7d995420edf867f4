use ferrule::net::stream_pair;
use ferrule::{RuntimeBuilder, join};

#[test]
fn test_join_single_future() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async { join!(async { 42 }) });

    assert_eq!(result, 42);
}

#[test]
fn test_join_different_types() {
    let rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async {
        join!(async { "hello" }, async { 42 }, async { vec![1, 2, 3] },)
    });

    assert_eq!(result, ("hello", 42, vec![1, 2, 3]));
}

#[test]
fn test_join_send_and_receive_on_one_task() {
    let rt = RuntimeBuilder::new().worker_threads(1).build();

    let received = rt.block_on(async {
        let (a, b) = stream_pair().expect("socketpair");
        let payload = vec![7u8; 1 << 20];

        // Far more than the socket buffer: both sides must make progress
        // from the same task.
        let (sent, received) = join!(a.send_all(&payload), b.receive_exactly(payload.len()));

        sent.expect("send");
        received.expect("receive")
    });

    assert_eq!(received.len(), 1 << 20);
    assert!(received.iter().all(|b| *b == 7));
}
