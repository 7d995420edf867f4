use ferrule::RuntimeBuilder;
use ferrule::net::stream_pair;
use ferrule::task::spawn;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[test]
fn test_single_worker_interleaves_reader_and_writer() {
    let rt = RuntimeBuilder::new().worker_threads(1).build();

    let received = rt.block_on(async {
        let (a, b) = stream_pair().expect("socketpair");

        // The reader suspends first; the only worker must still run the writer.
        let reader = spawn(async move { b.receive_exactly(5).await });

        a.send_all(b"hello").await.expect("send");
        reader.await.expect("receive")
    });

    assert_eq!(received, b"hello");
}

#[test]
fn test_multiple_worker_threads_echo_many_pairs() {
    let rt = RuntimeBuilder::new().worker_threads(4).build();

    let seen = Arc::new(Mutex::new(HashSet::new()));
    let seen_clone = seen.clone();

    rt.block_on(async move {
        let handles: Vec<_> = (0..16u8)
            .map(|i| {
                let seen = seen_clone.clone();

                spawn(async move {
                    let (client, server) = stream_pair().expect("socketpair");

                    let echo = spawn(async move {
                        let byte = server.receive_exactly(1).await.expect("server read");
                        server.send_all(&byte).await.expect("server write");
                    });

                    client.send_all(&[i]).await.expect("client write");
                    let reply = client.receive_exactly(1).await.expect("client read");
                    echo.await;

                    seen.lock().unwrap().insert(reply[0]);
                })
            })
            .collect();

        for handle in handles {
            handle.await;
        }
    });

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 16);
    for i in 0..16u8 {
        assert!(seen.contains(&i), "pair {i} should have echoed");
    }
}

#[test]
fn test_worker_threads_chain_spawn() {
    let rt = RuntimeBuilder::new().worker_threads(2).build();

    let result = rt.block_on(async {
        let outer = spawn(async {
            let inner = spawn(async { 10 });
            inner.await + 20
        });
        outer.await + 30
    });

    assert_eq!(result, 60);
}

#[test]
#[should_panic(expected = "worker_threads must be > 0")]
fn test_worker_threads_zero_panics() {
    let _ = RuntimeBuilder::new().worker_threads(0).build();
}

#[test]
fn test_sequential_runtimes() {
    for n in 1..=3 {
        let rt = RuntimeBuilder::new().worker_threads(n).build();

        let result = rt.block_on(async move {
            let (a, b) = stream_pair().expect("socketpair");
            a.send_all(&[n as u8]).await.expect("send");
            b.receive_exactly(1).await.expect("receive")[0] as usize
        });

        assert_eq!(result, n);
        drop(rt);
    }
}
