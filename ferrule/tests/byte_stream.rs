use ferrule::net::stream_pair;
use ferrule::task::spawn;
use ferrule::{Error, RuntimeBuilder, yield_now};

use std::io;

#[ferrule::test]
async fn test_receive_until_returns_prefix_and_leaves_rest() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"hello\nworld").await.expect("send");

    let line = b.receive_until(b"\n", 1024).await.expect("line");
    assert_eq!(line, b"hello");

    let rest = b.receive_some(1024).await.expect("rest");
    assert_eq!(rest, b"world");
}

#[ferrule::test]
async fn test_receive_exactly_reports_incomplete_read() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"ab").await.expect("send");
    a.close().await;

    match b.receive_exactly(3).await {
        Err(Error::IncompleteRead(data)) => assert_eq!(data, b"ab"),
        other => panic!("expected IncompleteRead, got {other:?}"),
    }
}

#[ferrule::test]
async fn test_receive_until_reports_incomplete_read_at_eof() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"ab").await.expect("send");
    a.close().await;

    let err = b.receive_until(b"\n", 16).await.unwrap_err();
    assert_eq!(err.partial_data(), Some(&b"ab"[..]));
    assert!(matches!(err, Error::IncompleteRead(_)));
}

#[ferrule::test]
async fn test_delimiter_not_found_carries_scanned_bytes() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"abcdefgh").await.expect("send");

    match b.receive_until(b"\n", 5).await {
        Err(Error::DelimiterNotFound(data)) => assert_eq!(data, b"abcde"),
        other => panic!("expected DelimiterNotFound, got {other:?}"),
    }

    // Exactly the scanned bytes were consumed.
    assert_eq!(b.receive_some(16).await.expect("rest"), b"fgh");
}

#[test]
fn test_delimiter_not_found_after_several_reads() {
    let rt = RuntimeBuilder::new().worker_threads(1).build();

    let (err, next) = rt.block_on(async {
        let (a, b) = stream_pair().expect("socketpair");

        a.send_all(b"abc").await.expect("first part");

        let reader = spawn(async move {
            let err = b.receive_until(b"\n", 5).await.unwrap_err();
            let next = b.receive_exactly(1).await.expect("next");
            (err, next)
        });

        // Let the reader scan the first part before the rest arrives.
        for _ in 0..4 {
            yield_now().await;
        }

        a.send_all(b"defgh").await.expect("second part");
        reader.await
    });

    match err {
        Error::DelimiterNotFound(data) => assert_eq!(data, b"abcde"),
        other => panic!("expected DelimiterNotFound, got {other:?}"),
    }
    assert_eq!(next, b"f");
}

#[ferrule::test]
async fn test_larger_bound_on_fresh_stream_repeats_the_scan() {
    let content = b"abcdefgh\nrest";

    let (a, b) = stream_pair().expect("socketpair");
    a.send_all(content).await.expect("send");

    let scanned = match b.receive_until(b"\n", 5).await {
        Err(Error::DelimiterNotFound(data)) => data,
        other => panic!("expected DelimiterNotFound, got {other:?}"),
    };

    let (a, b) = stream_pair().expect("socketpair");
    a.send_all(content).await.expect("send");

    let line = b.receive_until(b"\n", 64).await.expect("line");

    assert_eq!(scanned, b"abcde");
    assert!(line.starts_with(&scanned));
    assert_eq!(line, b"abcdefgh");
    assert_eq!(b.receive_some(16).await.expect("rest"), b"rest");
}

#[ferrule::test]
async fn test_huge_bounds_are_not_allocated_up_front() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"hello\nworld").await.expect("send");

    assert_eq!(b.receive_until(b"\n", usize::MAX).await.expect("line"), b"hello");
    assert_eq!(b.receive_some(1 << 40).await.expect("rest"), b"world");

    a.send_all(b"tail").await.expect("send");
    a.close().await;

    match b.receive_exactly(usize::MAX).await {
        Err(Error::IncompleteRead(data)) => assert_eq!(data, b"tail"),
        other => panic!("expected IncompleteRead, got {other:?}"),
    }
}

#[ferrule::test]
async fn test_zero_max_size_scans_nothing() {
    let (_a, b) = stream_pair().expect("socketpair");

    match b.receive_until(b"\n", 0).await {
        Err(Error::DelimiterNotFound(data)) => assert!(data.is_empty()),
        other => panic!("expected DelimiterNotFound, got {other:?}"),
    }
}

#[ferrule::test]
async fn test_empty_delimiter_is_rejected() {
    let (_a, b) = stream_pair().expect("socketpair");

    match b.receive_until(b"", 16).await {
        Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn test_delimiter_straddling_two_reads() {
    let rt = RuntimeBuilder::new().worker_threads(1).build();

    let (line, rest) = rt.block_on(async {
        let (a, b) = stream_pair().expect("socketpair");

        a.send_all(b"abc\r").await.expect("first half");

        let reader = spawn(async move {
            let line = b.receive_until(b"\r\n", 64).await.expect("line");
            let rest = b.receive_exactly(3).await.expect("rest");
            (line, rest)
        });

        // Let the reader scan the first half before the rest arrives.
        for _ in 0..4 {
            yield_now().await;
        }

        a.send_all(b"\ndef").await.expect("second half");
        reader.await
    });

    assert_eq!(line, b"abc");
    assert_eq!(rest, b"def");
}

#[ferrule::test]
async fn test_receive_exactly_survives_fragmentation() {
    let (a, b) = stream_pair().expect("socketpair");

    let writer = spawn(async move {
        for byte in b"fragmented" {
            a.send_all(&[*byte]).await.expect("send");
            yield_now().await;
        }
        a
    });

    let data = b.receive_exactly(10).await.expect("receive");
    assert_eq!(data, b"fragmented");

    writer.await;
}

#[ferrule::test]
async fn test_receive_until_survives_fragmentation() {
    let (a, b) = stream_pair().expect("socketpair");

    let writer = spawn(async move {
        for byte in b"one--two--" {
            a.send_all(&[*byte]).await.expect("send");
            yield_now().await;
        }
        a
    });

    assert_eq!(b.receive_until(b"--", 64).await.expect("first"), b"one");
    assert_eq!(b.receive_until(b"--", 64).await.expect("second"), b"two");

    writer.await;
}

#[ferrule::test]
async fn test_receive_chunks_ends_at_eof() {
    let (a, b) = stream_pair().expect("socketpair");

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let writer = spawn(async move {
        a.send_all(&payload).await.expect("send");
        a.close().await;
    });

    let mut received = Vec::new();
    let mut chunks = b.receive_chunks(1000);

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.expect("chunk");
        assert!(!chunk.is_empty());
        assert!(chunk.len() <= 1000);
        received.extend_from_slice(&chunk);
    }

    assert!(chunks.next().await.is_none());
    assert_eq!(received, expected);

    writer.await;
}

#[ferrule::test]
async fn test_receive_delimited_chunks() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"a\nbb\nccc\n").await.expect("send");
    a.close().await;

    let mut chunks = b.receive_delimited_chunks(b"\n", 16);
    let mut collected = Vec::new();

    while let Some(chunk) = chunks.next().await {
        collected.push(chunk.expect("chunk"));
    }

    assert_eq!(collected, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
}

#[ferrule::test]
async fn test_receive_delimited_chunks_yields_trailing_partial() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"a\nrest").await.expect("send");
    a.close().await;

    let mut chunks = b.receive_delimited_chunks(b"\n", 16);

    assert_eq!(chunks.next().await.expect("first").expect("chunk"), b"a");

    match chunks.next().await {
        Some(Err(Error::IncompleteRead(data))) => assert_eq!(data, b"rest"),
        other => panic!("expected IncompleteRead, got {other:?}"),
    }

    assert!(chunks.next().await.is_none());
}

#[ferrule::test]
async fn test_send_all_delivers_large_payload() {
    let (a, b) = stream_pair().expect("socketpair");

    // Several times the socket buffer, so sends come back short.
    let payload: Vec<u8> = (0..4 * 1024 * 1024u32).map(|i| (i % 253) as u8).collect();
    let len = payload.len();
    let expected = payload.clone();

    let writer = spawn(async move {
        a.send_all(&payload).await.expect("send");
        a
    });

    let received = b.receive_exactly(len).await.expect("receive");
    assert_eq!(received.len(), len);
    assert!(received == expected);

    writer.await;
}

#[ferrule::test]
async fn test_peek_does_not_consume() {
    let (a, b) = stream_pair().expect("socketpair");

    a.send_all(b"abc").await.expect("send");

    assert_eq!(b.socket().peek(2).await.expect("peek"), b"ab");
    assert_eq!(b.receive_some(16).await.expect("receive"), b"abc");
}
