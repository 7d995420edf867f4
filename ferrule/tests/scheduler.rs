use ferrule::net::{Address, NonBlockingSocket};
use ferrule::{Error, Handle, Result, Scheduler, join, yield_now};

use std::future::Future;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Readable(RawFd),
    Writable(RawFd),
    Close { fd: RawFd, open: bool },
    Offload,
}

/// Delegates to the runtime handle and records every hook invoked.
#[derive(Clone)]
struct Recording {
    inner: Handle,
    calls: Arc<Mutex<Vec<Call>>>,
    cancelled: bool,
}

impl Recording {
    fn new() -> Self {
        Self {
            inner: Handle::current(),
            calls: Arc::new(Mutex::new(Vec::new())),
            cancelled: false,
        }
    }

    fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::new()
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Scheduler for Recording {
    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled {
            return Err(Error::Cancelled);
        }

        self.inner.check_cancelled()
    }

    fn wait_readable(&self, fd: RawFd) -> impl Future<Output = Result<()>> + Send {
        self.record(Call::Readable(fd));
        self.inner.wait_readable(fd)
    }

    fn wait_writable(&self, fd: RawFd) -> impl Future<Output = Result<()>> + Send {
        self.record(Call::Writable(fd));
        self.inner.wait_writable(fd)
    }

    fn notify_close(&self, fd: RawFd) -> impl Future<Output = ()> + Send {
        let open = fd_is_open(fd);
        self.record(Call::Close { fd, open });
        self.inner.notify_close(fd)
    }

    fn run_in_thread<F, T>(&self, f: F) -> impl Future<Output = Result<T>> + Send
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.record(Call::Offload);
        self.inner.run_in_thread(f)
    }
}

fn fd_is_open(fd: RawFd) -> bool {
    unsafe { libc::fcntl(fd, libc::F_GETFD) >= 0 }
}

fn is_nonblocking(fd: RawFd) -> bool {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    flags >= 0 && flags & libc::O_NONBLOCK != 0
}

fn raw_socket(domain: libc::c_int, kind: libc::c_int) -> OwnedFd {
    let fd = unsafe { libc::socket(domain, kind | libc::SOCK_CLOEXEC, 0) };
    assert!(fd >= 0, "socket: {}", io::Error::last_os_error());

    unsafe { OwnedFd::from_raw_fd(fd) }
}

fn recording_pair(scheduler: &Recording) -> (NonBlockingSocket<Recording>, NonBlockingSocket<Recording>) {
    let (a, b) = UnixStream::pair().expect("socketpair");

    (
        NonBlockingSocket::with_scheduler(OwnedFd::from(a), scheduler.clone()).expect("adopt a"),
        NonBlockingSocket::with_scheduler(OwnedFd::from(b), scheduler.clone()).expect("adopt b"),
    )
}

#[ferrule::test]
async fn test_adopted_socket_is_nonblocking() {
    let scheduler = Recording::new();
    let (a, b) = recording_pair(&scheduler);

    assert!(is_nonblocking(a.raw_fd().expect("fd")));
    assert!(is_nonblocking(b.raw_fd().expect("fd")));
}

#[ferrule::test]
async fn test_close_notifies_before_releasing_handle() {
    let scheduler = Recording::new();
    let (a, _b) = recording_pair(&scheduler);
    let fd = a.raw_fd().expect("fd");

    a.close().await;
    a.close().await;

    assert_eq!(scheduler.calls(), vec![Call::Close { fd, open: true }]);
    assert!(a.is_closed());
    assert!(a.raw_fd().is_none());
}

#[ferrule::test]
async fn test_drop_notifies_scheduler() {
    let scheduler = Recording::new();
    let (a, b) = recording_pair(&scheduler);
    let fd = a.raw_fd().expect("fd");

    drop(a);

    assert_eq!(scheduler.calls(), vec![Call::Close { fd, open: true }]);
    drop(b);
}

#[ferrule::test]
async fn test_would_block_suspends_on_readable() {
    let scheduler = Recording::new();
    let (a, b) = recording_pair(&scheduler);
    let fd = a.raw_fd().expect("fd");

    let (received, sent) = join!(a.recv(16), async {
        yield_now().await;
        b.send(b"x").await
    });

    assert_eq!(received.expect("recv"), b"x");
    assert_eq!(sent.expect("send"), 1);
    assert!(scheduler.calls().contains(&Call::Readable(fd)));
}

#[ferrule::test]
async fn test_pending_wait_is_registered_before_close() {
    let scheduler = Recording::new();
    let (a, _b) = recording_pair(&scheduler);
    let fd = a.raw_fd().expect("fd");

    let (received, ()) = join!(a.recv(16), async {
        yield_now().await;
        a.close().await
    });

    assert!(matches!(received, Err(Error::ClosedResource)));
    assert_eq!(
        scheduler.calls(),
        vec![Call::Readable(fd), Call::Close { fd, open: true }]
    );
}

#[ferrule::test]
async fn test_wait_sees_close_sent_before_first_poll() {
    let handle = Handle::current();
    let (a, _b) = UnixStream::pair().expect("socketpair");
    let fd = a.as_raw_fd();

    let wait = handle.wait_readable(fd);
    handle.notify_close(fd).await;
    drop(a);

    // Likely takes the number just released; the wait must not follow it.
    let (c, d) = UnixStream::pair().expect("socketpair");

    assert!(matches!(wait.await, Err(Error::ClosedResource)));
    drop((c, d));
}

#[ferrule::test]
async fn test_ready_operations_do_not_suspend() {
    let scheduler = Recording::new();
    let (a, b) = recording_pair(&scheduler);

    a.sendall(b"data").await.expect("send");
    assert_eq!(b.recv(16).await.expect("recv"), b"data");

    assert!(scheduler.calls().is_empty());
}

#[ferrule::test]
async fn test_unix_path_bind_is_offloaded() {
    let scheduler = Recording::new();
    let socket = NonBlockingSocket::with_scheduler(
        raw_socket(libc::AF_UNIX, libc::SOCK_STREAM),
        scheduler.clone(),
    )
    .expect("adopt");

    let path = std::env::temp_dir().join(format!("ferrule-bind-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);

    socket.bind(Address::unix(&path)).await.expect("bind");

    assert_eq!(scheduler.calls(), vec![Call::Offload]);
    assert_eq!(socket.local_addr().expect("address"), Address::unix(&path));

    std::fs::remove_file(&path).expect("cleanup");
}

#[ferrule::test]
async fn test_ip_bind_runs_inline() {
    let scheduler = Recording::new();
    let socket = NonBlockingSocket::with_scheduler(
        raw_socket(libc::AF_INET, libc::SOCK_DGRAM),
        scheduler.clone(),
    )
    .expect("adopt");

    let address: Address = "127.0.0.1:0".parse().expect("address");
    socket.bind(address).await.expect("bind");

    assert!(scheduler.calls().is_empty());
    assert_ne!(socket.local_addr().expect("address").port(), Some(0));
}

#[ferrule::test]
async fn test_cancelled_scheduler_short_circuits_every_operation() {
    let scheduler = Recording::cancelled();
    let (a, _b) = recording_pair(&scheduler);

    assert!(matches!(a.recv(16).await, Err(Error::Cancelled)));
    assert!(matches!(a.send(b"x").await, Err(Error::Cancelled)));
    assert!(matches!(a.sendall(b"x").await, Err(Error::Cancelled)));
    assert!(matches!(a.peek(1).await, Err(Error::Cancelled)));
    assert!(matches!(a.accept().await, Err(Error::Cancelled)));
    assert!(matches!(
        a.connect(Address::unix("/nonexistent")).await,
        Err(Error::Cancelled)
    ));

    // Nothing reached the OS, so nothing had to wait.
    assert!(scheduler.calls().is_empty());
    assert!(!a.is_closed());
}
