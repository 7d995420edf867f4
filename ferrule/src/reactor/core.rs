use super::command::Command;
use super::event::Event;
use super::io::{CLOSED, IoEntry, READY};
use super::poller::{Poller, Waker};

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SendError, Sender, TryRecvError, channel};
use std::thread;

/// The reactor.
///
/// Runs on a dedicated thread, owns the poller and the table of waiting
/// tasks, and is driven by [`Command`]s sent through a [`ReactorHandle`].
pub(crate) struct Reactor {
    receiver: Receiver<Command>,
    poller: Poller,
    events: Vec<Event>,
    io: HashMap<RawFd, IoEntry>,
}

/// Cloneable handle used by tasks to talk to the reactor thread.
#[derive(Clone)]
pub(crate) struct ReactorHandle {
    sender: Sender<Command>,
    waker: Arc<Waker>,
}

impl ReactorHandle {
    /// Sends a command and interrupts the poller so it is seen promptly.
    pub(crate) fn send(&self, cmd: Command) -> Result<(), SendError<Command>> {
        let result = self.sender.send(cmd);
        self.waker.wake();
        result
    }
}

impl Reactor {
    fn new(receiver: Receiver<Command>, poller: Poller) -> Self {
        Self {
            receiver,
            poller,
            events: Vec::with_capacity(64),
            io: HashMap::new(),
        }
    }

    /// Starts the reactor thread, named `{prefix}-reactor`.
    pub(crate) fn start(prefix: &str) -> io::Result<(ReactorHandle, thread::JoinHandle<()>)> {
        let (sender, receiver) = channel();
        let poller = Poller::new()?;
        let waker = poller.waker();

        let thread = thread::Builder::new()
            .name(format!("{prefix}-reactor"))
            .spawn(move || {
                let mut reactor = Reactor::new(receiver, poller);

                if let Err(err) = reactor.run() {
                    tracing::error!(error = %err, "reactor stopped");
                }

                reactor.close_everything();
            })?;

        Ok((ReactorHandle { sender, waker }, thread))
    }

    /// Main loop: dispatch events, apply commands, then block in the poller.
    fn run(&mut self) -> io::Result<()> {
        loop {
            let events: Vec<Event> = self.events.drain(..).collect();
            for event in events {
                self.handle_event(event);
            }

            loop {
                match self.receiver.try_recv() {
                    Ok(Command::Register {
                        fd,
                        interest,
                        waiter,
                    }) => {
                        self.io.entry(fd).or_default().add(interest, waiter);
                        self.sync(fd);
                    }
                    Ok(Command::Close { fd }) => {
                        if let Some(entry) = self.io.remove(&fd) {
                            if entry.registered.is_some() {
                                self.poller.deregister(fd);
                            }
                            entry.close_all();
                        }
                        tracing::trace!(fd, "descriptor closed");
                    }
                    Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return Ok(()),
                    Err(TryRecvError::Empty) => break,
                }
            }

            self.poller.poll(&mut self.events, None)?;
        }
    }

    fn handle_event(&mut self, event: Event) {
        if let Some(entry) = self.io.get_mut(&event.fd) {
            entry.fire(event.readable, event.writable);
            self.sync(event.fd);
        }
    }

    /// Brings the poller registration of `fd` in line with its waiters.
    fn sync(&mut self, fd: RawFd) {
        let Some(entry) = self.io.get_mut(&fd) else {
            return;
        };

        let desired = entry.desired();

        if desired.is_empty() {
            if entry.registered.is_some() {
                self.poller.deregister(fd);
            }
            self.io.remove(&fd);
            return;
        }

        let result = match entry.registered {
            None => self.poller.register(fd, desired),
            Some(current) if current != desired => self.poller.reregister(fd, desired),
            Some(_) => Ok(()),
        };

        match result {
            Ok(()) => entry.registered = Some(desired),
            Err(err) => {
                // The waiters retry their syscall, which reports the real error;
                // a descriptor that no longer exists is reported as closed.
                let outcome = if err.raw_os_error() == Some(libc::EBADF) {
                    CLOSED
                } else {
                    READY
                };

                tracing::warn!(fd, error = %err, "failed to watch descriptor");

                if let Some(entry) = self.io.remove(&fd) {
                    if outcome == CLOSED {
                        entry.close_all();
                    } else {
                        let mut entry = entry;
                        entry.fire(true, true);
                    }
                }
            }
        }
    }

    /// Fails every remaining waiter once the loop has exited.
    fn close_everything(&mut self) {
        for (fd, entry) in self.io.drain() {
            if entry.registered.is_some() {
                self.poller.deregister(fd);
            }
            entry.close_all();
        }

        while let Ok(cmd) = self.receiver.try_recv() {
            if let Command::Register { waiter, .. } = cmd {
                waiter.complete(CLOSED);
            }
        }
    }
}
