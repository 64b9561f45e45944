// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Level-triggered readiness multiplexer.
//!
//! A `Poller` watches file descriptors (and other mio sources such as
//! signals) and a list of timeout callbacks. Each `wait` performs one poll
//! round: ready events are handed to the dispatcher one by one, keyed by
//! token; when the round times out or is interrupted by a signal, the
//! timeout list fires instead. Registration state lives in a `Registrar`
//! handle that dispatch callbacks may use to add or remove watches from
//! inside the event loop (accept paths register the connections they just
//! accepted). A poller is single-threaded; cross-thread signalling uses
//! `mio::Waker`s created against its registry.

use std::collections::HashMap;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::os::fd::RawFd;
use std::sync::Mutex;
use std::time::Duration;

use mio::event::{Event, Source};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token, Waker};

/// Watch-mask bits. `IN`/`OUT`/`PRI` select interest when registering;
/// `ERR`/`HUP`/`RD_HUP` only appear in delivered events; `ONESHOT` makes a
/// registration auto-unregister after its first fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watch(u32);

impl Watch {
    pub const NONE: Watch = Watch(0);
    pub const IN: Watch = Watch(1 << 0);
    pub const OUT: Watch = Watch(1 << 1);
    pub const PRI: Watch = Watch(1 << 2);
    pub const ERR: Watch = Watch(1 << 3);
    pub const HUP: Watch = Watch(1 << 4);
    pub const RD_HUP: Watch = Watch(1 << 5);
    pub const ONESHOT: Watch = Watch(1 << 6);

    pub fn contains(self, other: Watch) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn interest(self) -> Option<Interest> {
        let mut acc: Option<Interest> = None;
        let mut add = |i: Interest| {
            acc = Some(match acc {
                Some(a) => a | i,
                None => i,
            });
        };
        if self.contains(Watch::IN) {
            add(Interest::READABLE);
        }
        if self.contains(Watch::OUT) {
            add(Interest::WRITABLE);
        }
        if self.contains(Watch::PRI) {
            add(Interest::PRIORITY);
        }
        acc
    }
}

impl BitOr for Watch {
    type Output = Watch;
    fn bitor(self, rhs: Watch) -> Watch {
        Watch(self.0 | rhs.0)
    }
}

impl BitOrAssign for Watch {
    fn bitor_assign(&mut self, rhs: Watch) {
        self.0 |= rhs.0;
    }
}

fn watch_from_event(event: &Event) -> Watch {
    let mut w = Watch::NONE;
    if event.is_readable() {
        w |= Watch::IN;
    }
    if event.is_writable() {
        w |= Watch::OUT;
    }
    if event.is_priority() {
        w |= Watch::PRI;
    }
    if event.is_error() {
        w |= Watch::ERR;
    }
    if event.is_read_closed() {
        w |= Watch::RD_HUP;
    }
    if event.is_write_closed() {
        w |= Watch::HUP;
    }
    w
}

/// Handle for a registered timeout callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutId(u32);

/// Receives poll results. Implemented by the owning event loop.
pub trait PollDispatch {
    /// A watched descriptor became ready.
    fn ready(&mut self, reg: &Registrar, token: Token, events: Watch);

    /// A wait round ended with no events (timeout or signal interrupt).
    fn timeout(&mut self, reg: &Registrar, id: TimeoutId);
}

#[derive(Clone, Copy)]
struct FdEntry {
    fd: RawFd,
    oneshot: bool,
}

/// Registration front of a poller, usable from inside dispatch callbacks.
pub struct Registrar {
    registry: Registry,
    fds: Mutex<HashMap<Token, FdEntry>>,
}

impl Registrar {
    /// Watch a raw descriptor. The token comes back with every ready event.
    pub fn register(&self, fd: RawFd, mask: Watch, token: Token) -> io::Result<()> {
        let interest = mask
            .interest()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty watch mask"))?;
        self.registry
            .register(&mut SourceFd(&fd), token, interest)?;
        let entry = FdEntry {
            fd,
            oneshot: mask.contains(Watch::ONESHOT),
        };
        self.fds.lock().unwrap().insert(token, entry);
        Ok(())
    }

    /// Change the watch mask of a registered descriptor.
    pub fn reregister(&self, fd: RawFd, mask: Watch, token: Token) -> io::Result<()> {
        let interest = mask
            .interest()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty watch mask"))?;
        self.registry
            .reregister(&mut SourceFd(&fd), token, interest)?;
        let entry = FdEntry {
            fd,
            oneshot: mask.contains(Watch::ONESHOT),
        };
        self.fds.lock().unwrap().insert(token, entry);
        Ok(())
    }

    /// Stop watching a descriptor registered with [`Registrar::register`].
    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        let mut fds = self.fds.lock().unwrap();
        let token = fds
            .iter()
            .find(|(_, e)| e.fd == fd)
            .map(|(t, _)| *t)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "descriptor not registered")
            })?;
        fds.remove(&token);
        drop(fds);
        self.registry.deregister(&mut SourceFd(&fd))
    }

    /// Watch a non-fd source (signals). Caller keeps the source and must
    /// deregister it through [`Registrar::deregister_source`].
    pub fn register_source(
        &self,
        source: &mut impl Source,
        mask: Watch,
        token: Token,
    ) -> io::Result<()> {
        let interest = mask
            .interest()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty watch mask"))?;
        self.registry.register(source, token, interest)
    }

    pub fn deregister_source(&self, source: &mut impl Source) -> io::Result<()> {
        self.registry.deregister(source)
    }

    /// A cross-thread wake handle that fires the given token on this poller.
    pub fn waker(&self, token: Token) -> io::Result<Waker> {
        Waker::new(&self.registry, token)
    }

    /// Drops a one-shot registration after its first fire.
    fn complete(&self, token: Token) {
        let mut fds = self.fds.lock().unwrap();
        let remove = matches!(fds.get(&token), Some(e) if e.oneshot);
        if remove {
            if let Some(entry) = fds.remove(&token) {
                let _ = self.registry.deregister(&mut SourceFd(&entry.fd));
            }
        }
    }
}

pub struct Poller {
    poll: Poll,
    events: Events,
    registrar: Registrar,
    timeouts: Vec<TimeoutId>,
    next_timeout: u32,
}

impl Poller {
    pub fn new(max_events: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let registrar = Registrar {
            registry: poll.registry().try_clone()?,
            fds: Mutex::new(HashMap::new()),
        };
        Ok(Self {
            poll,
            events: Events::with_capacity(max_events),
            registrar,
            timeouts: Vec::new(),
            next_timeout: 0,
        })
    }

    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    pub fn register(&self, fd: RawFd, mask: Watch, token: Token) -> io::Result<()> {
        self.registrar.register(fd, mask, token)
    }

    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        self.registrar.unregister(fd)
    }

    /// Add a timeout callback. All registered timeouts fire on every quiet
    /// or interrupted wait round.
    pub fn register_timeout(&mut self) -> TimeoutId {
        let id = TimeoutId(self.next_timeout);
        self.next_timeout += 1;
        self.timeouts.push(id);
        id
    }

    pub fn unregister_timeout(&mut self, id: TimeoutId) {
        self.timeouts.retain(|t| *t != id);
    }

    /// One poll round. Ready events are dispatched in kernel order; a round
    /// with no events (elapsed timeout or EINTR) runs the timeout list.
    /// Errors other than interrupt terminate the wait with failure.
    pub fn wait(
        &mut self,
        timeout: Option<Duration>,
        dispatch: &mut impl PollDispatch,
    ) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                for id in self.timeouts.clone() {
                    dispatch.timeout(&self.registrar, id);
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        if self.events.is_empty() {
            for id in self.timeouts.clone() {
                dispatch.timeout(&self.registrar, id);
            }
            return Ok(());
        }

        // Snapshot first: dispatch may register or unregister sources.
        let fired: Vec<(Token, Watch)> = self
            .events
            .iter()
            .map(|e| (e.token(), watch_from_event(e)))
            .collect();
        for (token, events) in fired {
            dispatch.ready(&self.registrar, token, events);
            self.registrar.complete(token);
        }
        Ok(())
    }
}
