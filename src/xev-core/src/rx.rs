// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dedicated receive thread.
//!
//! The receiver owns the local UDP socket and its own poller. Every
//! datagram is copied out of a single pre-allocated buffer, pushed onto the
//! shared FIFO in arrival order, and announced to the main thread through a
//! waker. The only state shared with the main thread is that FIFO plus a
//! watchdog counter, behind one mutex. A second waker plus an atomic
//! control word points the other way and carries the terminate request; on
//! terminate the thread signals one final ready ("dying gasp") so the main
//! thread drains whatever is left, then flags itself terminated.

use std::collections::VecDeque;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::net::UdpSocket;
use mio::{Token, Waker};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::poller::{PollDispatch, Poller, Registrar, TimeoutId, Watch};

/// Control word value requesting receiver termination.
pub const TERM_REQUEST: u32 = 0x55;

/// Receive buffer size, one maximum frame.
const RX_BUF_SIZE: usize = 1500;

/// How long the main thread waits for the dying gasp.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

const SOCKET_TOKEN: Token = Token(0);
const CONTROL_TOKEN: Token = Token(1);

#[derive(Debug, Error)]
pub enum RxError {
    #[error("receiver i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("receive thread did not acknowledge terminate within {0:?}")]
    ShutdownTimeout(Duration),
}

#[derive(Default)]
struct Shared {
    queue: VecDeque<String>,
    watchdog: u32,
    terminated: bool,
}

/// Main-thread handle to the receive thread.
pub struct Receiver {
    shared: Arc<(Mutex<Shared>, Condvar)>,
    control: Arc<AtomicU32>,
    control_waker: Arc<Waker>,
    thread: Option<JoinHandle<()>>,
}

struct RxThread {
    socket: UdpSocket,
    buf: [u8; RX_BUF_SIZE],
    shared: Arc<(Mutex<Shared>, Condvar)>,
    control: Arc<AtomicU32>,
    ready: Waker,
    stop: bool,
}

impl PollDispatch for RxThread {
    fn ready(&mut self, _reg: &Registrar, token: Token, _events: Watch) {
        match token {
            SOCKET_TOKEN => self.drain_socket(),
            CONTROL_TOKEN => {
                let val = self.control.load(Ordering::SeqCst);
                debug!(value = val, "rx control word received");
                if val == TERM_REQUEST {
                    self.stop = true;
                }
            }
            other => unreachable!("unknown rx poll token {other:?}"),
        }
    }

    fn timeout(&mut self, _reg: &Registrar, _id: TimeoutId) {
        // Liveness tick, asserted periodically by the main thread.
        let (lock, _) = &*self.shared;
        lock.lock().unwrap().watchdog += 1;
    }
}

impl RxThread {
    fn drain_socket(&mut self) {
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, _peer)) => {
                    let raw = String::from_utf8_lossy(&self.buf[..len]).into_owned();
                    let (lock, _) = &*self.shared;
                    lock.lock().unwrap().queue.push_back(raw);
                    if let Err(e) = self.ready.wake() {
                        warn!("rx ready signal failed: {e}");
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("rx socket receive error: {e}");
                    break;
                }
            }
        }
    }

    fn run(mut self, mut poller: Poller) {
        debug!("receive thread started");
        while !self.stop {
            if let Err(e) = poller.wait(Some(Duration::from_secs(1)), &mut self) {
                error!("receive thread poll failed: {e}");
                break;
            }
        }

        // Dying gasp: wake the main thread once more so it drains the queue,
        // then mark ourselves gone.
        let _ = self.ready.wake();
        let (lock, cvar) = &*self.shared;
        lock.lock().unwrap().terminated = true;
        cvar.notify_all();
        debug!("receive thread exiting");
    }
}

impl Receiver {
    /// Start the receive thread over `socket`. `ready` must be a waker on
    /// the main poller; it fires once per enqueued datagram and once more
    /// as the dying gasp.
    pub fn spawn(socket: UdpSocket, ready: Waker) -> Result<Receiver, RxError> {
        let poller = Poller::new(4)?;
        poller.register(socket.as_raw_fd(), Watch::IN, SOCKET_TOKEN)?;
        let control_waker = Arc::new(poller.registrar().waker(CONTROL_TOKEN)?);

        let shared = Arc::new((Mutex::new(Shared::default()), Condvar::new()));
        let control = Arc::new(AtomicU32::new(0));

        let state = RxThread {
            socket,
            buf: [0; RX_BUF_SIZE],
            shared: Arc::clone(&shared),
            control: Arc::clone(&control),
            ready,
            stop: false,
        };

        let mut poller = poller;
        let _watchdog_tick = poller.register_timeout();
        let thread = thread::Builder::new()
            .name("xev-rx".into())
            .spawn(move || state.run(poller))?;

        Ok(Receiver {
            shared,
            control,
            control_waker,
            thread: Some(thread),
        })
    }

    /// Pop the oldest raw datagram, if any. Called by the main thread when
    /// the ready waker fires; drains in arrival order.
    pub fn try_dequeue(&self) -> Option<String> {
        let (lock, _) = &*self.shared;
        lock.lock().unwrap().queue.pop_front()
    }

    /// Read and reset the watchdog counter. A zero return means the
    /// receive thread made no progress since the last check.
    pub fn take_watchdog(&self) -> u32 {
        let (lock, _) = &*self.shared;
        let mut shared = lock.lock().unwrap();
        std::mem::replace(&mut shared.watchdog, 0)
    }

    /// Send a control word to the receive thread.
    pub fn send_control(&self, value: u32) -> Result<(), RxError> {
        self.control.store(value, Ordering::SeqCst);
        self.control_waker.wake()?;
        Ok(())
    }

    /// Cooperative shutdown: request terminate, wait up to one second for
    /// the dying gasp, then join. Timing out is a liveness failure the
    /// caller treats as fatal.
    pub fn shutdown(mut self) -> Result<(), RxError> {
        let already_gone = {
            let (lock, _) = &*self.shared;
            lock.lock().unwrap().terminated
        };
        if !already_gone {
            self.send_control(TERM_REQUEST)?;
        }

        let (lock, cvar) = &*self.shared;
        let guard = lock.lock().unwrap();
        let (guard, result) = cvar
            .wait_timeout_while(guard, SHUTDOWN_WAIT, |s| !s.terminated)
            .unwrap();
        drop(guard);
        if result.timed_out() {
            return Err(RxError::ShutdownTimeout(SHUTDOWN_WAIT));
        }

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollDispatch;
    use std::net::UdpSocket as StdUdp;

    const READY: Token = Token(9);

    #[derive(Default)]
    struct ReadyCount {
        fired: usize,
    }

    impl PollDispatch for ReadyCount {
        fn ready(&mut self, _reg: &Registrar, token: Token, _events: Watch) {
            assert_eq!(token, READY);
            self.fired += 1;
        }

        fn timeout(&mut self, _reg: &Registrar, _id: TimeoutId) {}
    }

    fn rx_fixture() -> (Poller, Receiver, StdUdp, std::net::SocketAddr) {
        let main_poller = Poller::new(8).unwrap();
        let ready = main_poller.registrar().waker(READY).unwrap();

        let socket = StdUdp::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let addr = socket.local_addr().unwrap();
        let socket = UdpSocket::from_std(socket);

        let rx = Receiver::spawn(socket, ready).unwrap();
        let sender = StdUdp::bind("127.0.0.1:0").unwrap();
        (main_poller, rx, sender, addr)
    }

    #[test]
    fn datagrams_arrive_in_order() {
        let (mut poller, rx, sender, addr) = rx_fixture();

        sender.send_to(b"first", addr).unwrap();
        sender.send_to(b"second", addr).unwrap();

        let mut seen = Vec::new();
        let mut dispatch = ReadyCount::default();
        for _ in 0..100 {
            poller
                .wait(Some(Duration::from_millis(50)), &mut dispatch)
                .unwrap();
            while let Some(raw) = rx.try_dequeue() {
                seen.push(raw);
            }
            if seen.len() == 2 {
                break;
            }
        }
        assert_eq!(seen, vec!["first".to_string(), "second".to_string()]);

        rx.shutdown().unwrap();
    }

    #[test]
    fn shutdown_delivers_dying_gasp() {
        let (mut poller, rx, sender, addr) = rx_fixture();

        // A datagram that is still queued when terminate arrives must be
        // observable after the gasp.
        sender.send_to(b"leftover", addr).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        rx.send_control(TERM_REQUEST).unwrap();

        let mut dispatch = ReadyCount::default();
        let mut drained = Vec::new();
        for _ in 0..100 {
            poller
                .wait(Some(Duration::from_millis(50)), &mut dispatch)
                .unwrap();
            while let Some(raw) = rx.try_dequeue() {
                drained.push(raw);
            }
            if dispatch.fired > 0 && drained.len() == 1 {
                break;
            }
        }
        assert_eq!(drained, vec!["leftover".to_string()]);
        assert!(dispatch.fired >= 1);

        rx.shutdown().unwrap();
    }

    #[test]
    fn watchdog_advances_on_idle_ticks() {
        let (_poller, rx, _sender, _addr) = rx_fixture();

        // The rx poller ticks at 1 Hz; after a bit over a second the
        // counter must have moved.
        let mut advanced = false;
        for _ in 0..30 {
            std::thread::sleep(Duration::from_millis(100));
            if rx.take_watchdog() > 0 {
                advanced = true;
                break;
            }
        }
        assert!(advanced, "watchdog never advanced");

        rx.shutdown().unwrap();
    }
}
