//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use demon_ring::net::listener::closed_error;
use demon_ring::{Connection, ConnectionHandler, Listener};
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

/// What a scripted accept call does.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Hand out a connection.
    Conn,
    /// Fail with a transient error.
    Temporary,
    /// Fail with a permanent error.
    Permanent,
}

/// Stand-in connection: just a sequence number.
#[derive(Debug, PartialEq, Eq)]
pub struct MockConn(pub usize);

#[derive(Debug)]
struct ScriptState {
    script: Mutex<VecDeque<Step>>,
    /// Keep failing temporarily once the script runs out.
    temporary_forever: bool,
    closed: watch::Sender<bool>,
    closes: AtomicUsize,
    accepts: Mutex<Vec<Instant>>,
    handed_out: AtomicUsize,
}

/// A listener that replays a fixed script, then blocks until closed.
#[derive(Debug, Clone)]
pub struct ScriptedListener {
    state: Arc<ScriptState>,
}

impl ScriptedListener {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self::build(script, false)
    }

    /// A listener whose every accept fails temporarily.
    pub fn always_temporary() -> Self {
        Self::build([], true)
    }

    /// A listener that never yields a connection.
    pub fn idle() -> Self {
        Self::new([])
    }

    fn build(script: impl IntoIterator<Item = Step>, temporary_forever: bool) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            state: Arc::new(ScriptState {
                script: Mutex::new(script.into_iter().collect()),
                temporary_forever,
                closed,
                closes: AtomicUsize::new(0),
                accepts: Mutex::new(Vec::new()),
                handed_out: AtomicUsize::new(0),
            }),
        }
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn accept_count(&self) -> usize {
        self.state.accepts.lock().unwrap().len()
    }

    /// When each accept call started.
    pub fn accept_times(&self) -> Vec<Instant> {
        self.state.accepts.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.state.closed.borrow()
    }
}

impl Listener for ScriptedListener {
    type Conn = MockConn;

    async fn accept(&self) -> io::Result<(MockConn, SocketAddr)> {
        self.state.accepts.lock().unwrap().push(Instant::now());
        if self.is_closed() {
            return Err(closed_error());
        }

        let step = self.state.script.lock().unwrap().pop_front();
        let step = match step {
            Some(step) => step,
            None if self.state.temporary_forever => Step::Temporary,
            None => {
                let mut closed = self.state.closed.subscribe();
                while !*closed.borrow_and_update() {
                    if closed.changed().await.is_err() {
                        break;
                    }
                }
                return Err(closed_error());
            }
        };

        match step {
            Step::Conn => {
                let n = self.state.handed_out.fetch_add(1, Ordering::SeqCst);
                let peer: SocketAddr = format!("10.0.0.1:{}", 10_000 + n).parse().unwrap();
                Ok((MockConn(n), peer))
            }
            Step::Temporary => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection aborted before accept",
            )),
            Step::Permanent => Err(io::Error::new(io::ErrorKind::InvalidInput, "bad listener")),
        }
    }

    fn close(&self) -> io::Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.state.closed.send_replace(true) {
            return Err(closed_error());
        }
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok("127.0.0.1:7000".parse().unwrap())
    }
}

/// Handler that records invocations and holds each connection until released.
#[derive(Debug, Clone, Default)]
pub struct GatedHandler {
    inner: Arc<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    started: AtomicUsize,
    finished: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    open: Mutex<bool>,
    release: Notify,
}

impl GatedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let every current and future invocation finish.
    pub fn open(&self) {
        *self.inner.open.lock().unwrap() = true;
        self.inner.release.notify_waiters();
    }

    pub fn started(&self) -> usize {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.inner.finished.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.inner.max_running.load(Ordering::SeqCst)
    }

    fn is_open(&self) -> bool {
        *self.inner.open.lock().unwrap()
    }
}

impl ConnectionHandler<MockConn> for GatedHandler {
    async fn handle_connect(&self, _conn: Connection<MockConn>) {
        let state = &self.inner;
        state.started.fetch_add(1, Ordering::SeqCst);
        let now = state.running.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_running.fetch_max(now, Ordering::SeqCst);

        loop {
            let released = state.release.notified();
            if self.is_open() {
                break;
            }
            released.await;
        }

        state.running.fetch_sub(1, Ordering::SeqCst);
        state.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `cond` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
