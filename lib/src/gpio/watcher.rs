// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{Batching, EdgeDetection, Offset};
use crate::{DigitalState, Error, Result};
use boardio_uapi::gpio::{self, LineEdgeEvent, LineEdgeEventKind, EVENT_BUFFER_SLOTS};
use boardio_uapi::{FileDescriptor, PollFlags};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The longest the watcher blocks in poll before checking if it has been stopped.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// A change in the state of an input line, as reported to listeners.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct StateChange {
    /// The state after the change.
    ///
    /// High for a rising edge and Low for a falling edge.
    pub state: DigitalState,

    pub offset: Offset,

    /// The kernel timestamp of the edge, in nanoseconds.
    pub timestamp_ns: u64,

    /// The sequence number of the edge on this line.
    pub line_seqno: u32,
}

impl From<&LineEdgeEvent> for StateChange {
    fn from(ev: &LineEdgeEvent) -> Self {
        StateChange {
            state: match ev.kind {
                LineEdgeEventKind::RisingEdge => DigitalState::High,
                LineEdgeEventKind::FallingEdge => DigitalState::Low,
            },
            offset: ev.offset,
            timestamp_ns: ev.timestamp_ns,
            line_seqno: ev.line_seqno,
        }
    }
}

/// The state of the event watcher of an input.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum WatcherStatus {
    /// No listener has been added, so no watcher has been started.
    #[default]
    Idle,

    Running,

    /// The watcher was stopped by the input being shut down.
    Stopped,

    /// The watcher hit an error and is no longer delivering events.
    Failed(String),
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherStatus::Idle => write!(f, "idle"),
            WatcherStatus::Running => write!(f, "running"),
            WatcherStatus::Stopped => write!(f, "stopped"),
            WatcherStatus::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Identifies a listener so it can be removed.
pub type ListenerId = usize;

type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// The listeners of an input.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicUsize,
    list: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub fn add<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, Arc::new(f)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut list = self.lock();
        let len = list.len();
        list.retain(|(lid, _)| *lid != id);
        list.len() != len
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Deliver each change to every listener, in order.
    ///
    /// The listeners are called without the list locked, so they may add or
    /// remove listeners.
    pub fn dispatch(&self, changes: &[StateChange]) {
        let listeners: Vec<Listener> = self.lock().iter().map(|(_, l)| l.clone()).collect();
        for change in changes {
            for l in &listeners {
                l(change);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.list.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

/// Buffers changes until the batching policy says they should be delivered.
#[derive(Debug)]
pub(crate) struct EventBatcher {
    batching: Batching,
    pending: Vec<StateChange>,
    last_flush: Instant,
}

impl EventBatcher {
    pub fn new(batching: Batching, now: Instant) -> Self {
        EventBatcher {
            batching,
            pending: Vec::new(),
            last_flush: now,
        }
    }

    /// Add a block of changes, returning the changes to deliver, if any.
    pub fn push<I>(&mut self, changes: I, now: Instant) -> Option<Vec<StateChange>>
    where
        I: IntoIterator<Item = StateChange>,
    {
        self.pending.extend(changes);
        let due = match self.batching {
            Batching::Count(n) => self.pending.len() >= n.max(1),
            Batching::Period(period) => now.duration_since(self.last_flush) >= period,
        };
        if due {
            self.flush(now)
        } else {
            None
        }
    }

    /// Deliver anything pending, as no more events arrived in time.
    pub fn tick(&mut self, now: Instant) -> Option<Vec<StateChange>> {
        self.flush(now)
    }

    fn flush(&mut self, now: Instant) -> Option<Vec<StateChange>> {
        self.last_flush = now;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }
}

/// What a watcher watches for and how it reports it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WatchSettings {
    pub edges: EdgeDetection,
    pub batching: Batching,
    pub timeout: Duration,
}

/// A thread reading edge events from a line and delivering them to the
/// listeners.
#[derive(Debug)]
pub(crate) struct Watcher {
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<WatcherStatus>>,
    done: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn spawn(
        name: &str,
        lf: Arc<FileDescriptor>,
        settings: WatchSettings,
        listeners: Arc<Listeners>,
    ) -> Result<Watcher> {
        let stop = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(WatcherStatus::Running));
        // the sender is dropped when the thread exits
        let (done_tx, done) = mpsc::channel::<()>();
        let run = Run {
            lf,
            settings,
            listeners,
            stop: stop.clone(),
            status: status.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("boardio-{name}"))
            .spawn(move || {
                run.watch();
                // release the line before reporting the exit
                drop(run);
                drop(done_tx);
            })
            .map_err(|e| Error::Watcher(e.to_string()))?;
        tracing::debug!(name, ?settings, "watcher started");
        Ok(Watcher {
            stop,
            status,
            done,
            handle: Some(handle),
        })
    }

    pub fn status(&self) -> WatcherStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Flag the thread to stop at its next opportunity.
    fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Wait up to the grace period for the thread to exit.
    ///
    /// If it does not exit in time the thread is detached, and it exits at
    /// its next stop check, releasing its hold on the line.
    pub fn join(&mut self, grace: Duration) {
        self.signal_stop();
        let Some(handle) = self.handle.take() else {
            return;
        };
        match self.done.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!("watcher panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::debug!(grace_ms = grace.as_millis(), "watcher detached");
            }
        }
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == WatcherStatus::Running {
            *status = WatcherStatus::Stopped;
        }
    }
}

struct Run {
    lf: Arc<FileDescriptor>,
    settings: WatchSettings,
    listeners: Arc<Listeners>,
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<WatcherStatus>>,
}

impl Run {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn set_status(&self, status: WatcherStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn fail(&self, msg: String) {
        tracing::error!(path = %self.lf.path().display(), error = %msg, "watcher failed");
        self.set_status(WatcherStatus::Failed(msg));
    }

    /// Pass a batch to the listeners.
    ///
    /// A panicking listener fails the watcher, and false is returned.
    fn deliver(&self, batch: Option<Vec<StateChange>>) -> bool {
        let Some(changes) = batch else {
            return true;
        };
        tracing::trace!(count = changes.len(), "delivering");
        match panic::catch_unwind(AssertUnwindSafe(|| self.listeners.dispatch(&changes))) {
            Ok(()) => true,
            Err(payload) => {
                self.fail(format!("listener panicked: {}", panic_message(&*payload)));
                false
            }
        }
    }

    fn watch(&self) {
        let timeout = self.settings.timeout;
        let mut batcher = EventBatcher::new(self.settings.batching, Instant::now());
        let mut deadline = Instant::now() + timeout;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                if !self.deliver(batcher.tick(now)) {
                    return;
                }
                deadline = now + timeout;
                continue;
            }
            let wait = (deadline - now).min(STOP_CHECK_INTERVAL);
            let revents = match self.lf.poll(PollFlags::IN | PollFlags::ERR, wait) {
                Ok(Some(revents)) => revents,
                Ok(None) => continue,
                Err(e) => return self.fail(e.to_string()),
            };
            if revents.contains(PollFlags::IN) {
                match gpio::read_events(&self.lf, EVENT_BUFFER_SLOTS) {
                    Ok(events) => {
                        let edges = self.settings.edges;
                        let changes = events
                            .iter()
                            .filter(|ev| edges.matches(ev.kind))
                            .map(StateChange::from);
                        let now = Instant::now();
                        if !self.deliver(batcher.push(changes, now)) {
                            return;
                        }
                        deadline = now + timeout;
                    }
                    Err(e) => return self.fail(e.to_string()),
                }
            }
            if revents.intersects(PollFlags::ERR | PollFlags::HUP | PollFlags::NVAL) {
                return self.fail(format!("poll returned {revents:?}"));
            }
        }
        self.set_status(WatcherStatus::Stopped);
        tracing::debug!(path = %self.lf.path().display(), "watcher stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown cause"
    }
}
