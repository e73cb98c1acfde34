//! Execution bridge: run work submitted from any thread on one owning thread.
//!
//! The scene is not thread-safe, so network handlers never touch it directly.
//! They hand a closure to [`ExecutionBridge::submit`] and block until the
//! owning thread has executed it via [`BridgeReceiver::pump`] or
//! [`BridgeReceiver::run`]. Calls run strictly in submission order, one at a
//! time. A caller that times out gets [`BridgeError::Timeout`]; its call is
//! not cancelled and still runs in order, the result being discarded.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BridgeSettings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Execution bridge is not running")]
    NotRunning,

    #[error("Timed out after {timeout_ms} ms waiting for the host thread")]
    Timeout { timeout_ms: u64 },

    #[error("{0}")]
    HandlerFailed(String),

    #[error("Cannot submit from the host thread itself")]
    Reentrant,
}

type Work<S> = Box<dyn FnOnce(&mut S) -> anyhow::Result<Value> + Send>;

/// One queued unit of work
struct PendingCall<S> {
    id: Uuid,
    work: Work<S>,
    reply: SyncSender<Result<Value, BridgeError>>,
    submitted: Instant,
}

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    owner: Mutex<Option<ThreadId>>,
    queued: AtomicUsize,
    /// Held by submitters while enqueueing; the receiver signals
    /// `space_freed` under it after taking a call off a full queue.
    space: Mutex<()>,
    space_freed: Condvar,
}

impl Shared {
    fn lock_space(&self) -> MutexGuard<'_, ()> {
        self.space.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify_space(&self) {
        let _guard = self.lock_space();
        self.space_freed.notify_all();
    }

    fn is_owner(&self, id: ThreadId) -> bool {
        match self.owner.lock() {
            Ok(owner) => *owner == Some(id),
            Err(poisoned) => *poisoned.into_inner() == Some(id),
        }
    }

    fn set_owner(&self, id: Option<ThreadId>) {
        match self.owner.lock() {
            Ok(mut owner) => *owner = id,
            Err(poisoned) => *poisoned.into_inner() = id,
        }
    }
}

/// Submitting side. Cheap to clone and safe to share across threads.
pub struct ExecutionBridge<S> {
    queue: SyncSender<PendingCall<S>>,
    shared: Arc<Shared>,
    timeout: Duration,
}

impl<S> Clone for ExecutionBridge<S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            shared: Arc::clone(&self.shared),
            timeout: self.timeout,
        }
    }
}

/// Executing side. Lives on the owning thread.
pub struct BridgeReceiver<S> {
    queue: Receiver<PendingCall<S>>,
    shared: Arc<Shared>,
    poll_interval: Duration,
}

/// Create a connected bridge/receiver pair.
pub fn channel<S>(settings: &BridgeSettings) -> (ExecutionBridge<S>, BridgeReceiver<S>) {
    let (tx, rx) = mpsc::sync_channel(settings.queue_capacity.max(1));
    let shared = Arc::new(Shared::default());
    (
        ExecutionBridge {
            queue: tx,
            shared: Arc::clone(&shared),
            timeout: settings.timeout(),
        },
        BridgeReceiver {
            queue: rx,
            shared,
            poll_interval: settings.poll_interval(),
        },
    )
}

impl<S> ExecutionBridge<S> {
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of calls waiting to be executed
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Run `work` on the owning thread and wait for its result.
    pub fn submit<F>(&self, work: F) -> Result<Value, BridgeError>
    where
        F: FnOnce(&mut S) -> anyhow::Result<Value> + Send + 'static,
    {
        self.submit_with_timeout(work, self.timeout)
    }

    pub fn submit_with_timeout<F>(&self, work: F, timeout: Duration) -> Result<Value, BridgeError>
    where
        F: FnOnce(&mut S) -> anyhow::Result<Value> + Send + 'static,
    {
        if !self.is_running() {
            return Err(BridgeError::NotRunning);
        }
        if self.shared.is_owner(thread::current().id()) {
            return Err(BridgeError::Reentrant);
        }

        let timeout_ms = timeout.as_millis() as u64;
        let deadline = Instant::now() + timeout;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let id = Uuid::new_v4();
        let mut call = PendingCall {
            id,
            work: Box::new(work),
            reply: reply_tx,
            submitted: Instant::now(),
        };

        // Count before sending so a concurrent pump never undercounts
        self.shared.queued.fetch_add(1, Ordering::AcqRel);
        let mut space = self.shared.lock_space();
        loop {
            match self.queue.try_send(call) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        self.shared.queued.fetch_sub(1, Ordering::AcqRel);
                        warn!(%id, "Bridge queue full, giving up");
                        return Err(BridgeError::Timeout { timeout_ms });
                    }
                    call = back;
                    space = match self.shared.space_freed.wait_timeout(space, remaining) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    };
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.shared.queued.fetch_sub(1, Ordering::AcqRel);
                    return Err(BridgeError::NotRunning);
                }
            }
        }
        drop(space);
        debug!(%id, "Submitted call");

        let remaining = deadline.saturating_duration_since(Instant::now());
        match reply_rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                debug!(%id, timeout_ms, "Caller timed out");
                Err(BridgeError::Timeout { timeout_ms })
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::NotRunning),
        }
    }
}

impl<S> BridgeReceiver<S> {
    /// Bind the bridge to the calling thread and start accepting work.
    pub fn start(&self) {
        self.shared.set_owner(Some(thread::current().id()));
        self.shared.running.store(true, Ordering::Release);
        info!("Execution bridge started");
    }

    /// Stop accepting work. Calls already queued are left unanswered and
    /// their submitters see `NotRunning` once the receiver is dropped.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!("Execution bridge stopped");
        }
        self.shared.set_owner(None);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Execute the calls that were queued when pumping began; returns how
    /// many ran. Calls that arrive meanwhile wait for the next pump.
    pub fn pump(&self, state: &mut S) -> usize {
        let budget = self.shared.queued.load(Ordering::Acquire);
        let mut executed = 0;
        while executed < budget {
            match self.queue.try_recv() {
                Ok(call) => {
                    self.execute(state, call);
                    executed += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        executed
    }

    /// Dedicated host loop: wait for work, execute it, repeat until
    /// `shutdown` is set or every bridge handle is gone.
    pub fn run(&self, state: &mut S, shutdown: &AtomicBool) {
        if !self.is_running() {
            self.start();
        }
        while !shutdown.load(Ordering::Acquire) {
            match self.queue.recv_timeout(self.poll_interval) {
                Ok(call) => {
                    self.execute(state, call);
                    self.pump(state);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.stop();
    }

    fn execute(&self, state: &mut S, call: PendingCall<S>) {
        self.shared.queued.fetch_sub(1, Ordering::AcqRel);
        self.shared.notify_space();
        let PendingCall {
            id,
            work,
            reply,
            submitted,
        } = call;

        let result = match catch_unwind(AssertUnwindSafe(|| work(state))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BridgeError::HandlerFailed(format!("{e:#}"))),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(%id, "Handler panicked: {message}");
                Err(BridgeError::HandlerFailed(format!("handler panicked: {message}")))
            }
        };
        debug!(%id, elapsed_ms = submitted.elapsed().as_millis() as u64, "Executed call");

        if reply.send(result).is_err() {
            debug!(%id, "Submitter gone, result discarded");
        }
    }
}

impl<S> Drop for BridgeReceiver<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
