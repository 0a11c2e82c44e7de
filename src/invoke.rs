//! Handler execution: worker pool, invocation lifecycle and timers.
//!
//! Threaded commands are submitted here so the message-receive loop never
//! waits on a handler. The pool is bounded by a fair semaphore, which keeps
//! start order best-effort FIFO; completion order is unspecified.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::debug;

use crate::Error;

/// Lifecycle of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Submitted, waiting for a worker slot.
    Pending,
    /// The handler body is executing.
    Running,
    /// The handler returned `Ok`.
    Completed,
    /// The handler returned an error.
    Failed,
    /// The invocation was cancelled before or during execution.
    Cancelled,
}

impl InvocationState {
    /// True for `Completed`, `Failed` and `Cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvocationState::Completed | InvocationState::Failed | InvocationState::Cancelled
        )
    }
}

/// Cooperative cancellation token.
///
/// Cancellation is level-triggered and idempotent; handlers either poll
/// [`CancelToken::is_cancelled`] or race [`CancelToken::cancelled`] against
/// their I/O.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> CancelToken {
        let (tx, _) = watch::channel(false);
        CancelToken { tx: Arc::new(tx) }
    }

    /// Requests cancellation. Calling this more than once is a no-op.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();

        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> CancelToken {
        CancelToken::new()
    }
}

/// Observer handle for one dispatched invocation.
#[derive(Debug, Clone)]
pub struct InvocationHandle {
    state: watch::Receiver<InvocationState>,
    cancel: CancelToken,
}

impl InvocationHandle {
    /// The invocation's current state.
    #[must_use]
    pub fn state(&self) -> InvocationState {
        *self.state.borrow()
    }

    /// Requests cooperative cancellation of the invocation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the invocation reaches a terminal state and returns it.
    pub async fn finished(&mut self) -> InvocationState {
        loop {
            let state = *self.state.borrow_and_update();
            if state.is_terminal() {
                return state;
            }

            if self.state.changed().await.is_err() {
                return *self.state.borrow();
            }
        }
    }
}

/// Bounded executor for threaded command handlers.
pub struct WorkerPool {
    slots: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool that runs at most `max_inflight` handlers at once.
    #[must_use]
    pub fn new(max_inflight: usize) -> WorkerPool {
        WorkerPool {
            slots: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    /// Submits a handler future to the pool and returns immediately.
    ///
    /// The future starts once a worker slot is free. `cancel` is the same
    /// token the handler sees, so cancelling the returned handle while the
    /// invocation is still pending skips execution entirely, and cancelling
    /// while running interrupts the future at its next await point.
    pub fn submit<F>(&self, cancel: CancelToken, fut: F) -> InvocationHandle
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        let token = cancel.clone();
        let (tx, rx) = watch::channel(InvocationState::Pending);

        tokio::spawn(async move {
            let permit = tokio::select! {
                permit = slots.acquire_owned() => permit,
                () = token.cancelled() => {
                    tx.send_replace(InvocationState::Cancelled);
                    return;
                }
            };

            // The semaphore is never closed while the pool is alive.
            let Ok(_permit) = permit else {
                tx.send_replace(InvocationState::Failed);
                return;
            };

            tx.send_replace(InvocationState::Running);

            let state = tokio::select! {
                result = fut => match result {
                    Ok(()) => InvocationState::Completed,
                    Err(_) => InvocationState::Failed,
                },
                () = token.cancelled() => InvocationState::Cancelled,
            };

            tx.send_replace(state);
        });

        InvocationHandle { state: rx, cancel }
    }
}

/// Runs a handler future inline on the calling task, tracking the same
/// lifecycle as pooled invocations.
pub async fn run_inline<F>(cancel: CancelToken, fut: F) -> InvocationHandle
where
    F: Future<Output = Result<(), Error>>,
{
    let (tx, rx) = watch::channel(InvocationState::Running);

    let state = match fut.await {
        Ok(()) => InvocationState::Completed,
        Err(_) => InvocationState::Failed,
    };

    tx.send_replace(state);

    InvocationHandle { state: rx, cancel }
}

/// Handle for a scheduled task; dropping it does not cancel the task.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancel: CancelToken,
}

impl TimerHandle {
    /// Cancels the scheduled task. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the task has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs `task` once after `delay`, unless cancelled first.
pub fn after<F, Fut>(delay: Duration, task: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancelToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(delay) => task().await,
            () = token.cancelled() => debug!("one-shot timer cancelled"),
        }
    });

    TimerHandle { cancel }
}

/// Runs `task` every `interval` until cancelled. The first run happens one
/// interval after scheduling.
pub fn every<F, Fut>(interval: Duration, mut task: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancel = CancelToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => task().await,
                () = token.cancelled() => {
                    debug!("repeating timer cancelled");
                    break;
                }
            }
        }
    });

    TimerHandle { cancel }
}
