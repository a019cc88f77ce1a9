//! Supervision of spawned connection tasks.
//!
//! A [`TaskGroup`] tracks every child task the server spawns, lets the
//! server broadcast cancellation to all of them at once, and provides an
//! awaitable drain that completes when no child remains.
//!
//! ```text
//! +-----------+  adapt()   +----------------+
//! | TaskGroup | ---------> | TaskMembership |  <- held by the spawned task,
//! +-----------+            +----------------+     removed from the group on drop
//!      |                          |
//!      | emit(level)              | token()
//!      v                          v
//! +------------+           +------------+
//! | ChildToken |  <------- | ChildToken |  <- observed by the child's I/O
//! +------------+           +------------+
//! ```
//!
//! Cancellation is tiered: a *total* (or *partial*) emission is cooperative
//! and is observed by children at explicit poll points, while a *terminal*
//! emission forcibly aborts every in-flight operation raced through
//! [`ChildToken::abortable`]. Levels only escalate; emitting a lower level
//! after a higher one is a no-op.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Cancellation severity, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CancelLevel {
    /// Cooperative: children notice it at explicit poll points and finish
    /// their current step first.
    Total,
    /// Intermediate level, treated identically to [`CancelLevel::Total`].
    Partial,
    /// Forcible: every operation raced through [`ChildToken::abortable`]
    /// aborts at its next suspension.
    Terminal,
}

/// The cancellation state shared between a group and one child.
///
/// Cloneable; all clones observe the same signals. The *soft* token is set
/// at any emission level, the *hard* token only at terminal.
#[derive(Debug, Clone)]
pub struct ChildToken {
    soft: CancellationToken,
    hard: CancellationToken,
}

impl ChildToken {
    fn new() -> Self {
        Self {
            soft: CancellationToken::new(),
            hard: CancellationToken::new(),
        }
    }

    fn signal(&self, level: CancelLevel) {
        self.soft.cancel();
        if level == CancelLevel::Terminal {
            self.hard.cancel();
        }
    }

    /// Whether any cancellation level has been emitted for this child.
    pub fn is_cancelled(&self) -> bool {
        self.soft.is_cancelled()
    }

    /// Whether terminal cancellation has been emitted for this child.
    pub fn is_terminated(&self) -> bool {
        self.hard.is_cancelled()
    }

    /// Completes when any cancellation level is emitted.
    pub async fn cancelled(&self) {
        self.soft.cancelled().await;
    }

    /// Runs `op` until completion or terminal cancellation, whichever comes
    /// first. Returns `None` if the operation was aborted.
    ///
    /// Total cancellation deliberately does not interrupt `op`: sessions
    /// keep running cleanup (and finish in-flight writes) after a
    /// cooperative stop, and only a terminal emission cuts them short.
    pub async fn abortable<T>(&self, op: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            _ = self.hard.cancelled() => None,
            value = op => Some(value),
        }
    }
}

#[derive(Default)]
struct State {
    children: HashMap<u64, ChildToken>,
    next_id: u64,
    /// Highest level emitted so far. Children registered after an emission
    /// are signalled at registration so a concurrent emit never loses one.
    emitted: Option<CancelLevel>,
}

struct Inner {
    state: Mutex<State>,
    drained: Notify,
}

/// A thread-safe group of child tasks supporting broadcast cancellation
/// and an awaitable drain.
#[derive(Clone)]
pub struct TaskGroup {
    inner: Arc<Inner>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                drained: Notify::new(),
            }),
        }
    }

    /// Registers a new child and returns its membership guard.
    ///
    /// Call this synchronously in the spawn path, before the child task is
    /// handed to the runtime: registration is then ordered before anything
    /// the child does. The guard must be moved into the child task so that
    /// completion (return, error, panic or abort) removes the entry.
    pub fn adapt(&self) -> TaskMembership {
        let token = ChildToken::new();
        let id = {
            let mut state = self.inner.state.lock();
            if let Some(level) = state.emitted {
                token.signal(level);
            }
            let id = state.next_id;
            state.next_id += 1;
            state.children.insert(id, token.clone());
            id
        };
        TaskMembership {
            inner: Arc::clone(&self.inner),
            id,
            token,
        }
    }

    /// Signals every live child at `level`.
    ///
    /// Does not block on child completion. Emissions only escalate: the
    /// group remembers the highest level seen, and a lower re-emission
    /// leaves already-signalled tokens unchanged.
    pub fn emit(&self, level: CancelLevel) {
        let snapshot: Vec<ChildToken> = {
            let mut state = self.inner.state.lock();
            state.emitted = Some(state.emitted.map_or(level, |prev| prev.max(level)));
            state.children.values().cloned().collect()
        };
        for token in &snapshot {
            token.signal(level);
        }
    }

    /// Completes when the group holds no live children.
    ///
    /// Yields through the scheduler at least once even when the group is
    /// already empty. Cancelling the returned future (dropping it, or
    /// racing it against a timeout) has no effect on the children.
    pub async fn wait(&self) {
        loop {
            // Register with the notifier before checking emptiness, so a
            // removal landing in between cannot be missed.
            let mut drained = std::pin::pin!(self.inner.drained.notified());
            drained.as_mut().enable();
            if self.inner.state.lock().children.is_empty() {
                tokio::task::yield_now().await;
                return;
            }
            drained.await;
        }
    }

    /// Number of live children.
    pub fn len(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A child's entry in its [`TaskGroup`].
///
/// Dropping the membership removes the child from the group and, if that
/// removal empties it, wakes every pending [`TaskGroup::wait`]. Removal
/// happens exactly once per child; `Drop` cannot run twice, so a
/// misbehaving completion path cannot corrupt the group.
pub struct TaskMembership {
    inner: Arc<Inner>,
    id: u64,
    token: ChildToken,
}

impl TaskMembership {
    /// The cancellation token for this child.
    pub fn token(&self) -> ChildToken {
        self.token.clone()
    }
}

impl Drop for TaskMembership {
    fn drop(&mut self) {
        let empty = {
            let mut state = self.inner.state.lock();
            state.children.remove(&self.id);
            state.children.is_empty()
        };
        if empty {
            self.inner.drained.notify_waiters();
        }
    }
}
