use crate::foundation::error::{ExportError, ExportResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Clone, Debug, PartialEq, Eq)]
enum GateState {
    Pending,
    Open,
    Closed(String),
}

/// One-shot signal that releases sample writers once the container writer has started.
///
/// `open` is set-once: after it, every current and future `wait` returns immediately for the
/// rest of the session. `close` releases waiters with [`ExportError::Aborted`] instead, so a
/// session that can never start (abort, failed producer) does not strand its threads. Closing
/// an open gate is a no-op and opening a closed gate is a no-op.
#[derive(Debug)]
pub struct StartGate {
    opened: AtomicBool,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    /// Create a pending gate.
    pub fn new() -> Self {
        Self {
            opened: AtomicBool::new(false),
            state: Mutex::new(GateState::Pending),
            changed: Condvar::new(),
        }
    }

    /// Open the gate. Returns `true` only for the call that performed the transition.
    pub fn open(&self) -> bool {
        let mut state = self.lock();
        if *state != GateState::Pending {
            return false;
        }
        *state = GateState::Open;
        self.opened.store(true, Ordering::Release);
        self.changed.notify_all();
        true
    }

    /// Close a pending gate, failing current and future waiters with `reason`.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self, reason: impl Into<String>) -> bool {
        let mut state = self.lock();
        if *state != GateState::Pending {
            return false;
        }
        *state = GateState::Closed(reason.into());
        self.changed.notify_all();
        true
    }

    /// Return `true` once the gate has been opened.
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Return `true` once the gate has been closed without opening.
    pub(crate) fn is_closed(&self) -> bool {
        matches!(*self.lock(), GateState::Closed(_))
    }

    /// Block until the gate opens or closes.
    pub fn wait(&self) -> ExportResult<()> {
        if self.is_open() {
            return Ok(());
        }
        let mut state = self.lock();
        while *state == GateState::Pending {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        Self::resolve(&state)
    }

    fn resolve(state: &GateState) -> ExportResult<()> {
        match state {
            GateState::Open => Ok(()),
            GateState::Closed(reason) => Err(ExportError::aborted(reason.clone())),
            GateState::Pending => Err(ExportError::session("start gate still pending")),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mux/gate.rs"]
mod tests;
