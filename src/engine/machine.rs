//! Engine lifecycle state machine
//!
//! Every transition of an engine's compound state goes through
//! `EngineStateMachine`. A single mutex guards the state and the pause depth;
//! a condition variable wakes blocked `wait_engine_state` callers and worker
//! pause gates on every committed change. Backend capabilities are always
//! invoked with the state lock released.

use super::events::{EngineEvent, EngineListener, EventDispatcher};
use super::focus::FocusArbiter;
use super::lock;
use super::state::{Allocation, EngineKind, EngineState, Focus, Pause, QueueOccupancy, StateMask};
use super::EngineBackend;
use crate::{EngineError, Result};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

struct Inner {
    state: EngineState,
    /// Unmatched `pause()` calls; the engine is resumed only at zero
    pause_depth: u32,
    /// Bumped every time the engine enters `Deallocated`
    deallocations: u64,
}

/// Single source of truth for an engine's lifecycle state
pub struct EngineStateMachine {
    id: u64,
    kind: EngineKind,
    inner: Mutex<Inner>,
    changed: Condvar,
    /// Serializes pause/resume so backend hooks run in transition order
    pause_hooks: Mutex<()>,
    events: Arc<EventDispatcher>,
}

impl EngineStateMachine {
    pub fn new(kind: EngineKind) -> Self {
        Self::with_dispatcher(kind, Arc::new(EventDispatcher::new()))
    }

    /// Build a state machine that posts into an existing dispatcher
    pub fn with_dispatcher(kind: EngineKind, events: Arc<EventDispatcher>) -> Self {
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Creating {:?} state machine {}", kind, id);

        Self {
            id,
            kind,
            inner: Mutex::new(Inner {
                state: EngineState::initial(kind),
                pause_depth: match kind {
                    EngineKind::Synthesizer => 0,
                    EngineKind::Recognizer => 1,
                },
                deallocations: 0,
            }),
            changed: Condvar::new(),
            pause_hooks: Mutex::new(()),
            events,
        }
    }

    /// Process-unique engine id (used as the focus owner key)
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn add_listener(&self, listener: Arc<dyn EngineListener>) {
        self.events.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn EngineListener>) -> bool {
        self.events.remove_listener(listener)
    }

    /// Current state snapshot
    pub fn state(&self) -> EngineState {
        lock(&self.inner).state
    }

    /// Number of unmatched `pause()` calls
    pub fn pause_depth(&self) -> u32 {
        lock(&self.inner).pause_depth
    }

    /// Replace the state, queue the change event and wake waiters
    ///
    /// Must be called with the state lock held. Listeners are not called
    /// here; the caller runs `deliver()` after dropping the lock.
    fn commit(&self, inner: &mut MutexGuard<'_, Inner>, next: EngineState) {
        let old = inner.state;
        if old == next {
            return;
        }

        if next.allocation == Allocation::Deallocated && old.allocation != Allocation::Deallocated {
            inner.deallocations += 1;
        }

        inner.state = next;
        debug!("Engine {}: {} -> {}", self.id, old, next);
        self.events.post(EngineEvent::StateChanged { old, new: next });
        self.changed.notify_all();
    }

    fn invalid(&self, operation: &'static str, state: EngineState) -> EngineError {
        warn!("Engine {}: {} rejected in state {}", self.id, operation, state);
        EngineError::InvalidTransition { operation, state }
    }

    /// Allocate engine resources
    ///
    /// Legal only from `Deallocated`. The backend runs while the engine
    /// reports `ALLOCATING_RESOURCES`; on failure the engine goes back to
    /// `Deallocated` with `ERROR_OCCURRED` set.
    pub fn allocate<B>(&self, backend: &B) -> Result<()>
    where
        B: EngineBackend + ?Sized,
    {
        {
            let mut inner = lock(&self.inner);
            if inner.state.allocation != Allocation::Deallocated {
                return Err(self.invalid("allocate", inner.state));
            }

            let mut next = inner.state;
            next.allocation = Allocation::AllocatingResources;
            self.commit(&mut inner, next);
        }
        self.events.deliver();

        info!("Engine {}: allocating resources", self.id);
        let result = backend.allocate();

        {
            let mut inner = lock(&self.inner);
            let mut next = inner.state;

            match &result {
                Ok(()) => {
                    next.allocation = Allocation::Allocated;
                    match self.kind {
                        EngineKind::Synthesizer => {
                            next.pause = Pause::Resumed;
                            inner.pause_depth = 0;
                        }
                        EngineKind::Recognizer => {
                            next.pause = Pause::Paused;
                            next.focus = Some(Focus::Defocused);
                            inner.pause_depth = 1;
                        }
                    }
                    self.commit(&mut inner, next);
                }
                Err(e) => {
                    error!("Engine {}: allocation failed: {}", self.id, e);
                    next.allocation = Allocation::Deallocated;
                    next.error_occurred = true;
                    self.commit(&mut inner, next);
                    self.events.post(EngineEvent::EngineError {
                        item: None,
                        message: e.to_string(),
                    });
                }
            }
        }
        self.events.deliver();

        result
    }

    /// Release engine resources
    ///
    /// Legal only while `Allocated`. `drain` runs after the engine reports
    /// `DEALLOCATING_RESOURCES` and before the backend is told to
    /// deallocate; facades use it to abort queued work or drop focus.
    pub fn deallocate<B, F>(&self, backend: &B, drain: F) -> Result<()>
    where
        B: EngineBackend + ?Sized,
        F: FnOnce(),
    {
        {
            let mut inner = lock(&self.inner);
            if inner.state.allocation != Allocation::Allocated {
                return Err(self.invalid("deallocate", inner.state));
            }

            let mut next = inner.state;
            next.allocation = Allocation::DeallocatingResources;
            self.commit(&mut inner, next);
        }
        self.events.deliver();

        info!("Engine {}: deallocating resources", self.id);
        drain();
        let result = backend.deallocate();

        {
            let mut inner = lock(&self.inner);
            let initial = EngineState::initial(self.kind);
            let mut next = inner.state;
            next.allocation = Allocation::Deallocated;
            next.pause = initial.pause;
            next.focus = initial.focus;
            inner.pause_depth = match self.kind {
                EngineKind::Synthesizer => 0,
                EngineKind::Recognizer => 1,
            };

            if let Err(e) = &result {
                error!("Engine {}: deallocation failed: {}", self.id, e);
                next.error_occurred = true;
            }
            self.commit(&mut inner, next);

            if let Err(e) = &result {
                self.events.post(EngineEvent::EngineError {
                    item: None,
                    message: e.to_string(),
                });
            }
        }
        self.events.deliver();

        result
    }

    /// Nested pause
    ///
    /// The first unmatched call moves the engine to `PAUSED` and invokes the
    /// backend's pause hook; further calls only deepen the nesting.
    pub fn pause<B>(&self, backend: &B) -> Result<()>
    where
        B: EngineBackend + ?Sized,
    {
        let _hooks = lock(&self.pause_hooks);

        let first = {
            let mut inner = lock(&self.inner);
            if !inner.state.is_allocated() {
                return Err(self.invalid("pause", inner.state));
            }

            inner.pause_depth += 1;
            debug!("Engine {}: pause depth {}", self.id, inner.pause_depth);

            let first = inner.pause_depth == 1;
            if first {
                let mut next = inner.state;
                next.pause = Pause::Paused;
                self.commit(&mut inner, next);
            }
            first
        };
        self.events.deliver();

        if first {
            if let Err(e) = backend.pause_backend() {
                self.report_error(None, &format!("Pause hook failed: {}", e));
            }
        }

        Ok(())
    }

    /// Undo one `pause()`
    ///
    /// The engine becomes `RESUMED` only when the depth returns to zero.
    /// Resuming at depth zero changes nothing.
    pub fn resume<B>(&self, backend: &B) -> Result<()>
    where
        B: EngineBackend + ?Sized,
    {
        let _hooks = lock(&self.pause_hooks);

        let last = {
            let mut inner = lock(&self.inner);
            if !inner.state.is_allocated() {
                return Err(self.invalid("resume", inner.state));
            }

            if inner.pause_depth == 0 {
                debug!("Engine {}: resume at depth 0 ignored", self.id);
                return Ok(());
            }

            inner.pause_depth -= 1;
            debug!("Engine {}: pause depth {}", self.id, inner.pause_depth);

            let last = inner.pause_depth == 0;
            if last {
                let mut next = inner.state;
                next.pause = Pause::Resumed;
                self.commit(&mut inner, next);
            }
            last
        };
        self.events.deliver();

        if last {
            if let Err(e) = backend.resume_backend() {
                self.report_error(None, &format!("Resume hook failed: {}", e));
            }
        }

        Ok(())
    }

    /// Take recognizer focus through `arbiter`
    ///
    /// Blocks while another engine holds focus; fails with `Timeout` after
    /// `timeout`. Already focused is a no-op.
    pub fn request_focus(&self, arbiter: &FocusArbiter, timeout: Option<Duration>) -> Result<()> {
        {
            let inner = lock(&self.inner);
            if self.kind != EngineKind::Recognizer || !inner.state.is_allocated() {
                return Err(self.invalid("requestFocus", inner.state));
            }
            if inner.state.focus == Some(Focus::Focused) {
                return Ok(());
            }
        }

        arbiter.acquire(self.id, timeout)?;

        {
            let mut inner = lock(&self.inner);
            if !inner.state.is_allocated() {
                // Deallocated while we waited for the arbiter
                let state = inner.state;
                drop(inner);
                arbiter.release(self.id);
                return Err(self.invalid("requestFocus", state));
            }

            let mut next = inner.state;
            next.focus = Some(Focus::Focused);
            self.commit(&mut inner, next);
        }
        self.events.deliver();

        info!("Engine {}: focused", self.id);
        Ok(())
    }

    /// Give focus back to `arbiter`; no-op when not focused
    pub fn release_focus(&self, arbiter: &FocusArbiter) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            if self.kind != EngineKind::Recognizer {
                return Err(self.invalid("releaseFocus", inner.state));
            }

            if inner.state.focus == Some(Focus::Focused) {
                let mut next = inner.state;
                next.focus = Some(Focus::Defocused);
                self.commit(&mut inner, next);
            }
        }
        self.events.deliver();

        if arbiter.release(self.id) {
            info!("Engine {}: defocused", self.id);
        }
        Ok(())
    }

    /// Run `f` while holding the state lock, only if the engine is allocated
    ///
    /// Deallocation cannot start while `f` runs. `f` must not call back into
    /// this state machine.
    pub fn while_allocated<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let inner = lock(&self.inner);
        if !inner.state.is_allocated() {
            return Err(self.invalid(operation, inner.state));
        }
        f()
    }

    /// Non-blocking: true iff every bit of `mask` is currently set
    pub fn test_engine_state(&self, mask: StateMask) -> bool {
        lock(&self.inner).state.matches(mask)
    }

    /// Block until `mask` holds
    ///
    /// On timeout the current state is returned (not an error), so callers
    /// re-test the mask to tell success from expiry. Fails with
    /// `Deallocated` if the engine enters `DEALLOCATED` during the wait and
    /// `mask` does not ask for it.
    pub fn wait_engine_state(&self, mask: StateMask, timeout: Option<Duration>) -> Result<EngineState> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = lock(&self.inner);
        let deallocations = inner.deallocations;

        loop {
            if inner.state.matches(mask) {
                return Ok(inner.state);
            }

            if inner.deallocations != deallocations && !mask.contains(StateMask::DEALLOCATED) {
                return Err(EngineError::Deallocated(mask.to_string()));
            }

            inner = match deadline {
                None => self.changed.wait(inner).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("Engine {}: wait for {} timed out", self.id, mask);
                        return Ok(inner.state);
                    }
                    self.changed
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
            };
        }
    }

    /// Pause gate for worker threads
    ///
    /// Blocks while the engine is not allocated or paused. Returns false if
    /// `stop` was raised instead.
    pub fn wait_until_resumed(&self, stop: &AtomicBool) -> bool {
        let mut inner = lock(&self.inner);
        loop {
            if stop.load(Ordering::SeqCst) {
                return false;
            }
            if inner.state.is_allocated() && inner.pause_depth == 0 {
                return true;
            }
            inner = self.changed.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wake every blocked waiter so it re-checks its condition
    pub fn wake_all(&self) {
        let _inner = lock(&self.inner);
        self.changed.notify_all();
    }

    /// Record queue occupancy (synthesizers only)
    pub fn set_queue_occupancy(&self, occupancy: QueueOccupancy) {
        self.post_queue_occupancy(occupancy);
        self.events.deliver();
    }

    /// Commit queue occupancy without delivering the event
    ///
    /// For callers holding their own locks; they must `deliver()` once
    /// those are released.
    pub(crate) fn post_queue_occupancy(&self, occupancy: QueueOccupancy) {
        let mut inner = lock(&self.inner);
        if inner.state.queue.is_none() {
            return;
        }

        let mut next = inner.state;
        next.queue = Some(occupancy);
        self.commit(&mut inner, next);
    }

    /// Flag a backend failure
    ///
    /// Sets `ERROR_OCCURRED` and posts an engine-error event. The allocation
    /// state is left alone so the caller can still deallocate.
    pub fn report_error(&self, item: Option<u64>, message: &str) {
        error!("Engine {}: {}", self.id, message);
        {
            let mut inner = lock(&self.inner);
            let mut next = inner.state;
            next.error_occurred = true;
            self.commit(&mut inner, next);
            self.events.post(EngineEvent::EngineError {
                item,
                message: message.to_string(),
            });
        }
        self.events.deliver();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopBackend;

    impl EngineBackend for NoopBackend {}

    #[test]
    fn test_synthesizer_allocates_resumed() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        machine.allocate(&NoopBackend).unwrap();

        assert!(machine.test_engine_state(StateMask::ALLOCATED | StateMask::RESUMED));
        assert_eq!(machine.pause_depth(), 0);
    }

    #[test]
    fn test_recognizer_allocates_paused_defocused() {
        let machine = EngineStateMachine::new(EngineKind::Recognizer);
        machine.allocate(&NoopBackend).unwrap();

        assert!(machine.test_engine_state(
            StateMask::ALLOCATED | StateMask::PAUSED | StateMask::DEFOCUSED
        ));

        // A single resume releases the initial pause
        machine.resume(&NoopBackend).unwrap();
        assert!(machine.test_engine_state(StateMask::RESUMED));
    }

    #[test]
    fn test_while_allocated_gates_on_allocation() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        let mut ran = false;

        let err = machine
            .while_allocated("speak", || {
                ran = true;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_invalid_transition());
        assert!(!ran);

        machine.allocate(&NoopBackend).unwrap();
        assert_eq!(machine.while_allocated("speak", || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_double_allocate_rejected() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        machine.allocate(&NoopBackend).unwrap();

        let before = machine.state();
        let err = machine.allocate(&NoopBackend).unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(machine.state(), before);
    }

    #[test]
    fn test_deallocate_when_deallocated_rejected() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        let err = machine.deallocate(&NoopBackend, || {}).unwrap_err();
        assert!(err.is_invalid_transition());
        assert!(machine.test_engine_state(StateMask::DEALLOCATED));
    }

    #[test]
    fn test_pause_requires_allocation() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        assert!(machine.pause(&NoopBackend).unwrap_err().is_invalid_transition());
        assert!(machine.resume(&NoopBackend).unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_resume_at_zero_depth_is_noop() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        machine.allocate(&NoopBackend).unwrap();

        machine.resume(&NoopBackend).unwrap();
        assert_eq!(machine.pause_depth(), 0);
        assert!(machine.test_engine_state(StateMask::RESUMED));
    }

    #[test]
    fn test_focus_rejected_for_synthesizer() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        machine.allocate(&NoopBackend).unwrap();

        let arbiter = FocusArbiter::new();
        assert!(machine.request_focus(&arbiter, None).unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_report_error_keeps_allocation() {
        let machine = EngineStateMachine::new(EngineKind::Synthesizer);
        machine.allocate(&NoopBackend).unwrap();
        machine.report_error(Some(3), "synthesis failed");

        assert!(machine.test_engine_state(StateMask::ALLOCATED | StateMask::ERROR_OCCURRED));
    }

    #[test]
    fn test_queue_occupancy_ignored_for_recognizer() {
        let machine = EngineStateMachine::new(EngineKind::Recognizer);
        machine.set_queue_occupancy(QueueOccupancy::NotEmpty);
        assert_eq!(machine.state().queue, None);
    }

    #[test]
    fn test_engine_ids_are_unique() {
        let a = EngineStateMachine::new(EngineKind::Recognizer);
        let b = EngineStateMachine::new(EngineKind::Recognizer);
        assert_ne!(a.id(), b.id());
    }
}
