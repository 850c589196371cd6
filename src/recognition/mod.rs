//! Recognizer facade
//!
//! Native recognizers deliver results from their own threads. They get the
//! sending half of a channel when recognition starts and never touch engine
//! state; the application pulls results from the receiving half, and only
//! results that arrive while the recognizer is resumed and focused are kept.

use crate::engine::{
    lock, EngineBackend, EngineKind, EngineListener, EngineState, EngineStateMachine,
    FocusArbiter, StateMask,
};
use crate::Result;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// What the recognizer heard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecognitionResult {
    /// Utterance matched a grammar rule
    Accepted { rule_name: String, utterance: String },
    /// Speech was heard but matched nothing
    NoMatch,
}

/// Recognition capabilities of a vendor backend
pub trait RecognizerBackend: EngineBackend {
    /// Unique backend name
    fn id(&self) -> &'static str;

    /// Begin recognizing; results go to `results` from any thread
    fn start_recognition(&self, results: Sender<RecognitionResult>) -> Result<()>;

    /// Stop the recognition loop started by `start_recognition`
    fn stop_recognition(&self) -> Result<()> {
        Ok(())
    }
}

/// Allocation also starts/stops the recognition loop
struct Lifecycle<'a> {
    backend: &'a dyn RecognizerBackend,
    results: &'a Sender<RecognitionResult>,
}

impl EngineBackend for Lifecycle<'_> {
    fn allocate(&self) -> Result<()> {
        self.backend.allocate()?;
        if let Err(e) = self.backend.start_recognition(self.results.clone()) {
            if let Err(cleanup) = self.backend.deallocate() {
                warn!("Cleanup after failed recognition start failed: {}", cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    fn deallocate(&self) -> Result<()> {
        self.backend.stop_recognition()?;
        self.backend.deallocate()
    }

    fn pause_backend(&self) -> Result<()> {
        self.backend.pause_backend()
    }

    fn resume_backend(&self) -> Result<()> {
        self.backend.resume_backend()
    }
}

/// A speech recognizer engine
pub struct Recognizer {
    machine: Arc<EngineStateMachine>,
    backend: Arc<dyn RecognizerBackend>,
    arbiter: Arc<FocusArbiter>,
    sender: Sender<RecognitionResult>,
    results: Mutex<Receiver<RecognitionResult>>,
}

impl Recognizer {
    /// Create a recognizer competing for focus through `arbiter`
    pub fn new(backend: Arc<dyn RecognizerBackend>, arbiter: Arc<FocusArbiter>) -> Self {
        info!("Creating recognizer with backend '{}'", backend.id());
        let (sender, receiver) = channel();

        Self {
            machine: Arc::new(EngineStateMachine::new(EngineKind::Recognizer)),
            backend,
            arbiter,
            sender,
            results: Mutex::new(receiver),
        }
    }

    fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle {
            backend: self.backend.as_ref(),
            results: &self.sender,
        }
    }

    pub fn id(&self) -> u64 {
        self.machine.id()
    }

    pub fn state_machine(&self) -> &Arc<EngineStateMachine> {
        &self.machine
    }

    pub fn state(&self) -> EngineState {
        self.machine.state()
    }

    pub fn add_engine_listener(&self, listener: Arc<dyn EngineListener>) {
        self.machine.add_listener(listener);
    }

    /// Allocate and start recognizing; the recognizer starts paused
    pub fn allocate(&self) -> Result<()> {
        self.machine.allocate(&self.lifecycle())
    }

    /// Stop recognizing, drop focus and discard undelivered results
    pub fn deallocate(&self) -> Result<()> {
        self.machine.deallocate(&self.lifecycle(), || {
            if let Err(e) = self.machine.release_focus(&self.arbiter) {
                debug!("Releasing focus during deallocation failed: {}", e);
            }
            let discarded = lock(&self.results).try_iter().count();
            if discarded > 0 {
                debug!("Discarded {} undelivered results", discarded);
            }
        })
    }

    pub fn pause(&self) -> Result<()> {
        self.machine.pause(&self.lifecycle())
    }

    pub fn resume(&self) -> Result<()> {
        self.machine.resume(&self.lifecycle())
    }

    /// Take focus; blocks while another recognizer holds it
    pub fn request_focus(&self, timeout: Option<Duration>) -> Result<()> {
        self.machine.request_focus(&self.arbiter, timeout)
    }

    pub fn release_focus(&self) -> Result<()> {
        self.machine.release_focus(&self.arbiter)
    }

    pub fn test_engine_state(&self, mask: StateMask) -> bool {
        self.machine.test_engine_state(mask)
    }

    pub fn wait_engine_state(&self, mask: StateMask, timeout: Option<Duration>) -> Result<EngineState> {
        self.machine.wait_engine_state(mask, timeout)
    }

    /// Next result heard while resumed and focused
    ///
    /// Results arriving in any other state are dropped. Returns `None` when
    /// `timeout` elapses first; `None` timeout waits forever.
    pub fn next_result(&self, timeout: Option<Duration>) -> Option<RecognitionResult> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let results = lock(&self.results);
        let listening = StateMask::ALLOCATED | StateMask::RESUMED | StateMask::FOCUSED;

        loop {
            let result = match deadline {
                None => results.recv().ok()?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match results.recv_timeout(remaining) {
                        Ok(result) => result,
                        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                            return None
                        }
                    }
                }
            };

            if self.machine.test_engine_state(listening) {
                return Some(result);
            }
            debug!("Engine {}: dropping {:?} (not listening)", self.id(), result);
        }
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        // Never leave the arbiter owned by a dead engine
        self.arbiter.release(self.machine.id());
    }
}
