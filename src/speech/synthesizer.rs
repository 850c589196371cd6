//! Synthesizer facade
//!
//! Ties a synthesis backend to a state machine and an output pipeline and
//! exposes the speak/cancel/lifecycle calls applications use.

use super::backends::{create_backend, SynthesisBackend};
use super::item::{Speakable, SpeakableListener};
use super::manager::QueueManager;
use crate::config::Config;
use crate::engine::{EngineKind, EngineListener, EngineState, EngineStateMachine, StateMask};
use crate::Result;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

/// A speech synthesizer engine
pub struct Synthesizer {
    machine: Arc<EngineStateMachine>,
    backend: Arc<dyn SynthesisBackend>,
    manager: QueueManager,
}

impl Synthesizer {
    /// Create a synthesizer around `backend`
    ///
    /// Starts the worker threads; the engine itself starts deallocated.
    pub fn new(backend: Arc<dyn SynthesisBackend>) -> Result<Self> {
        info!("Creating synthesizer with backend '{}'", backend.id());
        let machine = Arc::new(EngineStateMachine::new(EngineKind::Synthesizer));
        let manager = QueueManager::new(machine.clone(), backend.clone())?;

        Ok(Self {
            machine,
            backend,
            manager,
        })
    }

    /// Create a synthesizer with the backend selected by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(create_backend(config)?)
    }

    pub fn backend_id(&self) -> &'static str {
        self.backend.id()
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

    pub fn remove_engine_listener(&self, listener: &Arc<dyn EngineListener>) -> bool {
        self.machine.remove_listener(listener)
    }

    pub fn allocate(&self) -> Result<()> {
        self.machine.allocate(self.backend.as_ref())
    }

    /// Deallocate, cancelling everything queued or playing
    pub fn deallocate(&self) -> Result<()> {
        self.machine
            .deallocate(self.backend.as_ref(), || {
                let cancelled = self.manager.cancel_all();
                debug!("Deallocation cancelled {} items", cancelled);
            })
    }

    /// Nested pause: both workers hold before their next item
    pub fn pause(&self) -> Result<()> {
        self.machine.pause(self.backend.as_ref())
    }

    /// Undo one `pause()`
    pub fn resume(&self) -> Result<()> {
        self.machine.resume(self.backend.as_ref())
    }

    pub fn test_engine_state(&self, mask: StateMask) -> bool {
        self.machine.test_engine_state(mask)
    }

    pub fn wait_engine_state(&self, mask: StateMask, timeout: Option<Duration>) -> Result<EngineState> {
        self.machine.wait_engine_state(mask, timeout)
    }

    /// Queue a speakable; returns its item id
    ///
    /// Only legal while allocated.
    pub fn speak(
        &self,
        speakable: Speakable,
        listener: Option<Arc<dyn SpeakableListener>>,
    ) -> Result<u64> {
        let id = self.manager.append_item(speakable, listener)?;
        debug!("Queued item {}", id);
        Ok(id)
    }

    pub fn speak_text(&self, text: &str) -> Result<u64> {
        self.speak(Speakable::Text(text.to_string()), None)
    }

    pub fn speak_markup(&self, markup: &str) -> Result<u64> {
        self.speak(Speakable::Markup(markup.to_string()), None)
    }

    /// Cancel one queued item; false if unknown or already playing
    pub fn cancel(&self, id: u64) -> bool {
        self.manager.cancel(id)
    }

    /// Cancel the playing item, or the oldest queued one
    pub fn cancel_current(&self) -> bool {
        self.manager.cancel_current()
    }

    /// Cancel everything, including in-flight playback
    pub fn cancel_all(&self) -> usize {
        self.manager.cancel_all()
    }

    /// True only when nothing is queued or playing
    pub fn is_queue_empty(&self) -> bool {
        self.manager.is_queue_empty()
    }

    /// Ids waiting for synthesis or playback, oldest first
    pub fn queued_ids(&self) -> Vec<u64> {
        self.manager.queued_ids()
    }

    pub fn playing_id(&self) -> Option<u64> {
        self.manager.playing_id()
    }
}

impl Drop for Synthesizer {
    fn drop(&mut self) {
        debug!("Dropping synthesizer {}", self.machine.id());
        self.manager.shutdown();
    }
}
