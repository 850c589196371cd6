//! Shared test doubles
//!
//! `RecordingBackend` stands in for a vendor engine: it "synthesizes" text
//! into deferred-text audio and records what it was asked to play. Playback
//! can be held open so tests can act while an item is in flight.

#![allow(dead_code)]

use speechrt::engine::{EngineBackend, EngineEvent, EngineListener};
use speechrt::speech::markup;
use speechrt::speech::{Audio, Speakable, SynthesisBackend};
use speechrt::{EngineError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct RecordingBackend {
    /// Texts handed to `play`, in call order
    pub started: Mutex<Vec<String>>,
    /// Texts whose playback ran to completion
    pub completed: Mutex<Vec<String>>,
    /// Synthesis of this text fails
    pub fail_synthesis_of: Option<String>,
    pub fail_allocate: bool,
    pub fail_deallocate: bool,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    hold: Mutex<bool>,
    stopped: AtomicBool,
    released: Condvar,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_synthesis_of(text: &str) -> Self {
        Self {
            fail_synthesis_of: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_deallocate() -> Self {
        Self {
            fail_deallocate: true,
            ..Self::default()
        }
    }

    pub fn failing_allocate() -> Self {
        Self {
            fail_allocate: true,
            ..Self::default()
        }
    }

    /// Make every `play` block until `release()` or `stop()`
    pub fn hold(&self) {
        *self.hold.lock().unwrap() = true;
    }

    pub fn release(&self) {
        *self.hold.lock().unwrap() = false;
        self.released.notify_all();
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

impl EngineBackend for RecordingBackend {
    fn allocate(&self) -> Result<()> {
        if self.fail_allocate {
            return Err(EngineError::Backend("no audio device".to_string()));
        }
        Ok(())
    }

    fn deallocate(&self) -> Result<()> {
        if self.fail_deallocate {
            return Err(EngineError::Backend("device busy".to_string()));
        }
        Ok(())
    }

    fn pause_backend(&self) -> Result<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resume_backend(&self) -> Result<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SynthesisBackend for RecordingBackend {
    fn id(&self) -> &'static str {
        "recording"
    }

    fn synthesize(&self, speakable: &Speakable) -> Result<Audio> {
        let text = match speakable {
            Speakable::Text(text) => text.clone(),
            Speakable::Markup(source) => markup::to_plain_text(source),
            Speakable::Audio(audio) => return Ok(audio.clone()),
        };

        if self.fail_synthesis_of.as_deref() == Some(text.as_str()) {
            return Err(EngineError::Backend(format!("cannot say '{}'", text)));
        }
        Ok(Audio::deferred_text(&text))
    }

    fn play(&self, audio: &Audio, cancelled: &AtomicBool) -> Result<()> {
        let text = audio.as_text().unwrap_or("<wav>").to_string();
        self.started.lock().unwrap().push(text.clone());

        // Like the real backends, a stop() from before this call is forgotten
        self.stopped.store(false, Ordering::SeqCst);

        let mut held = self.hold.lock().unwrap();
        while *held && !self.stopped.load(Ordering::SeqCst) && !cancelled.load(Ordering::SeqCst) {
            held = self
                .released
                .wait_timeout(held, Duration::from_millis(10))
                .unwrap()
                .0;
        }
        drop(held);

        if cancelled.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.completed.lock().unwrap().push(text);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let _held = self.hold.lock().unwrap();
        self.stopped.store(true, Ordering::SeqCst);
        self.released.notify_all();
        Ok(())
    }
}

/// Listener recording every engine event
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<EngineEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Position of the first event matching `pred`
    pub fn position(&self, pred: impl Fn(&EngineEvent) -> bool) -> Option<usize> {
        self.events.lock().unwrap().iter().position(pred)
    }
}

impl EngineListener for EventLog {
    fn engine_event(&self, event: &EngineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
