//! Output pipeline orchestration
//!
//! `QueueManager` owns the two queues and the two worker threads that drain
//! them:
//!
//! ```text
//! append -> SynthesisQueue -> [synthesis worker] -> PlayQueue -> [playback worker] -> backend.play
//! ```
//!
//! An item is always in exactly one place: the synthesis queue, the play
//! queue, or the playback slot. Moving an item between the two queues happens
//! under the hand-off lock, and anything that must see both queues
//! consistently (cancellation sweeps, occupancy) takes that lock too. Queue
//! locks themselves are never nested.

use super::backends::SynthesisBackend;
use super::item::{ItemState, QueueItem, Speakable, SpeakableListener};
use super::play_queue::PlayQueue;
use super::synthesis_queue::SynthesisQueue;
use crate::engine::{lock, EngineEvent, EngineStateMachine, QueueOccupancy};
use crate::{EngineError, Result};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Item the playback worker is rendering
struct Playing {
    id: u64,
    /// Raised before `backend.stop()`; `play` polls it
    cancelled: Arc<AtomicBool>,
    /// `play` has returned; only notifications are left
    finished: bool,
}

struct Shared {
    machine: Arc<EngineStateMachine>,
    backend: Arc<dyn SynthesisBackend>,
    synthesis: SynthesisQueue,
    playback: PlayQueue,
    /// Held while an item moves from one queue to the other
    handoff: Mutex<()>,
    playing: Mutex<Option<Playing>>,
    /// Serializes occupancy recomputation
    occupancy: Mutex<()>,
    stop: AtomicBool,
}

/// Synthesis and playback workers plus the queues between them
pub struct QueueManager {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueManager {
    /// Create the queues and start both worker threads
    pub fn new(machine: Arc<EngineStateMachine>, backend: Arc<dyn SynthesisBackend>) -> Result<Self> {
        let shared = Arc::new(Shared {
            machine,
            backend,
            synthesis: SynthesisQueue::new(),
            playback: PlayQueue::new(),
            handoff: Mutex::new(()),
            playing: Mutex::new(None),
            occupancy: Mutex::new(()),
            stop: AtomicBool::new(false),
        });

        let engine_id = shared.machine.id();
        let synthesis = {
            let shared = shared.clone();
            thread::Builder::new()
                .name(format!("speechrt-synth-{}", engine_id))
                .spawn(move || shared.synthesis_loop())?
        };
        let playback = {
            let shared = shared.clone();
            thread::Builder::new()
                .name(format!("speechrt-play-{}", engine_id))
                .spawn(move || shared.playback_loop())?
        };

        Ok(Self {
            shared,
            workers: Mutex::new(vec![synthesis, playback]),
        })
    }

    /// Queue a speakable for synthesis and playback
    ///
    /// Rejected unless the engine is allocated. The check and the append
    /// happen under the engine's state lock, so an item can never slip in
    /// behind the cancel sweep of a concurrent deallocation.
    pub fn append_item(
        &self,
        speakable: Speakable,
        listener: Option<Arc<dyn SpeakableListener>>,
    ) -> Result<u64> {
        let shared = &self.shared;
        let id = shared
            .machine
            .while_allocated("speak", || shared.synthesis.append(speakable, listener))?;
        shared.update_occupancy();
        Ok(id)
    }

    /// Cancel item `id` wherever it is queued
    ///
    /// Returns false if the id is unknown, finished, or already playing;
    /// an item that started playing is left to finish.
    pub fn cancel(&self, id: u64) -> bool {
        let shared = &self.shared;

        let found = {
            let _handoff = lock(&shared.handoff);
            shared
                .synthesis
                .cancel_by_id(id)
                .or_else(|| shared.playback.cancel_by_id(id))
        };

        if let Some(item) = found {
            shared.finish_cancelled(&item);
            shared.update_occupancy();
            return true;
        }

        debug!("Cancel of item {}: not queued", id);
        false
    }

    /// Cancel everything queued and stop the item being played
    ///
    /// Returns how many items were cancelled.
    pub fn cancel_all(&self) -> usize {
        let shared = &self.shared;
        let (mut played, mut cancelled) = {
            let _handoff = lock(&shared.handoff);
            (shared.playback.cancel_all(), shared.synthesis.cancel_all())
        };
        let mut count = played.len() + cancelled.len();

        if shared.request_stop() {
            count += 1;
        }

        // Report downstream (older) items first
        played.append(&mut cancelled);
        for item in &played {
            shared.finish_cancelled(item);
        }

        info!("Cancelled {} items", count);
        shared.update_occupancy();
        count
    }

    /// Cancel whatever would be heard next
    ///
    /// Stops the playing item if there is one, otherwise cancels the oldest
    /// queued item. Returns false if the pipeline is empty.
    pub fn cancel_current(&self) -> bool {
        let shared = &self.shared;

        if shared.request_stop() {
            return true;
        }

        let found = {
            let _handoff = lock(&shared.handoff);
            shared
                .playback
                .cancel_head()
                .or_else(|| shared.synthesis.cancel_head())
        };

        if let Some(item) = found {
            shared.finish_cancelled(&item);
            shared.update_occupancy();
            return true;
        }

        false
    }

    /// True only when nothing is queued or playing
    pub fn is_queue_empty(&self) -> bool {
        self.shared.is_pipeline_empty()
    }

    /// Ids still waiting for synthesis or playback, oldest first
    pub fn queued_ids(&self) -> Vec<u64> {
        let _handoff = lock(&self.shared.handoff);
        let mut ids = self.shared.playback.ids();
        ids.extend(self.shared.synthesis.ids());
        ids
    }

    /// Id of the item being played, if any
    pub fn playing_id(&self) -> Option<u64> {
        lock(&self.shared.playing).as_ref().map(|p| p.id)
    }

    /// Stop both workers and wait for them to exit
    ///
    /// Queued items are dropped without events.
    pub fn shutdown(&self) {
        if self.shared.stop.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down output pipeline for engine {}", self.shared.machine.id());
        self.shared.synthesis.shutdown();
        self.shared.playback.shutdown();
        self.shared.machine.wake_all();
        if self.shared.request_stop() {
            debug!("Stopped in-flight playback during shutdown");
        }

        let current = thread::current().id();
        for handle in lock(&self.workers).drain(..) {
            if handle.thread().id() == current {
                // Shutdown requested from a worker callback; it exits on return
                continue;
            }
            if handle.join().is_err() {
                error!("Output worker panicked");
            }
        }
    }
}

impl Drop for QueueManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn synthesis_loop(&self) {
        info!("Synthesis worker started for engine {}", self.machine.id());

        while let Some(id) = self.synthesis.wait_for_pending() {
            // Items already mid-synthesis finish; the next one waits here
            if !self.machine.wait_until_resumed(&self.stop) {
                break;
            }

            let Some(speakable) = self.synthesis.begin_synthesis(id) else {
                continue;
            };

            debug!("Synthesizing item {}", id);
            let result = match &speakable {
                Speakable::Audio(audio) => Ok(audio.clone()),
                _ => self.backend.synthesize(&speakable),
            };

            match result {
                Ok(audio) => {
                    if self.synthesis.item_changed(id, audio) {
                        self.hand_off(id);
                    }
                }
                Err(e) => {
                    self.machine
                        .report_error(Some(id), &format!("Synthesis of item {} failed: {}", id, e));
                    if let Some(item) = self.synthesis.cancel_by_id(id) {
                        self.finish_cancelled(&item);
                    }
                    self.update_occupancy();
                }
            }
        }

        info!("Synthesis worker stopped for engine {}", self.machine.id());
    }

    /// Move a synthesized item into the play queue
    fn hand_off(&self, id: u64) {
        let moved = {
            let _handoff = lock(&self.handoff);
            match self.synthesis.remove_queue_item(id) {
                Some(item) => {
                    self.playback.add_queue_item(item);
                    true
                }
                None => false,
            }
        };

        if !moved {
            // Cancelled between synthesis and hand-off
            debug!("Item {} left the queue before hand-off", id);
            self.update_occupancy();
        }
    }

    fn playback_loop(&self) {
        info!("Playback worker started for engine {}", self.machine.id());

        while self.playback.wait_for_item() {
            if !self.machine.wait_until_resumed(&self.stop) {
                break;
            }

            let (item, cancelled) = {
                let mut playing = lock(&self.playing);
                let Some(item) = self.playback.try_next() else {
                    continue;
                };
                let cancelled = Arc::new(AtomicBool::new(false));
                *playing = Some(Playing {
                    id: item.id(),
                    cancelled: cancelled.clone(),
                    finished: false,
                });
                (item, cancelled)
            };

            self.play_item(item, &cancelled);

            // Cleared only after the ended/cancelled notifications, so the
            // queue cannot read as empty before listeners heard about the item
            lock(&self.playing).take();
            self.update_occupancy();
        }

        info!("Playback worker stopped for engine {}", self.machine.id());
    }

    fn play_item(&self, mut item: QueueItem, cancelled: &AtomicBool) {
        let id = item.id();
        item.advance(ItemState::Playing);

        if let Some(listener) = item.listener() {
            listener.speakable_started(id, item.speakable());
        }
        self.machine.dispatcher().emit(EngineEvent::SpeakableStarted {
            id,
            text: item.speakable().describe(),
        });

        let result = match item.audio() {
            Some(audio) => self.backend.play(audio, cancelled),
            None => Err(EngineError::Backend(format!("Item {} has no audio", id))),
        };

        if let Some(playing) = lock(&self.playing).as_mut() {
            playing.finished = true;
        }
        let stopped = cancelled.load(Ordering::SeqCst);

        if let Err(e) = &result {
            self.machine
                .report_error(Some(id), &format!("Playback of item {} failed: {}", id, e));
        }

        if stopped || result.is_err() {
            item.cancel();
            self.finish_cancelled(&item);
            return;
        }

        item.advance(ItemState::Done);
        debug!("Item {} done", id);
        if let Some(listener) = item.listener() {
            listener.speakable_ended(id, item.speakable());
        }
        self.machine.dispatcher().emit(EngineEvent::SpeakableEnded {
            id,
            text: item.speakable().describe(),
        });
    }

    /// Ask the backend to stop the item being played
    ///
    /// The item's flag is raised before the backend is told, so a `play`
    /// that has not started yet still sees the request.
    fn request_stop(&self) -> bool {
        let hit = {
            let playing = lock(&self.playing);
            match playing.as_ref() {
                Some(p) if !p.finished => !p.cancelled.swap(true, Ordering::SeqCst),
                _ => false,
            }
        };

        if hit {
            debug!("Stopping in-flight playback");
            if let Err(e) = self.backend.stop() {
                self.machine
                    .report_error(None, &format!("Failed to stop playback: {}", e));
            }
        }
        hit
    }

    /// Notify listeners that an item will never be heard
    fn finish_cancelled(&self, item: &QueueItem) {
        debug!("Item {} cancelled", item.id());
        if let Some(listener) = item.listener() {
            listener.speakable_cancelled(item.id(), item.speakable());
        }
        self.machine.dispatcher().emit(EngineEvent::SpeakableCancelled {
            id: item.id(),
            text: item.speakable().describe(),
        });
    }

    fn is_pipeline_empty(&self) -> bool {
        let _handoff = lock(&self.handoff);
        // Items leave the play queue and enter the playing slot atomically
        self.synthesis.is_queue_empty()
            && self.playback.is_queue_empty()
            && lock(&self.playing).is_none()
    }

    /// Recompute the QUEUE_EMPTY / QUEUE_NOT_EMPTY engine bit
    fn update_occupancy(&self) {
        {
            let _serial = lock(&self.occupancy);
            let occupancy = if self.is_pipeline_empty() {
                QueueOccupancy::Empty
            } else {
                QueueOccupancy::NotEmpty
            };
            self.machine.post_queue_occupancy(occupancy);
        }
        self.machine.dispatcher().deliver();
    }
}
