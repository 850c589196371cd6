//! Items waiting for (or undergoing) text-to-audio synthesis
//!
//! Many callers append; one synthesis worker consumes. The head of the queue
//! is always the next item to synthesize and the next to hand to playback,
//! so order is never skipped ahead.

use super::item::{Audio, ItemState, QueueItem, Speakable, SpeakableListener};
use crate::engine::lock;
use crate::{EngineError, Result};
use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

struct Inner {
    items: VecDeque<QueueItem>,
    next_id: u64,
    shut_down: bool,
}

/// FIFO of items awaiting synthesis
pub struct SynthesisQueue {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl SynthesisQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                next_id: 1,
                shut_down: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Queue a speakable at the tail and return its id
    ///
    /// Ids increase monotonically, so id order is append order.
    pub fn append(
        &self,
        speakable: Speakable,
        listener: Option<Arc<dyn SpeakableListener>>,
    ) -> Result<u64> {
        let mut inner = lock(&self.inner);
        if inner.shut_down {
            return Err(EngineError::ShutDown);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        debug!("Synthesis queue: appending item {}", id);
        inner.items.push_back(QueueItem::new(id, speakable, listener));
        self.changed.notify_all();
        Ok(id)
    }

    /// Block until the head item is waiting to be synthesized
    ///
    /// Returns its id, or `None` once the queue is shut down.
    pub fn wait_for_pending(&self) -> Option<u64> {
        let mut inner = lock(&self.inner);
        loop {
            if inner.shut_down {
                return None;
            }
            if let Some(head) = inner.items.front() {
                if head.state() == ItemState::Pending {
                    return Some(head.id());
                }
            }
            inner = self.changed.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Mark item `id` as synthesizing and return what to synthesize
    ///
    /// `None` if the item is no longer the pending head (it was cancelled).
    pub fn begin_synthesis(&self, id: u64) -> Option<Speakable> {
        let mut inner = lock(&self.inner);
        let head = inner.items.front_mut()?;
        if head.id() != id || !head.advance(ItemState::Synthesizing) {
            return None;
        }
        Some(head.speakable().clone())
    }

    /// Store audio for item `id`, mark it synthesized and wake waiters
    ///
    /// Returns false if the item was removed while it was being synthesized;
    /// the audio is then discarded.
    pub fn item_changed(&self, id: u64, audio: Audio) -> bool {
        let mut inner = lock(&self.inner);
        let stored = match inner.items.iter_mut().find(|item| item.id() == id) {
            Some(item) => item.set_audio(audio),
            None => false,
        };

        if stored {
            debug!("Synthesis queue: item {} synthesized", id);
            self.changed.notify_all();
        } else {
            debug!("Synthesis queue: discarding audio for removed item {}", id);
        }
        stored
    }

    /// Block until the head item is synthesized, then hand it out
    ///
    /// If the head is removed while waiting, the new head is awaited.
    /// Returns `None` once the queue is shut down.
    pub fn get_next_queue_item(&self) -> Option<QueueItem> {
        let mut inner = lock(&self.inner);
        loop {
            if inner.shut_down {
                return None;
            }
            let ready = inner
                .items
                .front()
                .map(|head| head.state() == ItemState::Synthesized)
                .unwrap_or(false);
            if ready {
                let item = inner.items.pop_front();
                self.changed.notify_all();
                return item;
            }
            inner = self.changed.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Remove item `id` whatever its state
    pub fn remove_queue_item(&self, id: u64) -> Option<QueueItem> {
        let mut inner = lock(&self.inner);
        let index = inner.items.iter().position(|item| item.id() == id)?;
        let item = inner.items.remove(index);
        self.changed.notify_all();
        item
    }

    /// Remove the head item and mark it cancelled
    pub fn cancel_head(&self) -> Option<QueueItem> {
        let mut inner = lock(&self.inner);
        let mut item = inner.items.pop_front()?;
        item.cancel();
        debug!("Synthesis queue: cancelled head item {}", item.id());
        self.changed.notify_all();
        Some(item)
    }

    /// Remove item `id` and mark it cancelled
    pub fn cancel_by_id(&self, id: u64) -> Option<QueueItem> {
        let mut item = self.remove_queue_item(id)?;
        item.cancel();
        debug!("Synthesis queue: cancelled item {}", id);
        Some(item)
    }

    /// Cancel the head item; false if the queue is empty
    ///
    /// A synthesis already running for that item is not interrupted, its
    /// result is dropped when it completes.
    pub fn cancel_first_item(&self) -> bool {
        self.cancel_head().is_some()
    }

    /// Cancel item `id`; false if it is not (or no longer) queued
    pub fn cancel_item(&self, id: u64) -> bool {
        self.cancel_by_id(id).is_some()
    }

    /// Remove and cancel every queued item, head first
    pub fn cancel_all(&self) -> Vec<QueueItem> {
        let mut inner = lock(&self.inner);
        let mut items: Vec<QueueItem> = inner.items.drain(..).collect();
        for item in &mut items {
            item.cancel();
        }
        self.changed.notify_all();
        items
    }

    pub fn is_queue_empty(&self) -> bool {
        lock(&self.inner).items.is_empty()
    }

    /// Ids currently queued, head first
    pub fn ids(&self) -> Vec<u64> {
        lock(&self.inner).items.iter().map(QueueItem::id).collect()
    }

    /// Refuse further appends and release every blocked consumer
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        inner.shut_down = true;
        self.changed.notify_all();
    }
}

impl Default for SynthesisQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn synthesize(queue: &SynthesisQueue, id: u64) {
        assert_eq!(queue.wait_for_pending(), Some(id));
        assert!(queue.begin_synthesis(id).is_some());
        assert!(queue.item_changed(id, Audio::wav(vec![id as u8])));
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let queue = SynthesisQueue::new();
        let a = queue.append("a".into(), None).unwrap();
        let b = queue.append("b".into(), None).unwrap();
        assert!(b > a);
        assert_eq!(queue.ids(), vec![a, b]);
        assert!(!queue.is_queue_empty());
    }

    #[test]
    fn test_cancel_first_item_on_empty_queue() {
        let queue = SynthesisQueue::new();
        assert!(!queue.cancel_first_item());
    }

    #[test]
    fn test_cancel_first_item_removes_only_head() {
        let queue = SynthesisQueue::new();
        let a = queue.append("a".into(), None).unwrap();
        let b = queue.append("b".into(), None).unwrap();

        assert!(queue.cancel_first_item());
        assert_eq!(queue.ids(), vec![b]);
        assert!(!queue.cancel_item(a));
    }

    #[test]
    fn test_cancel_second_item_keeps_first_retrievable() {
        let queue = SynthesisQueue::new();
        let a = queue.append("a".into(), None).unwrap();
        let b = queue.append("b".into(), None).unwrap();

        assert!(queue.cancel_item(b));
        assert!(!queue.cancel_item(b));

        synthesize(&queue, a);
        let item = queue.get_next_queue_item().unwrap();
        assert_eq!(item.id(), a);
        assert_eq!(item.state(), ItemState::Synthesized);
        assert!(queue.is_queue_empty());
    }

    #[test]
    fn test_audio_for_cancelled_item_is_discarded() {
        let queue = SynthesisQueue::new();
        let a = queue.append("a".into(), None).unwrap();

        assert_eq!(queue.wait_for_pending(), Some(a));
        assert!(queue.begin_synthesis(a).is_some());
        assert!(queue.cancel_first_item());
        assert!(!queue.item_changed(a, Audio::wav(vec![1])));
    }

    #[test]
    fn test_begin_synthesis_refuses_non_head() {
        let queue = SynthesisQueue::new();
        let _a = queue.append("a".into(), None).unwrap();
        let b = queue.append("b".into(), None).unwrap();
        assert!(queue.begin_synthesis(b).is_none());
    }

    #[test]
    fn test_get_next_blocks_until_synthesized() {
        let queue = Arc::new(SynthesisQueue::new());
        let a = queue.append("a".into(), None).unwrap();

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.get_next_queue_item().map(|item| item.id()))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_finished());

        synthesize(&queue, a);
        assert_eq!(consumer.join().unwrap(), Some(a));
    }

    #[test]
    fn test_shutdown_releases_waiters_and_rejects_appends() {
        let queue = Arc::new(SynthesisQueue::new());

        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_for_pending())
        };

        thread::sleep(Duration::from_millis(20));
        queue.shutdown();

        assert_eq!(waiter.join().unwrap(), None);
        assert!(matches!(queue.append("late".into(), None), Err(EngineError::ShutDown)));
    }
}
