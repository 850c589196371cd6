//! Synthesized items waiting for playback

use super::item::QueueItem;
use crate::engine::lock;
use log::debug;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner {
    items: VecDeque<QueueItem>,
    shut_down: bool,
}

/// FIFO of items whose audio is ready
pub struct PlayQueue {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                shut_down: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Append a synthesized item
    ///
    /// Items arrive from the single synthesis worker in id order.
    pub fn add_queue_item(&self, item: QueueItem) {
        let mut inner = lock(&self.inner);
        debug!("Play queue: adding item {}", item.id());
        debug_assert!(inner.items.back().map_or(true, |last| last.id() < item.id()));
        inner.items.push_back(item);
        self.changed.notify_all();
    }

    /// Block until an item is at the head; false once shut down
    pub fn wait_for_item(&self) -> bool {
        let mut inner = lock(&self.inner);
        loop {
            if inner.shut_down {
                return false;
            }
            if !inner.items.is_empty() {
                return true;
            }
            inner = self.changed.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Pop the head without waiting
    pub fn try_next(&self) -> Option<QueueItem> {
        let mut inner = lock(&self.inner);
        let item = inner.items.pop_front();
        if item.is_some() {
            self.changed.notify_all();
        }
        item
    }

    /// Block until an item is at the head and hand it out
    ///
    /// `None` once the queue is shut down.
    pub fn get_next_queue_item(&self) -> Option<QueueItem> {
        loop {
            if !self.wait_for_item() {
                return None;
            }
            if let Some(item) = self.try_next() {
                return Some(item);
            }
        }
    }

    /// Wake anyone blocked on this queue to re-check it
    pub fn item_changed(&self) {
        let _inner = lock(&self.inner);
        self.changed.notify_all();
    }

    /// Remove item `id` whatever its state
    pub fn remove_queue_item(&self, id: u64) -> Option<QueueItem> {
        let mut inner = lock(&self.inner);
        let index = inner.items.iter().position(|item| item.id() == id)?;
        let item = inner.items.remove(index);
        self.changed.notify_all();
        item
    }

    /// Remove item `id` and mark it cancelled
    pub fn cancel_by_id(&self, id: u64) -> Option<QueueItem> {
        let mut item = self.remove_queue_item(id)?;
        item.cancel();
        debug!("Play queue: cancelled item {}", id);
        Some(item)
    }

    /// Remove the head item and mark it cancelled
    pub fn cancel_head(&self) -> Option<QueueItem> {
        let mut inner = lock(&self.inner);
        let mut item = inner.items.pop_front()?;
        item.cancel();
        debug!("Play queue: cancelled head item {}", item.id());
        self.changed.notify_all();
        Some(item)
    }

    /// Cancel the head item; false if the queue is empty
    pub fn cancel_item_at_top_of_queue(&self) -> bool {
        self.cancel_head().is_some()
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

    /// Release every blocked consumer; queued items stay put
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        inner.shut_down = true;
        self.changed.notify_all();
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}
