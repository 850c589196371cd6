//! Exclusive recognizer focus
//!
//! Only one recognizer in the process may hold focus. Instead of a global,
//! the application creates one `FocusArbiter` and hands an `Arc` of it to
//! every recognizer it builds.

use super::lock;
use crate::{EngineError, Result};
use log::debug;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Grants focus to one owner at a time
#[derive(Debug, Default)]
pub struct FocusArbiter {
    owner: Mutex<Option<u64>>,
    released: Condvar,
}

impl FocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current focus owner, if any
    pub fn owner(&self) -> Option<u64> {
        *lock(&self.owner)
    }

    /// Take focus for `owner`, waiting for the current holder to release it
    ///
    /// Re-acquiring by the current owner succeeds immediately. `None` waits
    /// forever; otherwise fails with `Timeout` once the deadline passes.
    pub fn acquire(&self, owner: u64, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut current = lock(&self.owner);

        loop {
            match *current {
                None => {
                    *current = Some(owner);
                    debug!("Focus granted to engine {}", owner);
                    return Ok(());
                }
                Some(holder) if holder == owner => return Ok(()),
                Some(holder) => {
                    debug!("Engine {} waiting for focus held by {}", owner, holder);
                    current = match deadline {
                        None => self
                            .released
                            .wait(current)
                            .unwrap_or_else(|e| e.into_inner()),
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return Err(EngineError::Timeout(timeout.unwrap_or_default()));
                            }
                            self.released
                                .wait_timeout(current, deadline - now)
                                .unwrap_or_else(|e| e.into_inner())
                                .0
                        }
                    };
                }
            }
        }
    }

    /// Give up focus; returns false if `owner` did not hold it
    pub fn release(&self, owner: u64) -> bool {
        let mut current = lock(&self.owner);
        if *current != Some(owner) {
            return false;
        }

        *current = None;
        debug!("Focus released by engine {}", owner);
        self.released.notify_all();
        true
    }
}
