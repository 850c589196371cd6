//! Engine lifecycle core shared by recognizers and synthesizers

pub mod events;
pub mod focus;
pub mod machine;
pub mod state;

pub use events::{EngineEvent, EngineListener, EventDispatcher};
pub use focus::FocusArbiter;
pub use machine::EngineStateMachine;
pub use state::{Allocation, EngineKind, EngineState, Focus, Pause, QueueOccupancy, StateMask};

use crate::Result;
use std::sync::{Mutex, MutexGuard};

/// Lifecycle capabilities every vendor backend provides
///
/// All methods may block. The pause hooks run only when the pause depth
/// moves between 0 and 1, never for nested calls.
pub trait EngineBackend: Send + Sync {
    /// Acquire native resources
    fn allocate(&self) -> Result<()> {
        Ok(())
    }

    /// Release native resources
    fn deallocate(&self) -> Result<()> {
        Ok(())
    }

    /// Called when the engine first becomes paused
    fn pause_backend(&self) -> Result<()> {
        Ok(())
    }

    /// Called when the last pause is released
    fn resume_backend(&self) -> Result<()> {
        Ok(())
    }
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
