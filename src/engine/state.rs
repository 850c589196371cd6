//! Compound engine state
//!
//! An engine is in several lifecycle states at once: it can be allocated,
//! paused and defocused simultaneously. Each independent fact lives on its
//! own axis so that contradictory combinations (paused *and* resumed) cannot
//! be built. `StateMask` offers the bit-set view callers use to test or wait
//! on several facts in one call.

use serde::Serialize;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Which kind of engine owns a state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Synthesizer,
    Recognizer,
}

/// Allocation axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Allocation {
    Deallocated,
    AllocatingResources,
    Allocated,
    DeallocatingResources,
}

/// Pause axis (meaningful while allocated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pause {
    Paused,
    Resumed,
}

/// Focus axis (recognizers only, meaningful while allocated)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    Focused,
    Defocused,
}

/// Queue axis (synthesizers only), derived from pipeline occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOccupancy {
    Empty,
    NotEmpty,
}

/// Bit-set over every value of every axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateMask(u32);

impl StateMask {
    pub const NONE: StateMask = StateMask(0);
    pub const DEALLOCATED: StateMask = StateMask(1 << 0);
    pub const ALLOCATING_RESOURCES: StateMask = StateMask(1 << 1);
    pub const ALLOCATED: StateMask = StateMask(1 << 2);
    pub const DEALLOCATING_RESOURCES: StateMask = StateMask(1 << 3);
    pub const PAUSED: StateMask = StateMask(1 << 4);
    pub const RESUMED: StateMask = StateMask(1 << 5);
    pub const FOCUSED: StateMask = StateMask(1 << 6);
    pub const DEFOCUSED: StateMask = StateMask(1 << 7);
    pub const QUEUE_EMPTY: StateMask = StateMask(1 << 8);
    pub const QUEUE_NOT_EMPTY: StateMask = StateMask(1 << 9);
    pub const ERROR_OCCURRED: StateMask = StateMask(1 << 10);

    const NAMES: [(StateMask, &'static str); 11] = [
        (StateMask::DEALLOCATED, "DEALLOCATED"),
        (StateMask::ALLOCATING_RESOURCES, "ALLOCATING_RESOURCES"),
        (StateMask::ALLOCATED, "ALLOCATED"),
        (StateMask::DEALLOCATING_RESOURCES, "DEALLOCATING_RESOURCES"),
        (StateMask::PAUSED, "PAUSED"),
        (StateMask::RESUMED, "RESUMED"),
        (StateMask::FOCUSED, "FOCUSED"),
        (StateMask::DEFOCUSED, "DEFOCUSED"),
        (StateMask::QUEUE_EMPTY, "QUEUE_EMPTY"),
        (StateMask::QUEUE_NOT_EMPTY, "QUEUE_NOT_EMPTY"),
        (StateMask::ERROR_OCCURRED, "ERROR_OCCURRED"),
    ];

    /// Raw bit value
    pub fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    pub fn contains(self, other: StateMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set in `self`
    pub fn intersects(self, other: StateMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for StateMask {
    type Output = StateMask;

    fn bitor(self, rhs: StateMask) -> StateMask {
        StateMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for StateMask {
    fn bitor_assign(&mut self, rhs: StateMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for StateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();

        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Snapshot of an engine's compound state
///
/// `focus` is `None` for synthesizers and `queue` is `None` for recognizers,
/// so axes that do not apply to an engine kind never show up in its bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineState {
    pub allocation: Allocation,
    pub pause: Pause,
    pub focus: Option<Focus>,
    pub queue: Option<QueueOccupancy>,
    pub error_occurred: bool,
}

impl EngineState {
    /// Initial state of a freshly constructed engine
    pub fn initial(kind: EngineKind) -> Self {
        match kind {
            EngineKind::Synthesizer => Self {
                allocation: Allocation::Deallocated,
                pause: Pause::Resumed,
                focus: None,
                queue: Some(QueueOccupancy::Empty),
                error_occurred: false,
            },
            EngineKind::Recognizer => Self {
                allocation: Allocation::Deallocated,
                pause: Pause::Paused,
                focus: Some(Focus::Defocused),
                queue: None,
                error_occurred: false,
            },
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.allocation == Allocation::Allocated
    }

    /// Bits that currently hold
    ///
    /// Pause and focus bits are only reported while allocated.
    pub fn bits(&self) -> StateMask {
        let mut mask = match self.allocation {
            Allocation::Deallocated => StateMask::DEALLOCATED,
            Allocation::AllocatingResources => StateMask::ALLOCATING_RESOURCES,
            Allocation::Allocated => StateMask::ALLOCATED,
            Allocation::DeallocatingResources => StateMask::DEALLOCATING_RESOURCES,
        };

        if self.is_allocated() {
            mask |= match self.pause {
                Pause::Paused => StateMask::PAUSED,
                Pause::Resumed => StateMask::RESUMED,
            };

            if let Some(focus) = self.focus {
                mask |= match focus {
                    Focus::Focused => StateMask::FOCUSED,
                    Focus::Defocused => StateMask::DEFOCUSED,
                };
            }
        }

        if let Some(queue) = self.queue {
            mask |= match queue {
                QueueOccupancy::Empty => StateMask::QUEUE_EMPTY,
                QueueOccupancy::NotEmpty => StateMask::QUEUE_NOT_EMPTY,
            };
        }

        if self.error_occurred {
            mask |= StateMask::ERROR_OCCURRED;
        }

        mask
    }

    /// True iff every bit in `mask` is currently set
    pub fn matches(&self, mask: StateMask) -> bool {
        self.bits().contains(mask)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}
