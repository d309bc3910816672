//! Identity types for the analysis pipeline.
//!
//! IDs are newtypes over integers. `ModuleId` doubles as the index of the
//! module in its graph's declared order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index into `AnalysisGraph::modules`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub const INVALID: ModuleId = ModuleId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ModuleId(INVALID)")
        } else {
            write!(f, "ModuleId({})", self.0)
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Process-unique identifier of a buffer subscriber.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(0);

impl SubscriberId {
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

/// Monotonic pass number. Pass 1 is the first pass after a start.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PassId(pub u64);

impl fmt::Debug for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PassId({})", self.0)
    }
}
