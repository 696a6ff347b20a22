use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lifecycle position of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheState {
    Unresolved,
    Monomorphic,
    Polymorphic,
    /// Terminal: every call is dispatched uncached.
    Megamorphic,
}

/// Point-in-time copy of a call site's counters.
///
/// Counters are read independently, so a snapshot taken while other threads
/// dispatch is only approximately consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallSiteStats {
    pub state: CacheState,
    pub depth: usize,
    pub calls: u64,
    pub hits: u64,
    pub extensions: u64,
    pub races: u64,
    pub stale_skips: u64,
    pub uncached_calls: u64,
}

impl CallSiteStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.calls == 0 { 0.0 } else { self.hits as f64 / self.calls as f64 }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SiteCounters {
    pub(crate) calls: AtomicU64,
    pub(crate) hits: AtomicU64,
    pub(crate) extensions: AtomicU64,
    pub(crate) races: AtomicU64,
    pub(crate) stale_skips: AtomicU64,
    pub(crate) uncached_calls: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl SiteCounters {
    pub(crate) fn snapshot(&self, state: CacheState, depth: usize) -> CallSiteStats {
        CallSiteStats {
            state,
            depth,
            calls: self.calls.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            extensions: self.extensions.load(Ordering::Relaxed),
            races: self.races.load(Ordering::Relaxed),
            stale_skips: self.stale_skips.load(Ordering::Relaxed),
            uncached_calls: self.uncached_calls.load(Ordering::Relaxed),
        }
    }
}
