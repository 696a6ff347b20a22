use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One-way validity flag guarding a cached lookup result.
///
/// Starts valid and can only ever become invalid. Whoever mutates the state a
/// cached result depends on calls [`Assumption::invalidate`]; dispatch checks
/// [`Assumption::is_valid`] before every guarded action.
pub struct Assumption {
    name: Arc<str>,
    valid: AtomicBool,
}

impl Assumption {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            valid: AtomicBool::new(true),
        })
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Returns `true` if this call performed the valid -> invalid transition.
    pub fn invalidate(&self) -> bool {
        let was_valid = self.valid.swap(false, Ordering::AcqRel);
        if was_valid {
            tracing::trace!(target: "lkr::dispatch::invalidate", assumption = %self.name, "assumption invalidated");
        }
        was_valid
    }

    /// Invalidate the assumption in `slot` and replace it with a fresh one of the
    /// same name.
    pub fn renew(slot: &mut Arc<Assumption>) {
        let fresh = Assumption::new(&slot.name);
        let stale = std::mem::replace(slot, fresh);
        stale.invalidate();
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[inline]
pub(crate) fn all_valid(assumptions: &[Arc<Assumption>]) -> bool {
    assumptions.iter().all(|a| a.is_valid())
}

impl fmt::Debug for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assumption")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .finish()
    }
}
