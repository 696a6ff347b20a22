use std::sync::Arc;

use super::{Assumption, VisibilityPolicy, assumption::all_valid};
use crate::class::{ClassId, MethodHandle};
use crate::val::{Symbol, Value};

/// Caller context a lookup is performed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupScope {
    pub visibility: VisibilityPolicy,
    /// Class of `self` at the call, consulted for protected methods.
    pub caller: Option<ClassId>,
}

impl LookupScope {
    pub fn new(visibility: VisibilityPolicy) -> Self {
        Self {
            visibility,
            caller: None,
        }
    }

    /// Scope used for `method_missing` handler lookup: visibility is ignored.
    pub fn unrestricted() -> Self {
        Self::new(VisibilityPolicy::Private)
    }

    pub fn with_caller(mut self, caller: ClassId) -> Self {
        self.caller = Some(caller);
        self
    }
}

/// Snapshot answer of a method lookup.
///
/// The struct never changes. It goes stale when any of its assumptions is
/// invalidated, which happens exactly when repeating the lookup could produce a
/// different method or flip found/not-found.
#[derive(Debug, Clone)]
pub struct MethodLookupResult {
    method: Option<MethodHandle>,
    assumptions: Vec<Arc<Assumption>>,
}

impl MethodLookupResult {
    pub fn new(method: Option<MethodHandle>, assumptions: Vec<Arc<Assumption>>) -> Self {
        Self { method, assumptions }
    }

    pub fn not_found(assumptions: Vec<Arc<Assumption>>) -> Self {
        Self::new(None, assumptions)
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.method.is_some()
    }

    #[inline]
    pub fn method(&self) -> Option<&MethodHandle> {
        self.method.as_ref()
    }

    #[inline]
    pub fn assumptions(&self) -> &[Arc<Assumption>] {
        &self.assumptions
    }

    pub fn is_valid(&self) -> bool {
        all_valid(&self.assumptions)
    }

    pub fn into_parts(self) -> (Option<MethodHandle>, Vec<Arc<Assumption>>) {
        (self.method, self.assumptions)
    }
}

/// Method resolution service consumed by the dispatch core.
///
/// `lookup` must be deterministic for a fixed method-table state and must hand
/// out assumptions that are invalidated whenever that state changes in a way
/// that affects the answer.
pub trait MethodLookup: Send + Sync {
    fn class_of(&self, receiver: &Value) -> ClassId;

    fn class_name(&self, class: ClassId) -> Arc<str>;

    fn lookup(&self, class: ClassId, name: Symbol, scope: LookupScope) -> MethodLookupResult;
}
