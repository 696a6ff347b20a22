//! Adaptive call-site dispatch.
//!
//! A [`CallSite`] starts unresolved, learns one guarded specialization per
//! receiver category it sees, and after `cache_limit` specializations gives up
//! and dispatches uncached forever. Reads of the chain never lock; extension is
//! serialized per call site.

mod assumption;
mod call;
mod call_site;
mod lookup;
mod missing;
mod services;
mod specialization;
mod stats;
mod uncached;

use serde::{Deserialize, Serialize};

use crate::class::ClassId;

pub use assumption::Assumption;
pub use call::CallExpression;
pub use call_site::CallSite;
pub use lookup::{LookupScope, MethodLookup, MethodLookupResult};
pub use services::{ExceptionFactory, ForeignFailure, InteropBridge, NoInterop, StandardExceptions};
pub use specialization::SpecializationKind;
pub use stats::{CacheState, CallSiteStats};
pub use uncached::dispatch_uncached;

/// What the dispatch produces once a target is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchAction {
    /// Invoke the method and return its result.
    CallMethod,
    /// Answer whether the receiver responds to the name, as a `Bool`.
    RespondTo,
}

/// What to do when lookup finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissingBehavior {
    /// Return [`crate::val::Value::Missing`] to the caller without raising.
    ReturnMissing,
    /// Forward to the receiver's `method_missing` handler.
    CallMethodMissing,
}

/// Which method visibilities are eligible targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisibilityPolicy {
    /// Only public methods (explicit-receiver reflection such as `public_send`).
    Public,
    /// Public methods, and protected methods visible to the caller class.
    Protected,
    /// Visibility is ignored (implicit-receiver calls, `send`).
    Private,
}

/// Per-call-site dispatch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchConfiguration {
    Public,
    Protected,
    Private,
    PublicReturnMissing,
    PrivateReturnMissing,
}

impl DispatchConfiguration {
    pub fn visibility(self) -> VisibilityPolicy {
        match self {
            DispatchConfiguration::Public | DispatchConfiguration::PublicReturnMissing => VisibilityPolicy::Public,
            DispatchConfiguration::Protected => VisibilityPolicy::Protected,
            DispatchConfiguration::Private | DispatchConfiguration::PrivateReturnMissing => VisibilityPolicy::Private,
        }
    }

    pub fn missing_behavior(self) -> MissingBehavior {
        match self {
            DispatchConfiguration::PublicReturnMissing | DispatchConfiguration::PrivateReturnMissing => {
                MissingBehavior::ReturnMissing
            }
            _ => MissingBehavior::CallMethodMissing,
        }
    }
}

/// Everything besides the receiver and arguments that decides a dispatch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchPolicy {
    pub scope: LookupScope,
    pub action: DispatchAction,
    pub missing: MissingBehavior,
}

impl DispatchPolicy {
    pub fn call(config: DispatchConfiguration) -> Self {
        Self {
            scope: LookupScope::new(config.visibility()),
            action: DispatchAction::CallMethod,
            missing: config.missing_behavior(),
        }
    }

    /// `respond_to?` semantics: public methods only unless `include_private`.
    pub fn respond_to(include_private: bool) -> Self {
        let visibility = if include_private {
            VisibilityPolicy::Private
        } else {
            VisibilityPolicy::Public
        };
        Self {
            scope: LookupScope::new(visibility),
            action: DispatchAction::RespondTo,
            missing: MissingBehavior::ReturnMissing,
        }
    }

    pub fn with_caller(mut self, caller: ClassId) -> Self {
        self.scope = self.scope.with_caller(caller);
        self
    }
}

#[cfg(test)]
mod dispatch_test;
