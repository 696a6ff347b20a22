use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;

use super::assumption::{Assumption, all_valid};
use super::services::translate_foreign_failure;
use super::{DispatchAction, DispatchPolicy, MethodLookup, MissingBehavior, missing};
use crate::class::{ClassId, MethodHandle, ShapeId};
use crate::rt::DispatchRuntime;
use crate::val::{Block, NativeType, Symbol, Value};

/// Public name of each guard variant, for statistics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpecializationKind {
    Shape,
    NativeType,
    Boolean,
    Symbol,
    Foreign,
    ReturnMissing,
    MethodMissing,
}

/// Guard data and action of one cached link.
///
/// Variants cover disjoint receiver categories, so a receiver can satisfy at
/// most one valid link per name.
#[derive(Debug, Clone)]
pub(crate) enum Specialization {
    Shape {
        shape: ShapeId,
        method: MethodHandle,
    },
    NativeType {
        tag: NativeType,
        method: MethodHandle,
    },
    /// `true` and `false` resolved together; a missing branch never matches.
    Boolean {
        when_true: Option<MethodHandle>,
        when_false: Option<MethodHandle>,
    },
    Symbol {
        method: MethodHandle,
    },
    Foreign,
    ReturnMissing {
        class: ClassId,
    },
    MethodMissing {
        class: ClassId,
        handler: MethodHandle,
    },
}

impl Specialization {
    pub(crate) fn kind(&self) -> SpecializationKind {
        match self {
            Specialization::Shape { .. } => SpecializationKind::Shape,
            Specialization::NativeType { .. } => SpecializationKind::NativeType,
            Specialization::Boolean { .. } => SpecializationKind::Boolean,
            Specialization::Symbol { .. } => SpecializationKind::Symbol,
            Specialization::Foreign => SpecializationKind::Foreign,
            Specialization::ReturnMissing { .. } => SpecializationKind::ReturnMissing,
            Specialization::MethodMissing { .. } => SpecializationKind::MethodMissing,
        }
    }

    // Pure predicate over the receiver; must not touch any mutable state.
    fn matches(&self, receiver: &Value, lookup: &dyn MethodLookup) -> bool {
        match (self, receiver) {
            (Specialization::Shape { shape, .. }, Value::Object(obj)) => obj.shape().id == *shape,
            (Specialization::NativeType { tag, .. }, value) => value.native_type() == Some(*tag),
            (
                Specialization::Boolean {
                    when_true,
                    when_false,
                },
                Value::Bool(flag),
            ) => boolean_branch(when_true, when_false, *flag).is_some(),
            (Specialization::Symbol { .. }, Value::Symbol(_)) => true,
            (Specialization::Foreign, Value::Foreign(_)) => true,
            (Specialization::ReturnMissing { class } | Specialization::MethodMissing { class, .. }, value) => {
                !value.is_foreign() && lookup.class_of(value) == *class
            }
            _ => false,
        }
    }
}

#[inline]
fn boolean_branch<'a>(
    when_true: &'a Option<MethodHandle>,
    when_false: &'a Option<MethodHandle>,
    flag: bool,
) -> Option<&'a MethodHandle> {
    if flag { when_true.as_ref() } else { when_false.as_ref() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuardOutcome {
    Miss,
    /// Guard matched but an assumption was invalidated since the link was built.
    Stale,
    Hit,
}

/// A specialization built from fresh lookups, not yet linked into a chain.
#[derive(Debug)]
pub(crate) struct Candidate {
    name: Symbol,
    specialization: Specialization,
    assumptions: Vec<Arc<Assumption>>,
}

impl Candidate {
    pub(crate) fn kind(&self) -> SpecializationKind {
        self.specialization.kind()
    }

    pub(crate) fn link(self, next: Option<usize>) -> CachedNode {
        CachedNode {
            name: self.name,
            specialization: self.specialization,
            assumptions: self.assumptions.into_boxed_slice(),
            next,
        }
    }
}

/// Published chain link. Nothing in it changes after publication.
#[derive(Debug)]
pub(crate) struct CachedNode {
    name: Symbol,
    specialization: Specialization,
    assumptions: Box<[Arc<Assumption>]>,
    next: Option<usize>,
}

impl CachedNode {
    #[inline]
    pub(crate) fn next(&self) -> Option<usize> {
        self.next
    }

    #[inline]
    pub(crate) fn kind(&self) -> SpecializationKind {
        self.specialization.kind()
    }

    #[inline]
    pub(crate) fn guard(&self, name: Symbol, receiver: &Value, lookup: &dyn MethodLookup) -> GuardOutcome {
        if self.name != name || !self.specialization.matches(receiver, lookup) {
            GuardOutcome::Miss
        } else if all_valid(&self.assumptions) {
            GuardOutcome::Hit
        } else {
            GuardOutcome::Stale
        }
    }

    /// Run the cached action. The caller has just observed `GuardOutcome::Hit`.
    pub(crate) fn execute(
        &self,
        runtime: &DispatchRuntime,
        action: DispatchAction,
        receiver: &Value,
        args: &[Value],
        block: Option<&Block>,
    ) -> Result<Value> {
        let name = self.name;
        match &self.specialization {
            Specialization::Shape { method, .. }
            | Specialization::NativeType { method, .. }
            | Specialization::Symbol { method } => invoke_or_answer(method, action, receiver, args, block),
            Specialization::Boolean {
                when_true,
                when_false,
            } => {
                let flag = matches!(receiver, Value::Bool(true));
                let method = boolean_branch(when_true, when_false, flag)
                    .ok_or_else(|| anyhow!("boolean link for `{name}' has no branch for {flag}"))?;
                invoke_or_answer(method, action, receiver, args, block)
            }
            Specialization::Foreign => foreign_dispatch(runtime, action, receiver, name, args),
            Specialization::ReturnMissing { .. } => Ok(match action {
                DispatchAction::CallMethod => Value::Missing,
                DispatchAction::RespondTo => Value::Bool(false),
            }),
            Specialization::MethodMissing { handler, .. } => match action {
                DispatchAction::CallMethod => missing::call_handler(runtime, handler, receiver, name, args, block),
                DispatchAction::RespondTo => Ok(Value::Bool(false)),
            },
        }
    }
}

#[inline]
pub(crate) fn invoke_or_answer(
    method: &MethodHandle,
    action: DispatchAction,
    receiver: &Value,
    args: &[Value],
    block: Option<&Block>,
) -> Result<Value> {
    match action {
        DispatchAction::CallMethod => method.invoke(receiver, args, block),
        DispatchAction::RespondTo => Ok(Value::Bool(!method.is_unimplemented())),
    }
}

pub(crate) fn foreign_dispatch(
    runtime: &DispatchRuntime,
    action: DispatchAction,
    receiver: &Value,
    name: Symbol,
    args: &[Value],
) -> Result<Value> {
    let Value::Foreign(object) = receiver else {
        bail!("foreign dispatch of `{name}' on non-foreign receiver {}", receiver.inspect());
    };
    let interop = runtime.interop();
    match action {
        DispatchAction::RespondTo => Ok(Value::Bool(interop.is_invocable(object, name))),
        DispatchAction::CallMethod => interop.invoke(object, name, args).map_err(|failure| {
            let lookup = runtime.lookup();
            let class_name = lookup.class_name(lookup.class_of(receiver));
            translate_foreign_failure(failure, runtime.exceptions(), receiver, class_name, name, args)
        }),
    }
}

/// Resolve `name` for `receiver` and pick the link variant for its category.
///
/// Fails only when forwarding to `method_missing` is configured and the
/// receiver has no handler.
pub(crate) fn specialize(
    runtime: &DispatchRuntime,
    policy: DispatchPolicy,
    receiver: &Value,
    name: Symbol,
    args: &[Value],
) -> Result<Candidate> {
    if receiver.is_foreign() {
        return Ok(Candidate {
            name,
            specialization: Specialization::Foreign,
            assumptions: Vec::new(),
        });
    }

    let lookup = runtime.lookup();
    let class = lookup.class_of(receiver);
    let found = lookup.lookup(class, name, policy.scope);
    let (method, assumptions) = found.into_parts();
    let Some(method) = method else {
        return missing_candidate(runtime, policy, receiver, class, name, args, assumptions);
    };

    let (specialization, assumptions) = match receiver {
        Value::Object(obj) => (
            Specialization::Shape {
                shape: obj.shape().id,
                method,
            },
            assumptions,
        ),
        Value::Symbol(_) => (Specialization::Symbol { method }, assumptions),
        Value::Bool(_) => {
            // Both branches are cached together, each with its own lookup.
            let (when_true, mut assumptions) = lookup
                .lookup(lookup.class_of(&Value::Bool(true)), name, policy.scope)
                .into_parts();
            let (when_false, false_assumptions) = lookup
                .lookup(lookup.class_of(&Value::Bool(false)), name, policy.scope)
                .into_parts();
            assumptions.extend(false_assumptions);
            (Specialization::Boolean { when_true, when_false }, assumptions)
        }
        other => match other.native_type() {
            Some(tag) => (Specialization::NativeType { tag, method }, assumptions),
            None => bail!("cannot specialize `{name}' for receiver {}", other.inspect()),
        },
    };

    Ok(Candidate {
        name,
        specialization,
        assumptions,
    })
}

fn missing_candidate(
    runtime: &DispatchRuntime,
    policy: DispatchPolicy,
    receiver: &Value,
    class: ClassId,
    name: Symbol,
    args: &[Value],
    mut assumptions: Vec<Arc<Assumption>>,
) -> Result<Candidate> {
    let returns_missing =
        policy.action == DispatchAction::RespondTo || policy.missing == MissingBehavior::ReturnMissing;
    if returns_missing {
        return Ok(Candidate {
            name,
            specialization: Specialization::ReturnMissing { class },
            assumptions,
        });
    }

    let (handler, handler_assumptions) = missing::lookup_handler(runtime, class).into_parts();
    let Some(handler) = handler else {
        tracing::debug!(target: "lkr::dispatch::missing", name = %name, "no method_missing handler");
        return Err(runtime.no_method_error(receiver, name, args));
    };
    assumptions.extend(handler_assumptions);
    Ok(Candidate {
        name,
        specialization: Specialization::MethodMissing { class, handler },
        assumptions,
    })
}
