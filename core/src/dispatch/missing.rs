use anyhow::Result;

use super::{DispatchAction, DispatchPolicy, LookupScope, MethodLookupResult, MissingBehavior};
use crate::class::{ClassId, MethodHandle};
use crate::rt::DispatchRuntime;
use crate::val::{Block, Symbol, Value};

/// Find the forwarding handler for `class`. Visibility never hides it.
pub(crate) fn lookup_handler(runtime: &DispatchRuntime, class: ClassId) -> MethodLookupResult {
    runtime
        .lookup()
        .lookup(class, runtime.method_missing_name(), LookupScope::unrestricted())
}

/// Forward a failed call to `handler` with the name prepended to the arguments.
///
/// A handler that answers `Missing` did not handle the call, so the original
/// call raises.
pub(crate) fn call_handler(
    runtime: &DispatchRuntime,
    handler: &MethodHandle,
    receiver: &Value,
    name: Symbol,
    args: &[Value],
    block: Option<&Block>,
) -> Result<Value> {
    let mut forwarded = Vec::with_capacity(args.len() + 1);
    forwarded.push(Value::Symbol(name));
    forwarded.extend_from_slice(args);

    let result = handler.invoke(receiver, &forwarded, block)?;
    if result.is_missing() {
        tracing::debug!(target: "lkr::dispatch::missing", name = %name, "method_missing declined");
        return Err(runtime.no_method_error(receiver, name, args));
    }
    Ok(result)
}

/// Outcome of a lookup that found nothing, without caching anything.
pub(crate) fn handle_missing(
    runtime: &DispatchRuntime,
    policy: DispatchPolicy,
    receiver: &Value,
    class: ClassId,
    name: Symbol,
    args: &[Value],
    block: Option<&Block>,
) -> Result<Value> {
    if policy.action == DispatchAction::RespondTo {
        return Ok(Value::Bool(false));
    }
    if policy.missing == MissingBehavior::ReturnMissing {
        return Ok(Value::Missing);
    }

    match lookup_handler(runtime, class).method() {
        Some(handler) => call_handler(runtime, handler, receiver, name, args, block),
        None => {
            tracing::debug!(target: "lkr::dispatch::missing", name = %name, "no method_missing handler");
            Err(runtime.no_method_error(receiver, name, args))
        }
    }
}
