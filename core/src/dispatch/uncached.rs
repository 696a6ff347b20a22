use anyhow::{Result, bail};

use super::DispatchPolicy;
use super::missing::handle_missing;
use super::specialization::{foreign_dispatch, invoke_or_answer};
use crate::rt::DispatchRuntime;
use crate::val::{Block, Symbol, Value};

/// Dispatch without consulting or building any cache.
///
/// Megamorphic call sites land here on every call. The outcome is identical to
/// what a freshly built cached link would produce for the same receiver.
pub fn dispatch_uncached(
    runtime: &DispatchRuntime,
    policy: DispatchPolicy,
    receiver: &Value,
    name: Symbol,
    args: &[Value],
    block: Option<&Block>,
) -> Result<Value> {
    if receiver.is_missing() {
        bail!("cannot dispatch `{name}' on the missing sentinel");
    }
    if receiver.is_foreign() {
        return foreign_dispatch(runtime, policy.action, receiver, name, args);
    }

    let lookup = runtime.lookup();
    let class = lookup.class_of(receiver);
    match lookup.lookup(class, name, policy.scope).method() {
        Some(method) => invoke_or_answer(method, policy.action, receiver, args, block),
        None => handle_missing(runtime, policy, receiver, class, name, args, block),
    }
}
