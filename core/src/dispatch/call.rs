use anyhow::Result;
use once_cell::sync::OnceCell;

use super::{CallSite, DispatchConfiguration};
use crate::val::{Block, Value};

/// A source-level call: `recv.name(args)`, `recv&.name(args)` or
/// `recv.name = value`, routed through one cached call site.
#[derive(Debug)]
pub struct CallExpression {
    site: CallSite,
    safe_navigation: bool,
    attr_assign: bool,
    // Built on first `defined` query.
    respond_to_missing_site: OnceCell<CallSite>,
}

impl CallExpression {
    pub fn new(site: CallSite) -> Self {
        Self {
            site,
            safe_navigation: false,
            attr_assign: false,
            respond_to_missing_site: OnceCell::new(),
        }
    }

    /// `recv&.name`: a `nil` receiver evaluates to `nil` without dispatching.
    pub fn safe_navigation(mut self) -> Self {
        self.safe_navigation = true;
        self
    }

    /// `recv.name = value`: evaluates to the last argument, whatever the writer returns.
    pub fn attr_assign(mut self) -> Self {
        self.attr_assign = true;
        self
    }

    #[inline]
    pub fn site(&self) -> &CallSite {
        &self.site
    }

    pub fn execute(&self, receiver: &Value, args: &[Value], block: Option<&Block>) -> Result<Value> {
        if self.safe_navigation && receiver.is_nil() {
            return Ok(Value::Nil);
        }
        let result = self.site.call(receiver, args, block)?;
        if self.attr_assign {
            return Ok(args.last().cloned().unwrap_or_default());
        }
        Ok(result)
    }

    /// `defined?(recv.name)`: `Some("method")` when the call would find a
    /// method, or when `respond_to_missing?` claims the name. Never raises
    /// for foreign receivers.
    pub fn defined(&self, receiver: &Value) -> Result<Option<&'static str>> {
        let runtime = self.site.runtime();
        let name = self.site.name();

        if let Value::Foreign(object) = receiver {
            return Ok(runtime.interop().is_invocable(object, name).then_some("method"));
        }

        let lookup = runtime.lookup();
        if lookup.lookup(lookup.class_of(receiver), name, self.site.policy().scope).is_defined() {
            return Ok(Some("method"));
        }

        let respond_to_missing = self.respond_to_missing_site.get_or_init(|| {
            runtime.call_site(runtime.respond_to_missing_name(), DispatchConfiguration::PrivateReturnMissing)
        });
        // Without a hook the sentinel comes back, and the name stays undefined.
        let answer = respond_to_missing.call(receiver, &[Value::Symbol(name), Value::Bool(false)], None)?;
        Ok(answer.is_truthy().then_some("method"))
    }
}
