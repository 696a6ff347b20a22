use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::config::DispatchOptions;
use crate::dispatch::{
    CallSite, DispatchConfiguration, DispatchPolicy, ExceptionFactory, InteropBridge, MethodLookup, NoInterop,
    StandardExceptions, dispatch_uncached,
};
use crate::val::{Block, Symbol, Value};

struct RuntimeInner {
    lookup: Arc<dyn MethodLookup>,
    exceptions: Arc<dyn ExceptionFactory>,
    interop: Arc<dyn InteropBridge>,
    options: DispatchOptions,
    method_missing: Symbol,
    respond_to_missing: Symbol,
}

/// Shared handle to the services every call site dispatches through.
///
/// Cheap to clone; call sites keep their own clone for their whole lifetime.
#[derive(Clone)]
pub struct DispatchRuntime {
    inner: Arc<RuntimeInner>,
}

pub struct DispatchRuntimeBuilder {
    lookup: Arc<dyn MethodLookup>,
    exceptions: Arc<dyn ExceptionFactory>,
    interop: Arc<dyn InteropBridge>,
    options: DispatchOptions,
}

impl DispatchRuntimeBuilder {
    pub fn exceptions(mut self, exceptions: Arc<dyn ExceptionFactory>) -> Self {
        self.exceptions = exceptions;
        self
    }

    pub fn interop(mut self, interop: Arc<dyn InteropBridge>) -> Self {
        self.interop = interop;
        self
    }

    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> DispatchRuntime {
        let method_missing = Symbol::intern(&self.options.method_missing);
        let respond_to_missing = Symbol::intern(&self.options.respond_to_missing);
        DispatchRuntime {
            inner: Arc::new(RuntimeInner {
                lookup: self.lookup,
                exceptions: self.exceptions,
                interop: self.interop,
                options: self.options,
                method_missing,
                respond_to_missing,
            }),
        }
    }
}

impl DispatchRuntime {
    pub fn new(lookup: Arc<dyn MethodLookup>) -> Self {
        Self::builder(lookup).build()
    }

    pub fn builder(lookup: Arc<dyn MethodLookup>) -> DispatchRuntimeBuilder {
        DispatchRuntimeBuilder {
            lookup,
            exceptions: Arc::new(StandardExceptions),
            interop: Arc::new(NoInterop),
            options: DispatchOptions::default(),
        }
    }

    #[inline]
    pub fn options(&self) -> &DispatchOptions {
        &self.inner.options
    }

    #[inline]
    pub fn lookup(&self) -> &dyn MethodLookup {
        self.inner.lookup.as_ref()
    }

    #[inline]
    pub fn exceptions(&self) -> &dyn ExceptionFactory {
        self.inner.exceptions.as_ref()
    }

    #[inline]
    pub fn interop(&self) -> &dyn InteropBridge {
        self.inner.interop.as_ref()
    }

    #[inline]
    pub fn method_missing_name(&self) -> Symbol {
        self.inner.method_missing
    }

    #[inline]
    pub fn respond_to_missing_name(&self) -> Symbol {
        self.inner.respond_to_missing
    }

    /// Cached call site for one static call expression.
    pub fn call_site(&self, name: impl Into<Symbol>, config: DispatchConfiguration) -> CallSite {
        self.call_site_with_policy(name, DispatchPolicy::call(config))
    }

    /// Cached `respond_to?` site for public methods.
    pub fn respond_to_site(&self, name: impl Into<Symbol>) -> CallSite {
        self.call_site_with_policy(name, DispatchPolicy::respond_to(false))
    }

    pub fn call_site_with_policy(&self, name: impl Into<Symbol>, policy: DispatchPolicy) -> CallSite {
        CallSite::new(self.clone(), name.into(), policy)
    }

    /// Uncached call, for runtime utility code that has no fixed call site.
    pub fn call(
        &self,
        receiver: &Value,
        name: impl Into<Symbol>,
        args: &[Value],
        block: Option<&Block>,
        config: DispatchConfiguration,
    ) -> Result<Value> {
        dispatch_uncached(self, DispatchPolicy::call(config), receiver, name.into(), args, block)
    }

    /// `respond_to?` over public methods. Never invokes `method_missing`.
    pub fn respond_to(&self, receiver: &Value, name: impl Into<Symbol>) -> Result<bool> {
        self.respond_to_with(receiver, name, false)
    }

    /// Fails only for receivers that cannot be dispatched on at all.
    pub fn respond_to_with(&self, receiver: &Value, name: impl Into<Symbol>, include_private: bool) -> Result<bool> {
        let policy = DispatchPolicy::respond_to(include_private);
        let answer = dispatch_uncached(self, policy, receiver, name.into(), &[], None)?;
        Ok(matches!(answer, Value::Bool(true)))
    }

    pub(crate) fn no_method_error(&self, receiver: &Value, name: Symbol, args: &[Value]) -> anyhow::Error {
        let lookup = self.lookup();
        let class_name = lookup.class_name(lookup.class_of(receiver));
        self.exceptions().no_method_error(receiver, class_name, name, args)
    }
}

impl fmt::Debug for DispatchRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRuntime")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
