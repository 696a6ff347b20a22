use std::fmt;
use std::sync::Arc;

use crate::error::{DispatchError, NoMethodError};
use crate::val::{ForeignObject, Symbol, Value};

/// Builds the user-facing failure for calls that found no method and no handler.
pub trait ExceptionFactory: Send + Sync {
    fn no_method_error(&self, receiver: &Value, class_name: Arc<str>, name: Symbol, args: &[Value]) -> anyhow::Error;
}

/// Default factory producing [`DispatchError::NoMethod`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardExceptions;

impl ExceptionFactory for StandardExceptions {
    fn no_method_error(&self, receiver: &Value, class_name: Arc<str>, name: Symbol, args: &[Value]) -> anyhow::Error {
        DispatchError::NoMethod(NoMethodError::new(receiver.clone(), class_name, name, args.to_vec())).into()
    }
}

/// Failure reported by another language's runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignFailure {
    UnknownMember(String),
    UnsupportedMessage(String),
    Arity { expected: usize, actual: usize },
    Other(String),
}

impl fmt::Display for ForeignFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForeignFailure::UnknownMember(member) => write!(f, "unknown member {member}"),
            ForeignFailure::UnsupportedMessage(message) => write!(f, "unsupported message {message}"),
            ForeignFailure::Arity { expected, actual } => {
                write!(f, "wrong number of arguments (given {actual}, expected {expected})")
            }
            ForeignFailure::Other(message) => f.write_str(message),
        }
    }
}

/// Call bridge to foreign objects.
pub trait InteropBridge: Send + Sync {
    fn invoke(&self, receiver: &ForeignObject, name: Symbol, args: &[Value]) -> Result<Value, ForeignFailure>;

    fn is_invocable(&self, receiver: &ForeignObject, name: Symbol) -> bool;
}

/// Bridge for runtimes without interop: every foreign call is unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterop;

impl InteropBridge for NoInterop {
    fn invoke(&self, _receiver: &ForeignObject, name: Symbol, _args: &[Value]) -> Result<Value, ForeignFailure> {
        Err(ForeignFailure::UnsupportedMessage(name.name().to_string()))
    }

    fn is_invocable(&self, _receiver: &ForeignObject, _name: Symbol) -> bool {
        false
    }
}

/// Map a foreign failure onto the local failure taxonomy so no raw foreign
/// error reaches language code.
pub(crate) fn translate_foreign_failure(
    failure: ForeignFailure,
    exceptions: &dyn ExceptionFactory,
    receiver: &Value,
    class_name: Arc<str>,
    name: Symbol,
    args: &[Value],
) -> anyhow::Error {
    tracing::debug!(target: "lkr::dispatch::foreign", name = %name, error = %failure, "foreign call failed");
    match failure {
        ForeignFailure::UnknownMember(_) | ForeignFailure::UnsupportedMessage(_) => {
            exceptions.no_method_error(receiver, class_name, name, args)
        }
        ForeignFailure::Arity { .. } => DispatchError::Argument(failure.to_string()).into(),
        ForeignFailure::Other(message) => {
            DispatchError::Type(format!("foreign call `{name}' on {} failed: {message}", receiver.inspect())).into()
        }
    }
}
