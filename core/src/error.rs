use std::fmt;
use std::sync::Arc;

use crate::val::{Symbol, Value};

/// Failure raised when neither the method nor a `method_missing` handler exists.
///
/// Always reports the name the caller asked for, even when the call was retried
/// against a handler with a rewritten argument list.
#[derive(Debug, Clone)]
pub struct NoMethodError {
    receiver: Value,
    class_name: Arc<str>,
    name: Symbol,
    args: Vec<Value>,
}

impl NoMethodError {
    pub fn new(receiver: Value, class_name: Arc<str>, name: Symbol, args: Vec<Value>) -> Self {
        Self {
            receiver,
            class_name,
            name,
            args,
        }
    }

    pub fn receiver(&self) -> &Value {
        &self.receiver
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

impl fmt::Display for NoMethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "undefined method `{}' for {}:{}",
            self.name,
            self.receiver.inspect(),
            self.class_name
        )
    }
}

/// Language-level failures produced by dispatch.
#[derive(Debug, Clone)]
pub enum DispatchError {
    NoMethod(NoMethodError),
    Type(String),
    Argument(String),
}

impl DispatchError {
    pub fn as_no_method(&self) -> Option<&NoMethodError> {
        match self {
            DispatchError::NoMethod(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoMethod(err) => write!(f, "NoMethodError: {err}"),
            DispatchError::Type(message) => write!(f, "TypeError: {message}"),
            DispatchError::Argument(message) => write!(f, "ArgumentError: {message}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<NoMethodError> for DispatchError {
    fn from(err: NoMethodError) -> Self {
        DispatchError::NoMethod(err)
    }
}
