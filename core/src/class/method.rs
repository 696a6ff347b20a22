use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;

use super::ClassId;
use crate::val::{Block, Symbol, Value};

/// Native method body: `(receiver, args, block) -> result`.
pub type MethodBody = Arc<dyn Fn(&Value, &[Value], Option<&Block>) -> Result<Value> + Send + Sync>;

pub type MethodHandle = Arc<Method>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A resolved, executable method. Immutable once created: redefining a method
/// installs a new `Method` rather than changing this one.
pub struct Method {
    serial: u64,
    name: Symbol,
    owner: ClassId,
    visibility: Visibility,
    unimplemented: bool,
    body: MethodBody,
}

impl Method {
    pub fn new(name: Symbol, owner: ClassId, visibility: Visibility, body: MethodBody) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name,
            owner,
            visibility,
            unimplemented: false,
            body,
        }
    }

    /// Marks the method as present but not implemented on this platform;
    /// `respond_to?` will answer `false` for it.
    pub fn mark_unimplemented(mut self) -> Self {
        self.unimplemented = true;
        self
    }

    /// Same body installed in `owner` under `visibility`, with a new identity.
    pub(crate) fn copy_to(&self, owner: ClassId, visibility: Visibility) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            owner,
            visibility,
            unimplemented: self.unimplemented,
            body: Arc::clone(&self.body),
        }
    }

    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[inline]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    #[inline]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[inline]
    pub fn is_unimplemented(&self) -> bool {
        self.unimplemented
    }

    #[inline]
    pub fn invoke(&self, receiver: &Value, args: &[Value], block: Option<&Block>) -> Result<Value> {
        (self.body)(receiver, args, block)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("serial", &self.serial)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("visibility", &self.visibility)
            .field("unimplemented", &self.unimplemented)
            .finish()
    }
}
