//! Reference class model: method tables, visibility and the invalidation
//! assumptions that back [`crate::dispatch::MethodLookup`].

mod method;
mod registry;

use serde::Serialize;

pub use method::{Method, MethodBody, MethodHandle, Visibility};
pub use registry::{ClassRegistry, CoreClasses};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ShapeId(pub(crate) u32);

/// Layout identity of an object. Every shape belongs to exactly one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub id: ShapeId,
    pub class: ClassId,
}

#[cfg(test)]
mod registry_test;
