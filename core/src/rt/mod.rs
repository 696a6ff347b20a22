//! Runtime handle tying the dispatch core to its collaborating services.

mod runtime;

pub use runtime::{DispatchRuntime, DispatchRuntimeBuilder};
