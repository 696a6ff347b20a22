pub mod class;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod rt;
pub mod val;

pub use class::ClassRegistry;
pub use config::DispatchOptions;
pub use dispatch::{CallExpression, CallSite, DispatchConfiguration};
pub use error::{DispatchError, NoMethodError};
pub use rt::DispatchRuntime;
pub use val::{Symbol, Value};
