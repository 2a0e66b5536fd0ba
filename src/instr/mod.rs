//! # Instrumentation
//!
//! [`Instrumenter`] turns a recorded instrumentation point into a hook;
//! [`InstrStrategy`] places the hook's logging code either in a shared
//! callout function or inline at the site.

mod instrumenter;
mod strategy;

pub use instrumenter::{FieldAccess, FnDetails, Instrumenter, NameFn};
pub use strategy::{HookSpec, InstrStrategy};
