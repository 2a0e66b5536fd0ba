//! # Loom - Policy-Driven IR Instrumentation
//!
//! Loom rewrites a compiled program's intermediate representation to insert
//! tracing hooks: function entry and exit, call sites, structure field reads
//! and writes, global variable accesses. What gets instrumented, and how, is
//! described by a declarative YAML policy.
//!
//! ## Architecture
//!
//! ```text
//! Policy file → Policy → Rewrite driver (collect, then mutate) → Instrumenter
//!                                                                 ├─ Strategy (callout | inline)
//!                                                                 ├─ Loggers (printf, xo, ktrace, dtrace)
//!                                                                 └─ Serializer (nv | none)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use loom_instrument::{rewrite, FunctionBuilder, IrType, Module, Operand, Policy};
//!
//! # fn main() -> loom_instrument::Result<()> {
//! let policy = Policy::from_yaml(
//!     r#"
//! logging: printf
//! functions:
//!   - name: ^alloc$
//!     caller: [ entry ]
//!     callee: [ entry, exit ]
//! "#,
//! )?;
//!
//! let mut module = Module::new("alloc.c");
//!
//! let mut alloc = FunctionBuilder::new("alloc", IrType::i8_ptr(), &[("size", IrType::i32())]);
//! let size = alloc.param(0);
//! let ptr = alloc.call("malloc", vec![size], IrType::i8_ptr());
//! alloc.ret(Some(ptr));
//! module.add_function(alloc.build());
//!
//! let mut caller = FunctionBuilder::new("main", IrType::i32(), &[]);
//! caller.call("alloc", vec![Operand::i32(4)], IrType::i8_ptr());
//! caller.ret(Some(Operand::i32(0)));
//! module.add_function(caller.build());
//!
//! let result = rewrite(&mut module, &policy)?;
//! assert!(result.changed);
//! assert_eq!(result.functions, 1);
//! assert_eq!(result.calls, 1);
//! assert!(module.function("__loom_enter_alloc").is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Policy Files
//!
//! See [`policy`] for the document format. [`Rewriter`] loads a policy from
//! disk ([`RewriteOptions::policy_file`], `loom.policy` by default) and aborts
//! before touching the module if it is missing or malformed.
//!
//! ## Logging
//!
//! The library reports through `tracing` and never installs a subscriber.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod debug_info;
pub mod error;
pub mod instr;
pub mod ir;
pub mod logger;
pub mod policy;
pub mod rewrite;
pub mod serializer;

// Re-export main types
pub use error::{Error, ErrorSeverity, Result};
pub use instr::{InstrStrategy, Instrumenter};
pub use ir::{FunctionBuilder, IrBuilder, IrType, Module, Operand};
pub use logger::{Logger, Parameter};
pub use policy::{Direction, Operation, Policy, Strategy};
pub use rewrite::{rewrite, RewriteOptions, RewriteResult, Rewriter};
pub use serializer::Serializer;
