//! # Program Representation
//!
//! A small SSA intermediate representation shaped like the output of a C
//! front end: modules of functions, functions of basic blocks, blocks of
//! instructions (calls, loads, stores, address computations).
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── types.rs        # IrType, StructType, GlobalVariable
//! ├── instruction.rs  # ValueId, Operand, InstKind, Instruction
//! ├── program.rs      # BasicBlock, Function, Module
//! ├── builder.rs      # IrBuilder insertion cursor, FunctionBuilder
//! └── printer.rs      # Display impls (LLVM-like text)
//! ```
//!
//! The rewriter never holds positions across mutations. It records
//! [`ValueId`]s, which are stable, and re-resolves them with
//! [`Function::locate`] each time it inserts code.

mod builder;
mod instruction;
mod printer;
mod program;
mod types;

pub use builder::{FunctionBuilder, IrBuilder};
pub use instruction::{BinOp, CastOp, Callee, InstKind, Instruction, Operand, ValueId};
pub use program::{BasicBlock, DiCompositeType, DiSubprogram, FuncId, Function, Module, Param};
pub use types::{Constant, GlobalVariable, IrType, StructType};
