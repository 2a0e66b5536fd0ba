//! # Trace Loggers
//!
//! A logger turns a list of named, typed values into a call that emits a
//! trace record. Each backend decides the emission function and, for the
//! formatted backends, how each value is rendered in the format string.
//!
//! | semantic type      | `printf`  | `xo_emit`               |
//! |--------------------|-----------|-------------------------|
//! | 32-bit int         | ` %d`     | `{P: }{h:NAME/%d}`      |
//! | float/double       | ` %.0f`   | `{P: }{h:NAME/%.0f}`    |
//! | 8-bit int (char)   | ` %c`     | `{P: }{h:NAME/%c}`      |
//! | pointer to int8    | ` "%s"`   | `{P: }{h:NAME/"%s"}`    |
//! | other pointer      | ` %p`     | `{P: }{h:NAME/%p}`      |

mod dtrace;
mod ktrace;
mod printf;
mod xo;

pub use dtrace::DTraceLogger;
pub use ktrace::KTraceLogger;
pub use printf::PrintfLogger;
pub use xo::LibxoLogger;

use crate::ir::{CastOp, IrBuilder, IrType, Operand};
use crate::policy::LogType;
use std::fmt;

/// One value to be logged: its name and IR type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub ty: IrType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: IrType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Semantic categories that have a format token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    /// 32-bit integer
    Int32,
    /// 8-bit integer
    Char,
    /// Floating point of any width
    Floating,
    /// Pointer to 8-bit integer
    CString,
    /// Any other pointer
    Pointer,
    /// No format token (e.g. i64, structs)
    Unsupported,
}

impl SemanticType {
    pub fn of(ty: &IrType) -> Self {
        match ty {
            IrType::Int(32) => SemanticType::Int32,
            IrType::Int(8) => SemanticType::Char,
            IrType::Float | IrType::Double => SemanticType::Floating,
            IrType::Ptr(inner) if inner.is_int(8) => SemanticType::CString,
            IrType::Ptr(_) => SemanticType::Pointer,
            _ => SemanticType::Unsupported,
        }
    }
}

/// Everything a logger needs to emit one record
#[derive(Debug, Clone, Copy)]
pub struct TraceRecord<'a> {
    /// Hook name (probe symbol)
    pub name: &'a str,
    /// Human-readable prefix of the record
    pub prefix: &'a str,
    /// Value names and types
    pub params: &'a [Parameter],
    /// Values, parallel to `params`
    pub values: &'a [Operand],
    /// Record terminator
    pub suffix: &'a str,
}

/// A trace backend
pub trait Logger: fmt::Debug {
    /// Name of the emission function
    fn function_name(&self) -> &'static str;

    /// Format descriptor for `params`; backends without per-argument
    /// formatting use prefix and suffix only.
    fn create_format_string(&self, prefix: &str, _params: &[Parameter], suffix: &str) -> String {
        format!("{}{}", prefix, suffix)
    }

    /// Emit the record at the builder's cursor. Returns whether any code was
    /// inserted.
    ///
    /// The default emits `int fn(const char *format, ...)` with the values
    /// that have a format token.
    fn log(&self, b: &mut IrBuilder, record: &TraceRecord) -> bool {
        let (params, values): (Vec<Parameter>, Vec<Operand>) = record
            .params
            .iter()
            .zip(record.values)
            .filter(|(p, _)| SemanticType::of(&p.ty) != SemanticType::Unsupported)
            .map(|(p, v)| (p.clone(), v.clone()))
            .unzip();

        let format = self.create_format_string(record.prefix, &params, record.suffix);
        let name = self.function_name();
        b.module_mut()
            .get_or_insert_function(name, IrType::i32(), vec![IrType::i8_ptr()], true);

        let mut args = Vec::with_capacity(values.len() + 1);
        args.push(b.global_string(&format));
        args.extend(values);
        b.call(name, IrType::i32(), args);
        true
    }
}

/// Create the simple logger for `log_type`, if any
pub fn create(log_type: LogType) -> Option<Box<dyn Logger>> {
    match log_type {
        LogType::PlainText => Some(Box::new(PrintfLogger)),
        LogType::Structured => Some(Box::new(LibxoLogger)),
        LogType::None => None,
    }
}

/// Widen `float` values to `double`, as variadic calls require.
///
/// Applied once per emission point, before any logger sees the values.
pub fn adapt_arguments(
    b: &mut IrBuilder,
    params: &[Parameter],
    values: &[Operand],
) -> (Vec<Parameter>, Vec<Operand>) {
    params
        .iter()
        .zip(values)
        .map(|(param, value)| {
            if param.ty == IrType::Float {
                let widened = b.cast(CastOp::FpExt, value.clone(), IrType::Double);
                (Parameter::new(param.name.clone(), IrType::Double), widened)
            } else {
                (param.clone(), value.clone())
            }
        })
        .unzip()
}
