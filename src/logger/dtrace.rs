//! DTrace user-space probes.
//!
//! Unlike the formatted loggers this is a coarse hook: every record becomes
//! `dt_probe(probe, NULL, NULL, NULL, NULL, NULL)` where `probe` is the
//! address of the hook symbol. Values are not forwarded.

use super::{Logger, TraceRecord};
use crate::ir::{IrBuilder, IrType, Operand};

/// Number of pointer-sized `dt_probe` arguments
pub const DT_PROBE_SLOTS: usize = 6;

/// Emits `int dt_probe(void*, void*, void*, void*, void*, void*)`
#[derive(Debug, Clone, Copy, Default)]
pub struct DTraceLogger;

impl Logger for DTraceLogger {
    fn function_name(&self) -> &'static str {
        "dt_probe"
    }

    fn log(&self, b: &mut IrBuilder, record: &TraceRecord) -> bool {
        let name = self.function_name();
        b.module_mut().get_or_insert_function(
            name,
            IrType::i32(),
            vec![IrType::i8_ptr(); DT_PROBE_SLOTS],
            false,
        );

        let probe = if b.module().function(record.name).is_some() {
            Operand::Function(record.name.to_string())
        } else if b.module().global(record.name).is_some() {
            Operand::Global(record.name.to_string())
        } else {
            Operand::Null(IrType::i8_ptr())
        };

        let mut args = vec![Operand::Null(IrType::i8_ptr()); DT_PROBE_SLOTS];
        args[0] = probe;
        b.call(name, IrType::i32(), args);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, InstKind, Module};
    use crate::logger::Parameter;

    #[test]
    fn test_fixed_arity_dtrace_call() {
        let mut fb = FunctionBuilder::new("__loom_enter_f", IrType::Void, &[("n", IrType::i32())]);
        let n = fb.param(0);
        let ret = fb.ret(None).as_value().unwrap();
        let mut module = Module::new("m");
        let f = module.add_function(fb.build());

        let params = vec![Parameter::new("n", IrType::i32())];
        let values = vec![n];
        {
            let mut b = IrBuilder::before(&mut module, f, ret).unwrap();
            assert!(DTraceLogger.log(
                &mut b,
                &TraceRecord {
                    name: "__loom_enter_f",
                    prefix: "",
                    params: &params,
                    values: &values,
                    suffix: "",
                },
            ));
        }

        match &module.func(f).blocks[0].instructions[0].kind {
            InstKind::Call { args, .. } => {
                assert_eq!(args.len(), DT_PROBE_SLOTS);
                assert_eq!(args[0], Operand::Function("__loom_enter_f".into()));
                assert!(args[1..]
                    .iter()
                    .all(|a| *a == Operand::Null(IrType::i8_ptr())));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }
}
