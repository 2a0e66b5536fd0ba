//! ktrace(2) records: a serialized record handed to `utrace(2)` from
//! userspace or to `ktrstruct` inside the kernel.

use super::{Logger, TraceRecord};
use crate::ir::{IrBuilder, IrType};
use crate::policy::KTraceTarget;
use crate::serializer::Serializer;

/// Serializes each record and passes the buffer to the ktrace facility
#[derive(Debug)]
pub struct KTraceLogger {
    target: KTraceTarget,
    serializer: Box<dyn Serializer>,
}

impl KTraceLogger {
    pub fn new(target: KTraceTarget, serializer: Box<dyn Serializer>) -> Self {
        Self { target, serializer }
    }

    pub fn target(&self) -> KTraceTarget {
        self.target
    }
}

impl Logger for KTraceLogger {
    fn function_name(&self) -> &'static str {
        match self.target {
            KTraceTarget::Kernel => "ktrstruct",
            KTraceTarget::Userspace | KTraceTarget::None => "utrace",
        }
    }

    fn log(&self, b: &mut IrBuilder, record: &TraceRecord) -> bool {
        if self.target == KTraceTarget::None {
            return false;
        }

        let Some(data) = self.serializer.serialize(b, record.params, record.values) else {
            return false;
        };

        let name = self.function_name();
        match self.target {
            KTraceTarget::Kernel => {
                // void ktrstruct(const char *name, const void *data, size_t datalen)
                b.module_mut().get_or_insert_function(
                    name,
                    IrType::Void,
                    vec![IrType::i8_ptr(), IrType::i8_ptr(), IrType::i64()],
                    false,
                );
                let label = b.global_string(record.name);
                b.call(name, IrType::Void, vec![label, data.buffer.clone(), data.size.clone()]);
            }
            KTraceTarget::Userspace | KTraceTarget::None => {
                // int utrace(const void *addr, size_t len)
                b.module_mut().get_or_insert_function(
                    name,
                    IrType::i32(),
                    vec![IrType::i8_ptr(), IrType::i64()],
                    false,
                );
                b.call(name, IrType::i32(), vec![data.buffer.clone(), data.size.clone()]);
            }
        }

        self.serializer.cleanup(b, &data);
        true
    }
}
