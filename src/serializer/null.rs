//! The no-op serializer

use super::{SerializedData, Serializer};
use crate::ir::{IrBuilder, Operand};
use crate::logger::Parameter;

/// Emits nothing and allocates nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSerializer;

impl Serializer for NullSerializer {
    fn name(&self) -> &'static str {
        "null"
    }

    fn serialize(
        &self,
        _b: &mut IrBuilder,
        _params: &[Parameter],
        _values: &[Operand],
    ) -> Option<SerializedData> {
        None
    }

    fn cleanup(&self, _b: &mut IrBuilder, _data: &SerializedData) {}
}
