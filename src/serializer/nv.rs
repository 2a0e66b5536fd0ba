//! libnv name/value lists.
//!
//! Every value becomes one `nvlist_add_*` entry keyed by its name; the list
//! is packed with `nvlist_pack(3)`, which records each entry's name and type
//! so the consumer can decode without a schema.

use super::{SerializedData, Serializer};
use crate::ir::{CastOp, IrBuilder, IrType, Operand};
use crate::logger::Parameter;

/// libnv entry types used for logged values (`NV_TYPE_*` codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvType {
    /// Unsigned 64-bit number (integers and addresses)
    Number,
    /// NUL-terminated string
    String,
    /// Raw bytes (floating point values)
    Binary,
}

impl NvType {
    /// Entry type for a value of type `ty`; `None` if it cannot be recorded
    pub fn of(ty: &IrType) -> Option<Self> {
        match ty {
            IrType::Int(_) => Some(NvType::Number),
            IrType::Ptr(inner) if inner.is_int(8) => Some(NvType::String),
            IrType::Ptr(_) => Some(NvType::Number),
            IrType::Float | IrType::Double => Some(NvType::Binary),
            IrType::Void | IrType::Struct(_) => None,
        }
    }

    /// `NV_TYPE_*` discriminator stored in the packed record
    pub fn code(&self) -> u8 {
        match self {
            NvType::Number => 3,
            NvType::String => 4,
            NvType::Binary => 7,
        }
    }

    /// libnv function adding an entry of this type
    pub fn add_function(&self) -> &'static str {
        match self {
            NvType::Number => "nvlist_add_number",
            NvType::String => "nvlist_add_string",
            NvType::Binary => "nvlist_add_binary",
        }
    }
}

/// Packs values into an `nvlist_t`
#[derive(Debug, Clone, Copy, Default)]
pub struct NvSerializer;

impl NvSerializer {
    fn declare_runtime(b: &mut IrBuilder) {
        let nvl = IrType::i8_ptr();
        let module = b.module_mut();
        module.get_or_insert_function("nvlist_create", nvl.clone(), vec![IrType::i32()], false);
        module.get_or_insert_function(
            "nvlist_add_number",
            IrType::Void,
            vec![nvl.clone(), IrType::i8_ptr(), IrType::i64()],
            false,
        );
        module.get_or_insert_function(
            "nvlist_add_string",
            IrType::Void,
            vec![nvl.clone(), IrType::i8_ptr(), IrType::i8_ptr()],
            false,
        );
        module.get_or_insert_function(
            "nvlist_add_binary",
            IrType::Void,
            vec![nvl.clone(), IrType::i8_ptr(), IrType::i8_ptr(), IrType::i64()],
            false,
        );
        module.get_or_insert_function(
            "nvlist_pack",
            IrType::i8_ptr(),
            vec![nvl.clone(), IrType::ptr_to(IrType::i64())],
            false,
        );
        module.get_or_insert_function("nvlist_destroy", IrType::Void, vec![nvl], false);
        module.get_or_insert_function("free", IrType::Void, vec![IrType::i8_ptr()], false);
    }

    /// Emit one `nvlist_add_*` call
    fn add_entry(b: &mut IrBuilder, nvl: &Operand, param: &Parameter, value: &Operand) {
        let Some(nv_type) = NvType::of(&param.ty) else {
            tracing::debug!(
                "Not serializing '{}': no nvlist type for {}",
                param.name,
                param.ty
            );
            return;
        };
        let key = b.global_string(&param.name);

        let args = match nv_type {
            NvType::Number => {
                let number = match &param.ty {
                    IrType::Int(64) => value.clone(),
                    IrType::Int(_) => b.cast(CastOp::SExt, value.clone(), IrType::i64()),
                    _ => b.cast(CastOp::PtrToInt, value.clone(), IrType::i64()),
                };
                vec![nvl.clone(), key, number]
            }
            NvType::String => vec![nvl.clone(), key, value.clone()],
            NvType::Binary => {
                let slot = b.entry_alloca(param.ty.clone());
                b.store(value.clone(), slot.clone());
                let bytes = b.cast(CastOp::BitCast, slot, IrType::i8_ptr());
                let width = if param.ty == IrType::Float { 4 } else { 8 };
                vec![nvl.clone(), key, bytes, Operand::ConstInt(64, width)]
            }
        };
        b.call(nv_type.add_function(), IrType::Void, args);
    }
}

impl Serializer for NvSerializer {
    fn name(&self) -> &'static str {
        "nv"
    }

    fn serialize(
        &self,
        b: &mut IrBuilder,
        params: &[Parameter],
        values: &[Operand],
    ) -> Option<SerializedData> {
        Self::declare_runtime(b);

        let nvl = Operand::Value(b.call("nvlist_create", IrType::i8_ptr(), vec![Operand::i32(0)]));
        for (param, value) in params.iter().zip(values) {
            Self::add_entry(b, &nvl, param, value);
        }

        let size_slot = b.entry_alloca(IrType::i64());
        let buffer = Operand::Value(b.call(
            "nvlist_pack",
            IrType::i8_ptr(),
            vec![nvl.clone(), size_slot.clone()],
        ));
        let size = b.load(IrType::i64(), size_slot);
        b.call("nvlist_destroy", IrType::Void, vec![nvl]);

        Some(SerializedData { buffer, size })
    }

    fn cleanup(&self, b: &mut IrBuilder, data: &SerializedData) {
        b.call("free", IrType::Void, vec![data.buffer.clone()]);
    }
}
