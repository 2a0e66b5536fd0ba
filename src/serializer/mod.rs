//! # Record Serializers
//!
//! A serializer emits the code that packs a list of named, typed values into
//! a self-describing byte buffer at run time. The choice of serializer is
//! independent of the choice of logger.

mod null;
mod nv;

pub use null::NullSerializer;
pub use nv::{NvSerializer, NvType};

use crate::ir::{IrBuilder, Operand};
use crate::logger::Parameter;
use std::fmt;

/// A packed record produced at run time
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedData {
    /// `void *` to the packed bytes
    pub buffer: Operand,
    /// Length of the buffer in bytes (`size_t`)
    pub size: Operand,
}

/// A serialization backend
pub trait Serializer: fmt::Debug {
    /// Short backend name
    fn name(&self) -> &'static str;

    /// Emit code packing `values` (named and typed by `params`) at the
    /// builder's cursor. `None` means nothing was emitted.
    fn serialize(
        &self,
        b: &mut IrBuilder,
        params: &[Parameter],
        values: &[Operand],
    ) -> Option<SerializedData>;

    /// Emit code releasing a buffer returned by [`Serializer::serialize`]
    fn cleanup(&self, b: &mut IrBuilder, data: &SerializedData);
}
