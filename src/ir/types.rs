//! Type definitions for the program representation

use serde::{Deserialize, Serialize};
use std::fmt;

/// First-class IR types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    /// No value (function results only)
    Void,
    /// Integer of the given bit width (i1, i8, i32, i64, ...)
    Int(u32),
    /// 32-bit IEEE float
    Float,
    /// 64-bit IEEE float
    Double,
    /// Pointer to the given element type
    Ptr(Box<IrType>),
    /// Named structure type (`struct.foo`, `union.bar`)
    Struct(String),
}

impl IrType {
    /// 8-bit integer (C `char`)
    pub fn i8() -> Self {
        IrType::Int(8)
    }

    /// 32-bit integer (C `int`)
    pub fn i32() -> Self {
        IrType::Int(32)
    }

    /// 64-bit integer (C `long` on LP64)
    pub fn i64() -> Self {
        IrType::Int(64)
    }

    /// Pointer to 8-bit integer (C string)
    pub fn i8_ptr() -> Self {
        IrType::Ptr(Box::new(IrType::Int(8)))
    }

    /// Pointer to `ty`
    pub fn ptr_to(ty: IrType) -> Self {
        IrType::Ptr(Box::new(ty))
    }

    /// Pointer to a named structure
    pub fn struct_ptr(name: &str) -> Self {
        IrType::Ptr(Box::new(IrType::Struct(name.to_string())))
    }

    /// Is this an integer of exactly `bits` width?
    pub fn is_int(&self, bits: u32) -> bool {
        matches!(self, IrType::Int(b) if *b == bits)
    }

    /// Is this any floating-point type?
    pub fn is_floating(&self) -> bool {
        matches!(self, IrType::Float | IrType::Double)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, IrType::Void)
    }

    /// Element type of a pointer
    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(bits) => write!(f, "i{}", bits),
            IrType::Float => write!(f, "float"),
            IrType::Double => write!(f, "double"),
            IrType::Ptr(inner) => write!(f, "{}*", inner),
            IrType::Struct(name) => write!(f, "%{}", name),
        }
    }
}

/// A structure type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    /// Type name including the `struct.`/`union.` marker; `None` for literal structs
    pub name: Option<String>,
    /// Field types by ordinal
    pub fields: Vec<IrType>,
}

impl StructType {
    /// Create a named structure type
    pub fn named(name: &str, fields: Vec<IrType>) -> Self {
        Self {
            name: Some(name.to_string()),
            fields,
        }
    }

    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    /// The type name, or an empty string for literal structs
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Type of the field at `ordinal`
    pub fn field_type(&self, ordinal: usize) -> Option<&IrType> {
        self.fields.get(ordinal)
    }
}

/// A module-level global variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVariable {
    /// Symbol name
    pub name: String,
    /// Value type (the global itself is a pointer to this)
    pub ty: IrType,
    /// Optional initializer
    pub initializer: Option<Constant>,
    /// Read-only data
    pub constant: bool,
}

/// Global initializers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// Integer initializer
    Int(i64),
    /// NUL-terminated byte string
    CString(String),
    /// All-zero initializer
    Zero,
}
