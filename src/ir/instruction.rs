//! IR instruction definitions

use super::types::IrType;
use serde::{Deserialize, Serialize};

/// SSA value handle, unique within a function.
///
/// Parameters and instructions share one id space. Instruction ids are stable:
/// inserting or moving other instructions never renumbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// Result of an instruction or a function parameter
    Value(ValueId),
    /// Integer constant of the given bit width
    ConstInt(u32, i64),
    /// Double constant (IEEE-754 bit pattern)
    ConstDouble(u64),
    /// Null pointer of the given pointer type
    Null(IrType),
    /// Address of a global variable
    Global(String),
    /// Address of a function
    Function(String),
}

impl Operand {
    /// 32-bit integer constant
    pub fn i32(value: i64) -> Self {
        Operand::ConstInt(32, value)
    }

    /// Constant value if this is an integer constant
    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Operand::ConstInt(_, v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(id) => Some(*id),
            _ => None,
        }
    }
}

/// Call target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    /// Statically known function
    Direct(String),
    /// Function pointer
    Indirect(Operand),
}

/// Cast operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastOp {
    SExt,
    ZExt,
    FpExt,
    PtrToInt,
    BitCast,
}

/// Binary arithmetic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
}

/// Instruction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    /// Call a function; `ret_ty` is `Void` when there is no result
    Call {
        /// Call target
        callee: Callee,
        /// Actual arguments
        args: Vec<Operand>,
        /// Result type
        ret_ty: IrType,
    },
    /// dst = *ptr
    Load {
        /// Loaded type
        ty: IrType,
        /// Address
        ptr: Operand,
    },
    /// *ptr = value
    Store {
        /// Stored value
        value: Operand,
        /// Address
        ptr: Operand,
    },
    /// Address computation: &base[indices...] over `source_ty`
    FieldAddr {
        /// Element type the first index steps over
        source_ty: IrType,
        /// Base pointer
        base: Operand,
        /// Index list (first selects the aggregate, the rest select members)
        indices: Vec<Operand>,
    },
    /// Stack slot of the given type
    Alloca {
        /// Allocated type
        ty: IrType,
    },
    /// Type conversion
    Cast {
        /// Conversion kind
        op: CastOp,
        /// Source value
        value: Operand,
        /// Destination type
        to: IrType,
    },
    /// dst = lhs op rhs
    Binary {
        /// Operation
        op: BinOp,
        /// Operand type
        ty: IrType,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
    },
    /// Unconditional branch
    Br {
        /// Target block label
        target: String,
    },
    /// Conditional branch
    CondBr {
        /// i1 condition
        cond: Operand,
        /// Label taken when true
        then_label: String,
        /// Label taken when false
        else_label: String,
    },
    /// Return with optional value
    Ret {
        /// Returned value
        value: Option<Operand>,
    },
}

/// An instruction with its stable id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Result value / identity
    pub id: ValueId,
    /// Payload
    pub kind: InstKind,
}

impl Instruction {
    /// All operands read by this instruction
    pub fn operands(&self) -> Vec<&Operand> {
        match &self.kind {
            InstKind::Call { callee, args, .. } => {
                let mut ops: Vec<&Operand> = Vec::with_capacity(args.len() + 1);
                if let Callee::Indirect(target) = callee {
                    ops.push(target);
                }
                ops.extend(args.iter());
                ops
            }
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::FieldAddr { base, indices, .. } => {
                let mut ops = vec![base];
                ops.extend(indices.iter());
                ops
            }
            InstKind::Alloca { .. } | InstKind::Br { .. } => Vec::new(),
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter().collect(),
        }
    }

    /// Does this instruction read `id`?
    pub fn uses(&self, id: ValueId) -> bool {
        self.operands()
            .iter()
            .any(|op| matches!(op, Operand::Value(v) if *v == id))
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. }
        )
    }

    /// Statically known call target, if this is a direct call
    pub fn called_function(&self) -> Option<&str> {
        match &self.kind {
            InstKind::Call {
                callee: Callee::Direct(name),
                ..
            } => Some(name),
            _ => None,
        }
    }
}
