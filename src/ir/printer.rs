//! Textual rendering of the IR (for dumps, diagnostics and tests)

use super::instruction::{BinOp, CastOp, Callee, InstKind, Instruction, Operand};
use super::program::{Function, Module};
use super::types::Constant;
use std::fmt;

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(id) => write!(f, "%{}", id.0),
            Operand::ConstInt(bits, v) => write!(f, "i{} {}", bits, v),
            Operand::ConstDouble(bits) => write!(f, "double {}", f64::from_bits(*bits)),
            Operand::Null(ty) => write!(f, "{} null", ty),
            Operand::Global(name) => write!(f, "@{}", name),
            Operand::Function(name) => write!(f, "@{}", name),
        }
    }
}

fn join(ops: &[Operand]) -> String {
    ops.iter()
        .map(|o| o.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dst = self.id.0;
        match &self.kind {
            InstKind::Call {
                callee,
                args,
                ret_ty,
            } => {
                let target = match callee {
                    Callee::Direct(name) => format!("@{}", name),
                    Callee::Indirect(op) => op.to_string(),
                };
                if ret_ty.is_void() {
                    write!(f, "call void {}({})", target, join(args))
                } else {
                    write!(f, "%{} = call {} {}({})", dst, ret_ty, target, join(args))
                }
            }
            InstKind::Load { ty, ptr } => write!(f, "%{} = load {}, {}", dst, ty, ptr),
            InstKind::Store { value, ptr } => write!(f, "store {}, {}", value, ptr),
            InstKind::FieldAddr {
                source_ty,
                base,
                indices,
            } => write!(
                f,
                "%{} = getelementptr {}, {}, {}",
                dst,
                source_ty,
                base,
                join(indices)
            ),
            InstKind::Alloca { ty } => write!(f, "%{} = alloca {}", dst, ty),
            InstKind::Cast { op, value, to } => {
                let name = match op {
                    CastOp::SExt => "sext",
                    CastOp::ZExt => "zext",
                    CastOp::FpExt => "fpext",
                    CastOp::PtrToInt => "ptrtoint",
                    CastOp::BitCast => "bitcast",
                };
                write!(f, "%{} = {} {} to {}", dst, name, value, to)
            }
            InstKind::Binary { op, ty, lhs, rhs } => {
                let name = match op {
                    BinOp::Add => "add",
                    BinOp::Sub => "sub",
                    BinOp::Mul => "mul",
                    BinOp::And => "and",
                    BinOp::Or => "or",
                };
                write!(f, "%{} = {} {} {}, {}", dst, name, ty, lhs, rhs)
            }
            InstKind::Br { target } => write!(f, "br label %{}", target),
            InstKind::CondBr {
                cond,
                then_label,
                else_label,
            } => write!(f, "br {}, label %{}, label %{}", cond, then_label, else_label),
            InstKind::Ret { value: Some(v) } => write!(f, "ret {}", v),
            InstKind::Ret { value: None } => write!(f, "ret void"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{} %{}", p.ty, p.id.0))
            .collect();
        if self.var_args {
            params.push("...".to_string());
        }
        let keyword = if self.is_declaration() {
            "declare"
        } else {
            "define"
        };
        write!(
            f,
            "{} {} @{}({})",
            keyword,
            self.ret_ty,
            self.name,
            params.join(", ")
        )?;
        if self.is_declaration() {
            return writeln!(f);
        }
        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", inst)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for st in &self.structs {
            let fields: Vec<String> = st.fields.iter().map(|t| t.to_string()).collect();
            writeln!(f, "%{} = type {{ {} }}", st.name(), fields.join(", "))?;
        }
        for global in &self.globals {
            let init = match &global.initializer {
                Some(Constant::Int(v)) => v.to_string(),
                Some(Constant::CString(s)) => format!("c{:?}", s),
                Some(Constant::Zero) => "zeroinitializer".to_string(),
                None => String::new(),
            };
            let kind = if global.constant { "constant" } else { "global" };
            writeln!(f, "@{} = {} {} {}", global.name, kind, global.ty, init)?;
        }
        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
