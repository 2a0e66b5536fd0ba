//! Module, function and basic block definitions

use super::instruction::{InstKind, Instruction, Operand, ValueId};
use super::types::{Constant, GlobalVariable, IrType, StructType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Index of a function within its module.
///
/// Functions are only ever appended, so ids stay valid across instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub usize);

/// Basic block in the control flow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Label identifying this basic block
    pub label: String,
    /// Instructions in order; the last one is the terminator
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    /// Create a new basic block with the given label
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            instructions: Vec::new(),
        }
    }
}

/// Formal parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Value handle used by instructions
    pub id: ValueId,
    /// Source-level name (may be empty)
    pub name: String,
    /// Parameter type
    pub ty: IrType,
}

/// Debug metadata for a function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiSubprogram {
    /// Source file path as recorded by the front end
    pub file: String,
    /// Line of the definition
    pub line: u32,
}

/// Debug metadata for a structure: source-level field names by ordinal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiCompositeType {
    /// IR type name (`struct.foo`)
    pub type_name: String,
    /// Field names, indexed by field ordinal
    pub fields: Vec<String>,
}

/// A function definition or declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Symbol name
    pub name: String,
    /// Formal parameters
    pub params: Vec<Param>,
    /// Return type
    pub ret_ty: IrType,
    /// C-style variadic
    pub var_args: bool,
    /// Body; empty for declarations
    pub blocks: Vec<BasicBlock>,
    /// Debug metadata, when the front end emitted it
    pub subprogram: Option<DiSubprogram>,
    /// Next unused value id
    #[serde(default)]
    next_value: u32,
}

impl Function {
    /// Create a body-less function; parameters get ids 0..n
    pub fn declare(name: &str, ret_ty: IrType, params: Vec<(String, IrType)>, var_args: bool) -> Self {
        let params: Vec<Param> = params
            .into_iter()
            .enumerate()
            .map(|(i, (name, ty))| Param {
                id: ValueId(i as u32),
                name,
                ty,
            })
            .collect();
        let next_value = params.len() as u32;
        Self {
            name: name.to_string(),
            params,
            ret_ty,
            var_args,
            blocks: Vec::new(),
            subprogram: None,
            next_value,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// All instructions in block order
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Position (block index, instruction index) of an instruction
    pub fn locate(&self, id: ValueId) -> Option<(usize, usize)> {
        self.blocks.iter().enumerate().find_map(|(bi, block)| {
            block
                .instructions
                .iter()
                .position(|inst| inst.id == id)
                .map(|ii| (bi, ii))
        })
    }

    /// Look up an instruction by id
    pub fn instruction(&self, id: ValueId) -> Option<&Instruction> {
        self.instructions().find(|inst| inst.id == id)
    }

    /// Instructions that read `id`, in program order
    pub fn users(&self, id: ValueId) -> Vec<&Instruction> {
        self.instructions().filter(|inst| inst.uses(id)).collect()
    }

    pub fn param(&self, id: ValueId) -> Option<&Param> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Ids of every `ret` instruction
    pub fn return_points(&self) -> Vec<ValueId> {
        self.instructions()
            .filter(|inst| matches!(inst.kind, InstKind::Ret { .. }))
            .map(|inst| inst.id)
            .collect()
    }

    /// Allocate a fresh value id
    pub fn fresh_value(&mut self) -> ValueId {
        if self.next_value == 0 {
            self.next_value = self.max_value_id().map(|v| v + 1).unwrap_or(0);
        }
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn max_value_id(&self) -> Option<u32> {
        let params = self.params.iter().map(|p| p.id.0);
        let insts = self.instructions().map(|i| i.id.0);
        params.chain(insts).max()
    }

    /// A block label not used yet in this function, derived from `base`
    pub fn fresh_label(&self, base: &str) -> String {
        let taken = |label: &str| self.blocks.iter().any(|b| b.label == label);
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Move instructions `at..` of block `block` into a new block labelled
    /// `label`, placed right after it. The original block is left without a
    /// terminator; the caller must add one. Returns the new block's index.
    pub fn split_block(&mut self, block: usize, at: usize, label: &str) -> usize {
        let tail = self.blocks[block].instructions.split_off(at);
        let new_block = BasicBlock {
            label: label.to_string(),
            instructions: tail,
        };
        self.blocks.insert(block + 1, new_block);
        block + 1
    }
}

/// A complete compilation unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module identifier (usually the primary source file)
    pub name: String,
    /// Named and literal structure types
    pub structs: Vec<StructType>,
    /// Global variables and constants
    pub globals: Vec<GlobalVariable>,
    /// Functions in definition order
    pub functions: Vec<Function>,
    /// Structure debug metadata
    #[serde(default)]
    pub debug_types: Vec<DiCompositeType>,
}

impl Module {
    /// Create a new empty module
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            structs: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            debug_types: Vec::new(),
        }
    }

    /// Parse a module from its JSON exchange form
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the module in its JSON exchange form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Find a function by symbol name
    pub fn function(&self, name: &str) -> Option<FuncId> {
        self.functions.iter().position(|f| f.name == name).map(FuncId)
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0]
    }

    /// Iterate over function ids in definition order
    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len()).map(FuncId)
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.functions.push(function);
        FuncId(self.functions.len() - 1)
    }

    /// Return the function named `name`, declaring it with the given
    /// signature if it does not exist yet.
    pub fn get_or_insert_function(
        &mut self,
        name: &str,
        ret_ty: IrType,
        params: Vec<IrType>,
        var_args: bool,
    ) -> FuncId {
        if let Some(id) = self.function(name) {
            return id;
        }
        let params = params
            .into_iter()
            .enumerate()
            .map(|(i, ty)| (format!("arg{}", i), ty))
            .collect();
        self.add_function(Function::declare(name, ret_ty, params, var_args))
    }

    /// Is there a function or global with this symbol name?
    pub fn has_symbol(&self, name: &str) -> bool {
        self.function(name).is_some() || self.global(name).is_some()
    }

    /// Find a structure type by its IR name
    pub fn struct_type(&self, name: &str) -> Option<&StructType> {
        self.structs.iter().find(|s| s.name.as_deref() == Some(name))
    }

    /// Find a global variable by name
    pub fn global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// Address of a private string constant holding `text`.
    ///
    /// Identical strings share one global (`.str`, `.str.1`, ...).
    pub fn global_string(&mut self, text: &str) -> Operand {
        let existing = self.globals.iter().find(|g| {
            g.constant
                && g.name.starts_with(".str")
                && g.initializer.as_ref() == Some(&Constant::CString(text.to_string()))
        });
        if let Some(global) = existing {
            return Operand::Global(global.name.clone());
        }

        let name = std::iter::once(".str".to_string())
            .chain((1..).map(|n| format!(".str.{}", n)))
            .find(|candidate| !self.has_symbol(candidate))
            .unwrap_or_default();
        self.globals.push(GlobalVariable {
            name: name.clone(),
            ty: IrType::i8(),
            initializer: Some(Constant::CString(text.to_string())),
            constant: true,
        });
        Operand::Global(name)
    }

    /// Static type of an operand as seen from inside function `func`
    pub fn operand_type(&self, func: FuncId, operand: &Operand) -> Option<IrType> {
        match operand {
            Operand::ConstInt(bits, _) => Some(IrType::Int(*bits)),
            Operand::ConstDouble(_) => Some(IrType::Double),
            Operand::Null(ty) => Some(ty.clone()),
            Operand::Global(name) => self.global(name).map(|g| IrType::ptr_to(g.ty.clone())),
            Operand::Function(_) => Some(IrType::i8_ptr()),
            Operand::Value(id) => self.value_type(func, *id),
        }
    }

    fn value_type(&self, func: FuncId, id: ValueId) -> Option<IrType> {
        let function = self.func(func);
        if let Some(param) = function.param(id) {
            return Some(param.ty.clone());
        }
        let inst = function.instruction(id)?;
        match &inst.kind {
            InstKind::Call { ret_ty, .. } if !ret_ty.is_void() => Some(ret_ty.clone()),
            InstKind::Load { ty, .. } => Some(ty.clone()),
            InstKind::Alloca { ty } => Some(IrType::ptr_to(ty.clone())),
            InstKind::Cast { to, .. } => Some(to.clone()),
            InstKind::Binary { ty, .. } => Some(ty.clone()),
            InstKind::FieldAddr {
                source_ty, indices, ..
            } => self.field_addr_type(source_ty, indices),
            _ => None,
        }
    }

    /// Result type of an address computation
    fn field_addr_type(&self, source_ty: &IrType, indices: &[Operand]) -> Option<IrType> {
        let mut current = source_ty.clone();
        for index in indices.iter().skip(1) {
            current = match &current {
                IrType::Struct(name) => {
                    let ordinal = index.as_const_int()?;
                    self.struct_type(name)?
                        .field_type(usize::try_from(ordinal).ok()?)?
                        .clone()
                }
                _ => return None,
            };
        }
        Some(IrType::ptr_to(current))
    }

    /// Check the structural invariants the rewriter relies on: unique value
    /// ids per function and a terminator at the end of every block.
    pub fn verify(&self) -> Result<()> {
        for function in &self.functions {
            let mut seen = std::collections::HashSet::new();
            for param in &function.params {
                if !seen.insert(param.id) {
                    return Err(Error::ir(format!(
                        "duplicate value id {} in '{}'",
                        param.id.0, function.name
                    )));
                }
            }
            for block in &function.blocks {
                for inst in &block.instructions {
                    if !seen.insert(inst.id) {
                        return Err(Error::ir(format!(
                            "duplicate value id {} in '{}'",
                            inst.id.0, function.name
                        )));
                    }
                }
                if !block.instructions.last().is_some_and(|i| i.is_terminator()) {
                    return Err(Error::ir(format!(
                        "block '{}' in '{}' has no terminator",
                        block.label, function.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_string_dedup() {
        let mut module = Module::new("test.c");
        let a = module.global_string("hello");
        let b = module.global_string("world");
        let c = module.global_string("hello");
        assert_eq!(a, Operand::Global(".str".into()));
        assert_eq!(b, Operand::Global(".str.1".into()));
        assert_eq!(a, c);
        assert_eq!(module.globals.len(), 2);
    }

    #[test]
    fn test_global_string_skips_taken_names() {
        let mut module = Module::new("test.c");
        for (name, text) in [(".str", "user0"), (".str.2", "user2")] {
            module.globals.push(GlobalVariable {
                name: name.into(),
                ty: IrType::i8(),
                initializer: Some(Constant::CString(text.into())),
                constant: true,
            });
        }

        let a = module.global_string("enter alloc: %d\n");
        let b = module.global_string("size");
        let c = module.global_string("more");
        assert_eq!(a, Operand::Global(".str.1".into()));
        assert_eq!(b, Operand::Global(".str.3".into()));
        assert_eq!(c, Operand::Global(".str.4".into()));
        assert_eq!(
            module.global(".str.1").and_then(|g| g.initializer.clone()),
            Some(Constant::CString("enter alloc: %d\n".into()))
        );
        assert_eq!(
            module.global(".str.2").and_then(|g| g.initializer.clone()),
            Some(Constant::CString("user2".into()))
        );
    }

    #[test]
    fn test_fresh_value_after_params() {
        let mut f = Function::declare(
            "f",
            IrType::Void,
            vec![("a".into(), IrType::i32()), ("b".into(), IrType::i32())],
            false,
        );
        assert_eq!(f.fresh_value(), ValueId(2));
        assert_eq!(f.fresh_value(), ValueId(3));
    }

    #[test]
    fn test_split_block() {
        let mut f = Function::declare("f", IrType::Void, vec![], false);
        let mut block = BasicBlock::new("entry");
        for _ in 0..3 {
            let id = f.fresh_value();
            block.instructions.push(Instruction {
                id,
                kind: InstKind::Alloca { ty: IrType::i32() },
            });
        }
        f.blocks.push(block);

        let new_idx = f.split_block(0, 1, "tail");
        assert_eq!(new_idx, 1);
        assert_eq!(f.blocks[0].instructions.len(), 1);
        assert_eq!(f.blocks[1].instructions.len(), 2);
        assert_eq!(f.locate(ValueId(2)), Some((1, 1)));
        assert_eq!(f.fresh_label("tail"), "tail1");
    }
}
