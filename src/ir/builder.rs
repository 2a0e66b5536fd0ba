//! Instruction insertion and function construction

use super::instruction::{CastOp, Callee, InstKind, Instruction, Operand, ValueId};
use super::program::{BasicBlock, DiSubprogram, FuncId, Function, Module};
use super::types::IrType;
use crate::{Error, Result};

/// Insertion cursor into a function of a module.
///
/// New instructions are placed at the cursor and the cursor advances past
/// them, so a sequence of inserts comes out in program order.
pub struct IrBuilder<'m> {
    module: &'m mut Module,
    func: FuncId,
    block: usize,
    index: usize,
}

impl<'m> IrBuilder<'m> {
    /// Cursor placed immediately before instruction `anchor`
    pub fn before(module: &'m mut Module, func: FuncId, anchor: ValueId) -> Result<Self> {
        let (block, index) = Self::resolve(module, func, anchor)?;
        Ok(Self {
            module,
            func,
            block,
            index,
        })
    }

    /// Cursor placed immediately after instruction `anchor`
    pub fn after(module: &'m mut Module, func: FuncId, anchor: ValueId) -> Result<Self> {
        let (block, index) = Self::resolve(module, func, anchor)?;
        Ok(Self {
            module,
            func,
            block,
            index: index + 1,
        })
    }

    /// Cursor at the end of block `block`
    pub fn at_end(module: &'m mut Module, func: FuncId, block: usize) -> Self {
        let index = module.func(func).blocks[block].instructions.len();
        Self {
            module,
            func,
            block,
            index,
        }
    }

    fn resolve(module: &Module, func: FuncId, anchor: ValueId) -> Result<(usize, usize)> {
        let function = module.func(func);
        function
            .locate(anchor)
            .ok_or_else(|| Error::InvalidInstrumentationPoint {
                function: function.name.clone(),
                value: anchor.0,
            })
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    /// Function the cursor is in
    pub fn function(&self) -> FuncId {
        self.func
    }

    /// Insert an instruction at the cursor
    pub fn insert(&mut self, kind: InstKind) -> ValueId {
        let function = self.module.func_mut(self.func);
        let id = function.fresh_value();
        function.blocks[self.block]
            .instructions
            .insert(self.index, Instruction { id, kind });
        self.index += 1;
        id
    }

    /// Call a function by name
    pub fn call(&mut self, name: &str, ret_ty: IrType, args: Vec<Operand>) -> ValueId {
        self.insert(InstKind::Call {
            callee: Callee::Direct(name.to_string()),
            args,
            ret_ty,
        })
    }

    pub fn cast(&mut self, op: CastOp, value: Operand, to: IrType) -> Operand {
        Operand::Value(self.insert(InstKind::Cast { op, value, to }))
    }

    pub fn alloca(&mut self, ty: IrType) -> Operand {
        Operand::Value(self.insert(InstKind::Alloca { ty }))
    }

    /// Stack slot allocated once per call of the function.
    ///
    /// The alloca goes after any allocas already leading the entry block and
    /// before the cursor, so it dominates its uses and never runs inside a
    /// loop. The cursor keeps pointing at the same instruction.
    pub fn entry_alloca(&mut self, ty: IrType) -> Operand {
        let function = self.module.func_mut(self.func);
        let id = function.fresh_value();
        let entry = &mut function.blocks[0].instructions;
        let leading = entry
            .iter()
            .take_while(|inst| matches!(inst.kind, InstKind::Alloca { .. }))
            .count();
        // never past the cursor, or code inserted there would precede it
        let at = if self.block == 0 {
            leading.min(self.index)
        } else {
            leading
        };
        entry.insert(at, Instruction { id, kind: InstKind::Alloca { ty } });
        if self.block == 0 {
            self.index += 1;
        }
        Operand::Value(id)
    }

    pub fn load(&mut self, ty: IrType, ptr: Operand) -> Operand {
        Operand::Value(self.insert(InstKind::Load { ty, ptr }))
    }

    pub fn store(&mut self, value: Operand, ptr: Operand) -> ValueId {
        self.insert(InstKind::Store { value, ptr })
    }

    /// Address of a private string constant
    pub fn global_string(&mut self, text: &str) -> Operand {
        self.module.global_string(text)
    }

    pub fn operand_type(&self, operand: &Operand) -> Option<IrType> {
        self.module.operand_type(self.func, operand)
    }

    /// Give the code inserted from here on a basic block of its own.
    ///
    /// The current block is split at the cursor: it now branches to a new
    /// `<base>.instr` block, which branches on to `<base>.cont` holding the
    /// rest of the original block. The cursor moves into the new block.
    pub fn isolate_block(&mut self, base: &str) {
        let (block, index) = (self.block, self.index);
        let function = self.module.func_mut(self.func);

        let instr_label = function.fresh_label(&format!("{}.instr", base));
        let cont_label = function.fresh_label(&format!("{}.cont", base));
        function.split_block(block, index, &cont_label);
        function
            .blocks
            .insert(block + 1, BasicBlock::new(&instr_label));

        let to_instr = function.fresh_value();
        function.blocks[block].instructions.push(Instruction {
            id: to_instr,
            kind: InstKind::Br {
                target: instr_label,
            },
        });
        let to_cont = function.fresh_value();
        function.blocks[block + 1].instructions.push(Instruction {
            id: to_cont,
            kind: InstKind::Br { target: cont_label },
        });

        self.block = block + 1;
        self.index = 0;
    }
}

/// Convenience builder for function definitions
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
    current: usize,
}

impl FunctionBuilder {
    /// Start a definition with an `entry` block
    pub fn new(name: &str, ret_ty: IrType, params: &[(&str, IrType)]) -> Self {
        let params = params
            .iter()
            .map(|(n, ty)| (n.to_string(), ty.clone()))
            .collect();
        let mut function = Function::declare(name, ret_ty, params, false);
        function.blocks.push(BasicBlock::new("entry"));
        Self {
            function,
            current: 0,
        }
    }

    /// Operand for parameter `index`
    pub fn param(&self, index: usize) -> Operand {
        Operand::Value(self.function.params[index].id)
    }

    /// Attach debug location metadata
    pub fn subprogram(mut self, file: &str, line: u32) -> Self {
        self.function.subprogram = Some(DiSubprogram {
            file: file.to_string(),
            line,
        });
        self
    }

    /// Start appending to a new block
    pub fn block(&mut self, label: &str) -> &mut Self {
        self.function.blocks.push(BasicBlock::new(label));
        self.current = self.function.blocks.len() - 1;
        self
    }

    /// Append an instruction to the current block
    pub fn push(&mut self, kind: InstKind) -> Operand {
        let id = self.function.fresh_value();
        self.function.blocks[self.current]
            .instructions
            .push(Instruction { id, kind });
        Operand::Value(id)
    }

    pub fn call(&mut self, callee: &str, args: Vec<Operand>, ret_ty: IrType) -> Operand {
        self.push(InstKind::Call {
            callee: Callee::Direct(callee.to_string()),
            args,
            ret_ty,
        })
    }

    pub fn call_indirect(&mut self, target: Operand, args: Vec<Operand>, ret_ty: IrType) -> Operand {
        self.push(InstKind::Call {
            callee: Callee::Indirect(target),
            args,
            ret_ty,
        })
    }

    pub fn alloca(&mut self, ty: IrType) -> Operand {
        self.push(InstKind::Alloca { ty })
    }

    pub fn load(&mut self, ty: IrType, ptr: Operand) -> Operand {
        self.push(InstKind::Load { ty, ptr })
    }

    pub fn store(&mut self, value: Operand, ptr: Operand) -> Operand {
        self.push(InstKind::Store { value, ptr })
    }

    /// `&base->field` for a named struct: indices `[0, field]`
    pub fn field_addr(&mut self, struct_name: &str, base: Operand, field: i64) -> Operand {
        self.gep(
            IrType::Struct(struct_name.to_string()),
            base,
            vec![Operand::i32(0), Operand::i32(field)],
        )
    }

    /// Address computation with an arbitrary index list
    pub fn gep(&mut self, source_ty: IrType, base: Operand, indices: Vec<Operand>) -> Operand {
        self.push(InstKind::FieldAddr {
            source_ty,
            base,
            indices,
        })
    }

    pub fn ret(&mut self, value: Option<Operand>) -> Operand {
        self.push(InstKind::Ret { value })
    }

    pub fn build(self) -> Function {
        self.function
    }
}
