//! Hook construction for each kind of instrumentation point.
//!
//! The instrumenter decides what a hook is called, what it carries and where
//! it goes; the [`InstrStrategy`] decides how the logging code is placed.

use super::strategy::{HookSpec, InstrStrategy};
use crate::ir::{FuncId, InstKind, IrBuilder, IrType, Module, Operand, ValueId};
use crate::logger::Parameter;
use crate::policy::{Direction, Metadata, Policy, Transform};
use crate::{Error, Result};

/// Builds a hook name from its components
pub type NameFn<'a> = Box<dyn Fn(&[&str]) -> String + 'a>;

/// Per-function details from the policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FnDetails {
    pub metadata: Metadata,
    pub transforms: Vec<Transform>,
}

impl FnDetails {
    /// Details of the first policy rule matching `function`
    pub fn from_policy(policy: &Policy, module: &Module, function: FuncId) -> Self {
        let function = module.func(function);
        Self {
            metadata: policy.instr_metadata(function),
            transforms: policy.instr_transforms(function),
        }
    }
}

/// A structure field access recognised by the collection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    /// The address computation (`&base->field`)
    pub field_addr: ValueId,
    /// Unqualified structure name (`foo` for `struct.foo`)
    pub struct_name: String,
    /// Source-level field name
    pub field_name: String,
}

/// Inserts hooks into a module
pub struct Instrumenter<'a> {
    name: NameFn<'a>,
    strategy: InstrStrategy,
}

impl<'a> Instrumenter<'a> {
    pub fn new(name: NameFn<'a>, strategy: InstrStrategy) -> Self {
        Self { name, strategy }
    }

    /// Hook names from `policy.instr_name`, strategy and loggers from the policy
    pub fn from_policy(policy: &'a Policy) -> Self {
        let name: NameFn<'a> = Box::new(move |components: &[&str]| policy.instr_name(components));
        Self::new(name, InstrStrategy::from_policy(policy))
    }

    pub fn strategy(&self) -> &InstrStrategy {
        &self.strategy
    }

    /// Instrument the prologue (`In`) and every return point (`Out`) of a
    /// function definition
    pub fn instrument_function(
        &self,
        module: &mut Module,
        func: FuncId,
        directions: &[Direction],
        details: &FnDetails,
    ) -> Result<bool> {
        let function = module.func(func);
        if function.is_declaration() {
            return Ok(false);
        }
        let fn_name = function.name.clone();
        let ret_ty = function.ret_ty.clone();
        let description = describe(&fn_name, &details.metadata);
        let (params, args): (Vec<Parameter>, Vec<Operand>) = function
            .params
            .iter()
            .map(|p| (Parameter::new(p.name.clone(), p.ty.clone()), Operand::Value(p.id)))
            .unzip();
        let entry = function.blocks[0].instructions.first().map(|i| i.id);
        let returns = function.return_points();

        let mut changed = false;

        if directions.contains(&Direction::In) {
            let entry = entry.ok_or_else(|| Error::InvalidInstrumentationPoint {
                function: fn_name.clone(),
                value: 0,
            })?;
            let mut b = IrBuilder::before(module, func, entry)?;
            changed |= self.emit(
                &mut b,
                &["enter", fn_name.as_str()],
                format!("enter {}:", description),
                params.clone(),
                args.clone(),
                0,
                details,
            );
        }

        if directions.contains(&Direction::Out) {
            for ret in returns {
                let mut b = IrBuilder::before(module, func, ret)?;
                let (mut ret_params, mut ret_args) = (Vec::new(), Vec::new());
                if let Some(InstKind::Ret { value: Some(value) }) =
                    b.module().func(func).instruction(ret).map(|i| i.kind.clone())
                {
                    ret_params.push(Parameter::new("retval", ret_ty.clone()));
                    ret_args.push(value);
                }
                let leading = ret_params.len();
                ret_params.extend(params.iter().cloned());
                ret_args.extend(args.iter().cloned());
                changed |= self.emit(
                    &mut b,
                    &["leave", fn_name.as_str()],
                    format!("leave {}:", description),
                    ret_params,
                    ret_args,
                    leading,
                    details,
                );
            }
        }

        Ok(changed)
    }

    /// Instrument a direct call site: before the call (`In`) and after it
    /// returns (`Out`)
    pub fn instrument_call(
        &self,
        module: &mut Module,
        func: FuncId,
        call: ValueId,
        directions: &[Direction],
        details: &FnDetails,
    ) -> Result<bool> {
        let (callee, args, ret_ty) = match module.func(func).instruction(call).map(|i| &i.kind) {
            Some(InstKind::Call {
                callee: crate::ir::Callee::Direct(name),
                args,
                ret_ty,
            }) => (name.clone(), args.clone(), ret_ty.clone()),
            _ => return Err(self.invalid_point(module, func, call)),
        };
        let description = describe(&callee, &details.metadata);

        let callee_params = module
            .function(&callee)
            .map(|id| module.func(id).params.clone())
            .unwrap_or_default();
        let mut params = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let declared = callee_params.get(i);
            let ty = module
                .operand_type(func, arg)
                .or_else(|| declared.map(|p| p.ty.clone()))
                .ok_or_else(|| self.invalid_point(module, func, call))?;
            let name = declared
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("arg{}", i));
            params.push(Parameter::new(name, ty));
        }

        let mut changed = false;

        if directions.contains(&Direction::In) {
            let mut b = IrBuilder::before(module, func, call)?;
            changed |= self.emit(
                &mut b,
                &["call", callee.as_str()],
                format!("call {}:", description),
                params.clone(),
                args.clone(),
                0,
                details,
            );
        }

        if directions.contains(&Direction::Out) {
            let mut b = IrBuilder::after(module, func, call)?;
            let (mut ret_params, mut ret_args) = (Vec::new(), Vec::new());
            if !ret_ty.is_void() {
                ret_params.push(Parameter::new("retval", ret_ty));
                ret_args.push(Operand::Value(call));
            }
            let leading = ret_params.len();
            ret_params.extend(params);
            ret_args.extend(args);
            changed |= self.emit(
                &mut b,
                &["return", callee.as_str()],
                format!("return {}:", description),
                ret_params,
                ret_args,
                leading,
                details,
            );
        }

        Ok(changed)
    }

    /// Log the value read from a structure field, after the load
    pub fn instrument_field_read(
        &self,
        module: &mut Module,
        func: FuncId,
        load: ValueId,
        field: &FieldAccess,
    ) -> Result<bool> {
        let (ty, _) = self.load_parts(module, func, load)?;
        let base = self.field_base(module, func, field)?;
        let base_ty = self.type_of(module, func, load, &base)?;

        let mut b = IrBuilder::after(module, func, load)?;
        let name = b.global_string(&field.field_name);
        Ok(self.emit(
            &mut b,
            &["load", field.struct_name.as_str(), field.field_name.as_str()],
            format!("load {}.{}:", field.struct_name, field.field_name),
            vec![
                Parameter::new("field", IrType::i8_ptr()),
                Parameter::new("value", ty),
                Parameter::new("base", base_ty),
            ],
            vec![name, Operand::Value(load), base],
            0,
            &FnDetails::default(),
        ))
    }

    /// Log the value written to a structure field, before the store
    pub fn instrument_field_write(
        &self,
        module: &mut Module,
        func: FuncId,
        store: ValueId,
        field: &FieldAccess,
    ) -> Result<bool> {
        let (value, _) = self.store_parts(module, func, store)?;
        let ty = self.type_of(module, func, store, &value)?;
        let base = self.field_base(module, func, field)?;
        let base_ty = self.type_of(module, func, store, &base)?;

        let mut b = IrBuilder::before(module, func, store)?;
        let name = b.global_string(&field.field_name);
        Ok(self.emit(
            &mut b,
            &["store", field.struct_name.as_str(), field.field_name.as_str()],
            format!("store {}.{}:", field.struct_name, field.field_name),
            vec![
                Parameter::new("field", IrType::i8_ptr()),
                Parameter::new("value", ty),
                Parameter::new("base", base_ty),
            ],
            vec![name, value, base],
            0,
            &FnDetails::default(),
        ))
    }

    /// Log a read of a global variable, after the load
    pub fn instrument_global_read(
        &self,
        module: &mut Module,
        func: FuncId,
        load: ValueId,
        global: &str,
    ) -> Result<bool> {
        let (ty, _) = self.load_parts(module, func, load)?;
        let context = module.func(func).name.clone();

        let mut b = IrBuilder::after(module, func, load)?;
        let name = b.global_string(global);
        let context = b.global_string(&context);
        Ok(self.emit(
            &mut b,
            &["global", "load", global],
            format!("load {}:", global),
            global_params(ty),
            vec![name, Operand::Value(load), context],
            0,
            &FnDetails::default(),
        ))
    }

    /// Log a write to a global variable, before the store
    pub fn instrument_global_write(
        &self,
        module: &mut Module,
        func: FuncId,
        store: ValueId,
        global: &str,
    ) -> Result<bool> {
        let (value, _) = self.store_parts(module, func, store)?;
        let ty = self.type_of(module, func, store, &value)?;
        let context = module.func(func).name.clone();

        let mut b = IrBuilder::before(module, func, store)?;
        let name = b.global_string(global);
        let context = b.global_string(&context);
        Ok(self.emit(
            &mut b,
            &["global", "store", global],
            format!("store {}:", global),
            global_params(ty),
            vec![name, value, context],
            0,
            &FnDetails::default(),
        ))
    }

    /// Log the address and value of any load
    pub fn instrument_pointer_load(
        &self,
        module: &mut Module,
        func: FuncId,
        load: ValueId,
    ) -> Result<bool> {
        let (ty, ptr) = self.load_parts(module, func, load)?;
        let ptr_ty = self.type_of(module, func, load, &ptr)?;

        let mut b = IrBuilder::after(module, func, load)?;
        Ok(self.emit(
            &mut b,
            &["pointer", "load"],
            "load:".to_string(),
            vec![Parameter::new("address", ptr_ty), Parameter::new("value", ty)],
            vec![ptr, Operand::Value(load)],
            0,
            &FnDetails::default(),
        ))
    }

    /// Log the address and value of any store
    pub fn instrument_pointer_store(
        &self,
        module: &mut Module,
        func: FuncId,
        store: ValueId,
    ) -> Result<bool> {
        let (value, ptr) = self.store_parts(module, func, store)?;
        let ty = self.type_of(module, func, store, &value)?;
        let ptr_ty = self.type_of(module, func, store, &ptr)?;

        let mut b = IrBuilder::before(module, func, store)?;
        Ok(self.emit(
            &mut b,
            &["pointer", "store"],
            "store:".to_string(),
            vec![Parameter::new("address", ptr_ty), Parameter::new("value", ty)],
            vec![ptr, value],
            0,
            &FnDetails::default(),
        ))
    }

    /// Apply transforms and metadata, then hand the hook to the strategy.
    ///
    /// `leading` counts the values (a return value) logged ahead of the
    /// function's own arguments.
    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        b: &mut IrBuilder,
        components: &[&str],
        description: String,
        mut params: Vec<Parameter>,
        mut values: Vec<Operand>,
        leading: usize,
        details: &FnDetails,
    ) -> bool {
        for transform in &details.transforms {
            apply_transform(b, transform, leading, &mut params, &mut values);
        }
        if details.metadata.id != 0 {
            params.insert(0, Parameter::new("id", IrType::i32()));
            values.insert(0, Operand::i32(i64::from(details.metadata.id)));
        }

        let hook = HookSpec {
            name: (self.name)(components),
            description,
            params,
        };
        self.strategy.instrument(b, &hook, &values)
    }

    fn load_parts(&self, module: &Module, func: FuncId, load: ValueId) -> Result<(IrType, Operand)> {
        match module.func(func).instruction(load).map(|i| &i.kind) {
            Some(InstKind::Load { ty, ptr }) => Ok((ty.clone(), ptr.clone())),
            _ => Err(self.invalid_point(module, func, load)),
        }
    }

    fn store_parts(
        &self,
        module: &Module,
        func: FuncId,
        store: ValueId,
    ) -> Result<(Operand, Operand)> {
        match module.func(func).instruction(store).map(|i| &i.kind) {
            Some(InstKind::Store { value, ptr }) => Ok((value.clone(), ptr.clone())),
            _ => Err(self.invalid_point(module, func, store)),
        }
    }

    fn field_base(&self, module: &Module, func: FuncId, field: &FieldAccess) -> Result<Operand> {
        match module.func(func).instruction(field.field_addr).map(|i| &i.kind) {
            Some(InstKind::FieldAddr { base, .. }) => Ok(base.clone()),
            _ => Err(self.invalid_point(module, func, field.field_addr)),
        }
    }

    fn type_of(&self, module: &Module, func: FuncId, at: ValueId, operand: &Operand) -> Result<IrType> {
        module
            .operand_type(func, operand)
            .ok_or_else(|| self.invalid_point(module, func, at))
    }

    fn invalid_point(&self, module: &Module, func: FuncId, value: ValueId) -> Error {
        Error::InvalidInstrumentationPoint {
            function: module.func(func).name.clone(),
            value: value.0,
        }
    }
}

/// Function name, or the metadata's event name when one is set
fn describe(name: &str, metadata: &Metadata) -> String {
    if metadata.name.is_empty() {
        name.to_string()
    } else {
        metadata.name.clone()
    }
}

fn global_params(ty: IrType) -> Vec<Parameter> {
    vec![
        Parameter::new("global", IrType::i8_ptr()),
        Parameter::new("value", ty),
        Parameter::new("function", IrType::i8_ptr()),
    ]
}

/// Replace the value named by `transform.arg` with `transform.func(value)`.
///
/// A numeric `arg` is a position among the function's arguments, which start
/// after the `leading` values.
fn apply_transform(
    b: &mut IrBuilder,
    transform: &Transform,
    leading: usize,
    params: &mut [Parameter],
    values: &mut [Operand],
) {
    let index = transform
        .arg
        .parse::<usize>()
        .ok()
        .map(|i| i + leading)
        .filter(|i| *i < params.len())
        .or_else(|| params.iter().position(|p| p.name == transform.arg));
    let Some(index) = index else {
        tracing::warn!(
            "Transform {}({}) names no logged value",
            transform.func,
            transform.arg
        );
        return;
    };

    b.module_mut().get_or_insert_function(
        &transform.func,
        IrType::i8_ptr(),
        vec![params[index].ty.clone()],
        false,
    );
    let result = b.call(&transform.func, IrType::i8_ptr(), vec![values[index].clone()]);
    params[index].ty = IrType::i8_ptr();
    values[index] = Operand::Value(result);
}
