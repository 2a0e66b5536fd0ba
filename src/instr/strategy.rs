//! Placement of generated instrumentation: shared callout functions or
//! inline code at every site.

use crate::ir::{FuncId, Function, InstKind, IrBuilder, IrType, Module, Operand};
use crate::logger::{adapt_arguments, Logger, Parameter, TraceRecord};
use crate::policy::{Policy, Strategy};

/// Terminator of every emitted record
const RECORD_SUFFIX: &str = "\n";

/// Identity and shape of one hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    /// Generated symbol name (deterministic, from the policy's hook prefix)
    pub name: String,
    /// Human-readable prefix of the emitted record
    pub description: String,
    /// Names and types of the logged values
    pub params: Vec<Parameter>,
}

/// Emits hooks with a fixed strategy and set of loggers
#[derive(Debug)]
pub struct InstrStrategy {
    kind: Strategy,
    loggers: Vec<Box<dyn Logger>>,
    use_block_structure: bool,
}

impl InstrStrategy {
    pub fn new(kind: Strategy, use_block_structure: bool) -> Self {
        Self {
            kind,
            loggers: Vec::new(),
            use_block_structure,
        }
    }

    /// Strategy and loggers as selected by `policy`
    pub fn from_policy(policy: &Policy) -> Self {
        let mut strategy = Self::new(policy.strategy(), policy.use_block_structure());
        for logger in policy.loggers() {
            strategy.add_logger(logger);
        }
        strategy
    }

    pub fn add_logger(&mut self, logger: Box<dyn Logger>) {
        self.loggers.push(logger);
    }

    pub fn kind(&self) -> Strategy {
        self.kind
    }

    pub fn loggers(&self) -> &[Box<dyn Logger>] {
        &self.loggers
    }

    /// Instrument the builder's cursor with `hook`, logging `values`.
    /// Returns whether anything was inserted.
    pub fn instrument(&self, b: &mut IrBuilder, hook: &HookSpec, values: &[Operand]) -> bool {
        match self.kind {
            Strategy::Callout => self.callout(b, hook, values),
            Strategy::Inline => self.inline(b, hook, values),
        }
    }

    fn callout(&self, b: &mut IrBuilder, hook: &HookSpec, values: &[Operand]) -> bool {
        let hook = fitting_hook(b.module(), hook);
        self.define_hook(b.module_mut(), &hook);
        if self.use_block_structure {
            b.isolate_block(&hook.name);
        }
        b.call(&hook.name, IrType::Void, values.to_vec());
        true
    }

    fn inline(&self, b: &mut IrBuilder, hook: &HookSpec, values: &[Operand]) -> bool {
        if self.loggers.is_empty() {
            return false;
        }
        if self.use_block_structure {
            b.isolate_block(&hook.name);
        }
        self.emit(b, hook, values)
    }

    /// Adapt the values once, then hand them to every logger
    fn emit(&self, b: &mut IrBuilder, hook: &HookSpec, values: &[Operand]) -> bool {
        let (params, values) = adapt_arguments(b, &hook.params, values);
        let record = TraceRecord {
            name: &hook.name,
            prefix: &hook.description,
            params: &params,
            values: &values,
            suffix: RECORD_SUFFIX,
        };
        let mut changed = false;
        for logger in &self.loggers {
            changed |= logger.log(b, &record);
        }
        changed
    }

    /// Create the callout function for `hook` unless it is already defined.
    /// A function already named `hook.name` must have the hook's shape.
    fn define_hook(&self, module: &mut Module, hook: &HookSpec) -> FuncId {
        let id = match module.function(&hook.name) {
            Some(id) if !module.func(id).is_declaration() => return id,
            Some(id) => id,
            None => {
                let params = hook
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), p.ty.clone()))
                    .collect();
                module.add_function(Function::declare(&hook.name, IrType::Void, params, false))
            }
        };
        tracing::debug!("Defining hook function {}", hook.name);

        let function = module.func_mut(id);
        function.blocks.push(crate::ir::BasicBlock::new("entry"));
        let args: Vec<Operand> = function
            .params
            .iter()
            .map(|p| Operand::Value(p.id))
            .collect();

        let mut b = IrBuilder::at_end(module, id, 0);
        self.emit(&mut b, hook, &args);
        b.insert(InstKind::Ret { value: None });
        id
    }
}

/// `hook`, renamed when its name belongs to a function of another shape.
///
/// Sites that log different types under one hook name (pointer loads of
/// `i32` and `double`, calls to a variadic callee) each get a function whose
/// parameters match their arguments: `<name>_<types>`, then `<name>_<types>_N`.
fn fitting_hook(module: &Module, hook: &HookSpec) -> HookSpec {
    let fits = |name: &str| {
        module
            .function(name)
            .map_or(true, |id| has_shape(module.func(id), &hook.params))
    };
    if fits(&hook.name) {
        return hook.clone();
    }

    let shaped = format!("{}_{}", hook.name, shape_suffix(&hook.params));
    let name = std::iter::once(shaped.clone())
        .chain((1..).map(|n| format!("{}_{}", shaped, n)))
        .find(|candidate| fits(candidate))
        .unwrap_or(shaped);
    HookSpec {
        name,
        ..hook.clone()
    }
}

fn has_shape(function: &Function, params: &[Parameter]) -> bool {
    function.ret_ty.is_void()
        && !function.var_args
        && function.params.len() == params.len()
        && function.params.iter().zip(params).all(|(f, p)| f.ty == p.ty)
}

/// Parameter types in order, e.g. `i32p_f64`
fn shape_suffix(params: &[Parameter]) -> String {
    if params.is_empty() {
        return "void".to_string();
    }
    params
        .iter()
        .map(|p| type_tag(&p.ty))
        .collect::<Vec<_>>()
        .join("_")
}

fn type_tag(ty: &IrType) -> String {
    match ty {
        IrType::Void => "void".to_string(),
        IrType::Int(bits) => format!("i{}", bits),
        IrType::Float => "f32".to_string(),
        IrType::Double => "f64".to_string(),
        IrType::Ptr(inner) => format!("{}p", type_tag(inner)),
        IrType::Struct(name) => name.replace('.', "_"),
    }
}
