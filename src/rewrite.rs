//! # Rewrite Driver
//!
//! Instrumentation runs in two passes over a module:
//!
//! 1. **Collection** walks every function read-only and records each point to
//!    instrument by its stable instruction id.
//! 2. **Mutation** replays the records through the [`Instrumenter`]. Nothing
//!    inserted here is ever considered for instrumentation, and no iterator
//!    over the instruction stream is alive while it changes.
//!
//! ## Usage
//!
//! ```ignore
//! use loom_instrument::{Module, RewriteOptions, Rewriter};
//!
//! let mut module = Module::from_json(&std::fs::read_to_string("prog.json")?)?;
//! let result = Rewriter::new(RewriteOptions::default()).run(&mut module)?;
//! if result.changed {
//!     std::fs::write("prog.json", module.to_json()?)?;
//! }
//! ```

use crate::debug_info::DebugInfo;
use crate::instr::{FieldAccess, FnDetails, Instrumenter};
use crate::ir::{Callee, FuncId, InstKind, IrType, Module, Operand, ValueId};
use crate::policy::{Direction, Directions, Policy};
use crate::{Error, ErrorSeverity, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// Policy file used when none is given
pub const DEFAULT_POLICY_FILE: &str = "loom.policy";

/// Rewrite options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Instrumentation policy to load
    pub policy_file: PathBuf,
    /// Refuse to instrument modules without full debug metadata
    pub require_debug_info: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            policy_file: PathBuf::from(DEFAULT_POLICY_FILE),
            require_debug_info: false,
        }
    }
}

/// Outcome of a rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteResult {
    /// Was the module modified at all?
    pub changed: bool,
    /// Instrumented function bodies
    pub functions: usize,
    /// Instrumented call sites
    pub calls: usize,
    /// Instrumented structure field reads
    pub field_reads: usize,
    /// Instrumented structure field writes
    pub field_writes: usize,
    /// Instrumented global variable reads
    pub global_reads: usize,
    /// Instrumented global variable writes
    pub global_writes: usize,
    /// Instrumented plain loads and stores
    pub pointer_insts: usize,
    /// Non-fatal problems encountered along the way
    pub warnings: Vec<String>,
}

/// Loads a policy and applies it to modules
#[derive(Debug, Clone)]
pub struct Rewriter {
    options: RewriteOptions,
}

impl Rewriter {
    pub fn new(options: RewriteOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    /// Load the configured policy and instrument `module`.
    ///
    /// Policy errors abort the run before the module is touched.
    pub fn run(&self, module: &mut Module) -> Result<RewriteResult> {
        let policy = Policy::open(&self.options.policy_file)?;
        self.run_with(module, &policy)
    }

    /// Instrument `module` with an already loaded policy
    pub fn run_with(&self, module: &mut Module, policy: &Policy) -> Result<RewriteResult> {
        if self.options.require_debug_info && !DebugInfo::new(module).module_has_full_debug_info()
        {
            return Err(Error::MissingDebugInfo {
                module: module.name.clone(),
            });
        }
        rewrite(module, policy)
    }
}

/// A function body to instrument
#[derive(Debug)]
struct FunctionPoint {
    func: FuncId,
    directions: Directions,
    details: FnDetails,
}

/// A direct call site to instrument
#[derive(Debug)]
struct CallPoint {
    func: FuncId,
    call: ValueId,
    directions: Directions,
    details: FnDetails,
}

/// A load or store of a structure field
#[derive(Debug)]
struct FieldPoint {
    func: FuncId,
    inst: ValueId,
    access: FieldAccess,
}

/// A load or store of a named global
#[derive(Debug)]
struct GlobalPoint {
    func: FuncId,
    inst: ValueId,
    global: String,
}

/// Everything the collection pass decided, in program order
#[derive(Debug, Default)]
struct Plan {
    functions: Vec<FunctionPoint>,
    calls: Vec<CallPoint>,
    field_reads: Vec<FieldPoint>,
    field_writes: Vec<FieldPoint>,
    global_reads: Vec<GlobalPoint>,
    global_writes: Vec<GlobalPoint>,
    pointer_loads: Vec<(FuncId, ValueId)>,
    pointer_stores: Vec<(FuncId, ValueId)>,
}

/// Instrument `module` according to `policy`
pub fn rewrite(module: &mut Module, policy: &Policy) -> Result<RewriteResult> {
    let mut result = RewriteResult::default();

    if !DebugInfo::new(module).module_has_full_debug_info() {
        let warning = Error::MissingDebugInfo {
            module: module.name.clone(),
        };
        tracing::warn!("{}", warning);
        result.warnings.push(warning.to_string());
    }

    let plan = collect(module, policy);
    tracing::info!(
        "Collected {} functions, {} calls, {} field reads, {} field writes, {} global reads, {} global writes, {} pointer instructions in '{}'",
        plan.functions.len(),
        plan.calls.len(),
        plan.field_reads.len(),
        plan.field_writes.len(),
        plan.global_reads.len(),
        plan.global_writes.len(),
        plan.pointer_loads.len() + plan.pointer_stores.len(),
        module.name
    );

    apply(module, policy, plan, &mut result)?;

    tracing::info!(
        "Instrumentation of '{}' {}",
        module.name,
        if result.changed { "modified the module" } else { "made no changes" }
    );
    Ok(result)
}

/// Pass 1: decide every instrumentation point without touching the module
fn collect(module: &Module, policy: &Policy) -> Plan {
    let debug = DebugInfo::new(module);
    let mut plan = Plan::default();
    let everything = [Direction::In, Direction::Out];

    for func in module.function_ids() {
        let function = module.func(func);
        if function.is_declaration() {
            continue;
        }

        let directions = if policy.instrument_all() {
            everything.to_vec()
        } else {
            policy.fn_hooks(function)
        };
        if !directions.is_empty() {
            tracing::debug!("Function {}: {:?}", function.name, directions);
            plan.functions.push(FunctionPoint {
                func,
                directions,
                details: FnDetails::from_policy(policy, module, func),
            });
        }

        let mut claimed = HashSet::new();

        for inst in function.instructions() {
            match &inst.kind {
                InstKind::FieldAddr {
                    source_ty: IrType::Struct(type_name),
                    indices,
                    ..
                } => {
                    let Some(ordinal) = field_ordinal(indices) else {
                        continue;
                    };
                    let Some(st) = module.struct_type(type_name) else {
                        continue;
                    };
                    if !policy.struct_type_matters(st) {
                        continue;
                    }

                    let field_name = debug.field_name(type_name, ordinal);
                    let hook_reads = policy.field_read_hook(st, &field_name);
                    let hook_writes = policy.field_write_hook(st, &field_name);
                    if !hook_reads && !hook_writes {
                        continue;
                    }

                    let access = FieldAccess {
                        field_addr: inst.id,
                        struct_name: type_name
                            .strip_prefix("struct.")
                            .unwrap_or(type_name)
                            .to_string(),
                        field_name,
                    };
                    let address = Operand::Value(inst.id);
                    for user in function.users(inst.id) {
                        match &user.kind {
                            InstKind::Load { ptr, .. } if hook_reads && *ptr == address => {
                                tracing::debug!(
                                    "Field read {}.{} in {}",
                                    access.struct_name,
                                    access.field_name,
                                    function.name
                                );
                                claimed.insert(user.id);
                                plan.field_reads.push(FieldPoint {
                                    func,
                                    inst: user.id,
                                    access: access.clone(),
                                });
                            }
                            InstKind::Store { ptr, .. } if hook_writes && *ptr == address => {
                                tracing::debug!(
                                    "Field write {}.{} in {}",
                                    access.struct_name,
                                    access.field_name,
                                    function.name
                                );
                                claimed.insert(user.id);
                                plan.field_writes.push(FieldPoint {
                                    func,
                                    inst: user.id,
                                    access: access.clone(),
                                });
                            }
                            _ => {}
                        }
                    }
                }

                InstKind::Call {
                    callee: Callee::Direct(target),
                    ..
                } => {
                    let target_fn = module.function(target);
                    let directions = if policy.instrument_all() {
                        everything.to_vec()
                    } else {
                        target_fn
                            .map(|id| policy.call_hooks(module.func(id)))
                            .unwrap_or_default()
                    };
                    if directions.is_empty() {
                        continue;
                    }
                    tracing::debug!("Call to {} in {}: {:?}", target, function.name, directions);
                    plan.calls.push(CallPoint {
                        func,
                        call: inst.id,
                        directions,
                        details: target_fn
                            .map(|id| FnDetails::from_policy(policy, module, id))
                            .unwrap_or_default(),
                    });
                }

                InstKind::Load {
                    ptr: Operand::Global(name),
                    ..
                } => {
                    if module.global(name).is_some_and(|g| policy.global_read_hook(g)) {
                        tracing::debug!("Global read {} in {}", name, function.name);
                        claimed.insert(inst.id);
                        plan.global_reads.push(GlobalPoint {
                            func,
                            inst: inst.id,
                            global: name.clone(),
                        });
                    }
                }

                InstKind::Store {
                    ptr: Operand::Global(name),
                    ..
                } => {
                    if module.global(name).is_some_and(|g| policy.global_write_hook(g)) {
                        tracing::debug!("Global write {} in {}", name, function.name);
                        claimed.insert(inst.id);
                        plan.global_writes.push(GlobalPoint {
                            func,
                            inst: inst.id,
                            global: name.clone(),
                        });
                    }
                }

                _ => {}
            }
        }

        if policy.instrument_pointer_insts() {
            for inst in function.instructions() {
                if claimed.contains(&inst.id) {
                    continue;
                }
                match inst.kind {
                    InstKind::Load { .. } => plan.pointer_loads.push((func, inst.id)),
                    InstKind::Store { .. } => plan.pointer_stores.push((func, inst.id)),
                    _ => {}
                }
            }
        }
    }

    plan
}

/// Ordinal of a single-level, statically indexed field access
/// (`[0, field]`); anything else is not a field access we handle
fn field_ordinal(indices: &[Operand]) -> Option<usize> {
    match indices {
        [first, field] => {
            first.as_const_int()?;
            usize::try_from(field.as_const_int()?).ok()
        }
        _ => None,
    }
}

/// Pass 2: replay the plan
fn apply(module: &mut Module, policy: &Policy, plan: Plan, result: &mut RewriteResult) -> Result<()> {
    let instr = Instrumenter::from_policy(policy);
    let mut changed = false;

    for point in &plan.functions {
        let outcome =
            instr.instrument_function(module, point.func, &point.directions, &point.details);
        record(outcome, &mut result.functions, &mut changed, &mut result.warnings)?;
    }

    for point in &plan.calls {
        let outcome = instr.instrument_call(
            module,
            point.func,
            point.call,
            &point.directions,
            &point.details,
        );
        record(outcome, &mut result.calls, &mut changed, &mut result.warnings)?;
    }

    for point in &plan.field_reads {
        let outcome = instr.instrument_field_read(module, point.func, point.inst, &point.access);
        record(outcome, &mut result.field_reads, &mut changed, &mut result.warnings)?;
    }

    for point in &plan.field_writes {
        let outcome = instr.instrument_field_write(module, point.func, point.inst, &point.access);
        record(outcome, &mut result.field_writes, &mut changed, &mut result.warnings)?;
    }

    for point in &plan.global_reads {
        let outcome = instr.instrument_global_read(module, point.func, point.inst, &point.global);
        record(outcome, &mut result.global_reads, &mut changed, &mut result.warnings)?;
    }

    for point in &plan.global_writes {
        let outcome = instr.instrument_global_write(module, point.func, point.inst, &point.global);
        record(outcome, &mut result.global_writes, &mut changed, &mut result.warnings)?;
    }

    for &(func, load) in &plan.pointer_loads {
        let outcome = instr.instrument_pointer_load(module, func, load);
        record(outcome, &mut result.pointer_insts, &mut changed, &mut result.warnings)?;
    }

    for &(func, store) in &plan.pointer_stores {
        let outcome = instr.instrument_pointer_store(module, func, store);
        record(outcome, &mut result.pointer_insts, &mut changed, &mut result.warnings)?;
    }

    result.changed = changed;
    Ok(())
}

/// Fold one application into the totals; warnings are kept, fatal errors stop the run
fn record(
    outcome: Result<bool>,
    count: &mut usize,
    changed: &mut bool,
    warnings: &mut Vec<String>,
) -> Result<()> {
    match outcome {
        Ok(modified) => {
            if modified {
                *count += 1;
            }
            *changed |= modified;
            Ok(())
        }
        Err(err) if err.classify() == ErrorSeverity::Warning => {
            tracing::warn!("{}", err);
            warnings.push(err.to_string());
            Ok(())
        }
        Err(err) => Err(err),
    }
}
