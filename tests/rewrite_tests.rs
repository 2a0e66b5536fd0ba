//! End-to-end tests: build a module, load a policy, rewrite, inspect the IR.

use loom_instrument::ir::{
    Callee, Constant, DiCompositeType, FuncId, Function, GlobalVariable, InstKind, StructType,
    ValueId,
};
use loom_instrument::{rewrite, FunctionBuilder, IrType, Module, Operand, Policy};

/// `alloc(size)` calling `malloc`, and `main` calling `alloc(4)`
fn alloc_module() -> (Module, ValueId) {
    let mut module = Module::new("alloc.c");

    let mut alloc = FunctionBuilder::new("alloc", IrType::i8_ptr(), &[("size", IrType::i32())]);
    let size = alloc.param(0);
    let ptr = alloc.call("malloc", vec![size], IrType::i8_ptr());
    alloc.ret(Some(ptr));
    module.add_function(alloc.subprogram("/src/alloc.c", 10).build());

    let mut main = FunctionBuilder::new("main", IrType::i32(), &[]);
    let call = main
        .call("alloc", vec![Operand::i32(4)], IrType::i8_ptr())
        .as_value()
        .unwrap();
    main.ret(Some(Operand::i32(0)));
    module.add_function(main.subprogram("/src/main.c", 1).build());

    (module, call)
}

fn policy(yaml: &str) -> Policy {
    Policy::from_yaml(yaml).unwrap()
}

fn called(module: &Module, func: FuncId) -> Vec<String> {
    module
        .func(func)
        .instructions()
        .filter_map(|i| i.called_function().map(str::to_string))
        .collect()
}

fn strings(module: &Module) -> Vec<String> {
    module
        .globals
        .iter()
        .filter_map(|g| match &g.initializer {
            Some(Constant::CString(s)) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// The instruction immediately preceding `id` in its block
fn predecessor(module: &Module, func: FuncId, id: ValueId) -> Option<String> {
    let function = module.func(func);
    let (block, index) = function.locate(id)?;
    let prev = function.blocks[block].instructions.get(index.checked_sub(1)?)?;
    prev.called_function().map(str::to_string)
}

/// Checks that every call to a generated hook passes arguments of exactly the
/// hook's parameter types, and returns how many calls were checked
fn assert_hook_signatures_match(module: &Module) -> usize {
    let mut checked = 0;
    for func in module.function_ids() {
        for inst in module.func(func).instructions() {
            let InstKind::Call {
                callee: Callee::Direct(name),
                args,
                ..
            } = &inst.kind
            else {
                continue;
            };
            if !name.starts_with("__loom_") {
                continue;
            }
            let hook = module.function(name).unwrap();
            let expected: Vec<IrType> = module.func(hook).params.iter().map(|p| p.ty.clone()).collect();
            let actual: Vec<IrType> = args
                .iter()
                .map(|a| module.operand_type(func, a).unwrap())
                .collect();
            assert_eq!(actual, expected, "call to {} in {}", name, module.func(func).name);
            checked += 1;
        }
    }
    checked
}

const ALLOC_POLICY: &str = r#"
logging: printf
functions:
  - name: ^alloc$
    caller: [ entry ]
    callee: [ entry, exit ]
"#;

#[test]
fn test_alloc_callout() {
    let (mut module, call) = alloc_module();
    let result = rewrite(&mut module, &policy(ALLOC_POLICY)).unwrap();

    assert!(result.changed);
    assert_eq!(result.functions, 1);
    assert_eq!(result.calls, 1);

    let alloc = module.function("alloc").unwrap();
    assert_eq!(
        called(&module, alloc),
        vec!["__loom_enter_alloc", "malloc", "__loom_leave_alloc"]
    );

    let main = module.function("main").unwrap();
    assert_eq!(
        predecessor(&module, main, call),
        Some("__loom_call_alloc".to_string())
    );

    let enter = module.function("__loom_enter_alloc").unwrap();
    assert_eq!(called(&module, enter), vec!["printf"]);
    assert!(strings(&module).contains(&"enter alloc: %d\n".to_string()));
    assert!(strings(&module).contains(&"leave alloc: \"%s\" %d\n".to_string()));
    assert!(module.verify().is_ok());
}

#[test]
fn test_alloc_inline() {
    let (mut module, call) = alloc_module();
    let yaml = format!("strategy: inline\n{}", ALLOC_POLICY);
    let result = rewrite(&mut module, &policy(&yaml)).unwrap();

    assert!(result.changed);
    assert!(module.function("__loom_enter_alloc").is_none());

    let alloc = module.function("alloc").unwrap();
    assert_eq!(called(&module, alloc), vec!["printf", "malloc", "printf"]);

    let main = module.function("main").unwrap();
    assert_eq!(predecessor(&module, main, call), Some("printf".to_string()));
    assert!(strings(&module).contains(&"call alloc: %d\n".to_string()));
}

#[test]
fn test_empty_policy_changes_nothing() {
    let (mut module, _) = alloc_module();
    let before = module.to_json().unwrap();

    let empty = policy("functions: []\nstructures: []\nglobals: []\neverything: false\n");
    let result = rewrite(&mut module, &empty).unwrap();

    assert!(!result.changed);
    assert_eq!(module.to_json().unwrap(), before);
}

#[test]
fn test_rewrite_is_deterministic() {
    let (mut first, _) = alloc_module();
    let (mut second, _) = alloc_module();
    let policy = policy(ALLOC_POLICY);
    rewrite(&mut first, &policy).unwrap();
    rewrite(&mut second, &policy).unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_instrumented_module_survives_json() {
    let (mut module, _) = alloc_module();
    rewrite(&mut module, &policy(ALLOC_POLICY)).unwrap();
    let json = module.to_json().unwrap();
    assert_eq!(Module::from_json(&json).unwrap(), module);
}

#[test]
fn test_indirect_calls_are_never_instrumented() {
    let mut module = Module::new("m");
    let mut fb = FunctionBuilder::new(
        "dispatch",
        IrType::Void,
        &[("handler", IrType::i8_ptr())],
    );
    let handler = fb.param(0);
    fb.call_indirect(handler, vec![Operand::i32(1)], IrType::Void);
    fb.ret(None);
    module.add_function(fb.build());
    let before = module.clone();

    let wildcard = policy("logging: printf\nfunctions:\n  - name: .*\n    caller: [ entry, exit ]\n");
    let result = rewrite(&mut module, &wildcard).unwrap();

    assert!(!result.changed);
    assert_eq!(result.calls, 0);
    assert_eq!(module, before);
}

fn struct_module() -> Module {
    let mut module = Module::new("s.c");
    module.structs.push(StructType::named(
        "struct.test_struct",
        vec![IrType::i32(), IrType::i8_ptr()],
    ));
    module.structs.push(StructType::named(
        "struct.outer",
        vec![IrType::Struct("struct.test_struct".into())],
    ));
    module.debug_types.push(DiCompositeType {
        type_name: "struct.test_struct".into(),
        fields: vec!["test_int".into(), "test_charp".into()],
    });
    module
}

const STRUCT_POLICY: &str = r#"
logging: printf
structures:
  - name: .
    fields:
      - name: .
        operations: [ read, write ]
"#;

#[test]
fn test_field_reads_and_writes() {
    let mut module = struct_module();
    let mut fb = FunctionBuilder::new(
        "touch",
        IrType::i32(),
        &[("s", IrType::struct_ptr("struct.test_struct"))],
    );
    let s = fb.param(0);
    let int_addr = fb.field_addr("struct.test_struct", s.clone(), 0);
    let value = fb.load(IrType::i32(), int_addr.clone());
    fb.store(Operand::i32(7), int_addr);
    fb.ret(Some(value));
    let f = module.add_function(fb.subprogram("s.c", 3).build());

    let result = rewrite(&mut module, &policy(STRUCT_POLICY)).unwrap();
    assert!(result.changed);
    assert_eq!(result.field_reads, 1);
    assert_eq!(result.field_writes, 1);
    assert_eq!(
        called(&module, f),
        vec![
            "__loom_load_test_struct_test_int",
            "__loom_store_test_struct_test_int"
        ]
    );
    assert!(strings(&module).contains(&"test_int".to_string()));
}

#[test]
fn test_only_simple_field_addresses_are_collected() {
    let mut module = struct_module();
    let mut fb = FunctionBuilder::new(
        "nested",
        IrType::Void,
        &[
            ("o", IrType::struct_ptr("struct.outer")),
            ("s", IrType::struct_ptr("struct.test_struct")),
            ("i", IrType::i32()),
        ],
    );
    let (o, s, i) = (fb.param(0), fb.param(1), fb.param(2));
    // &o->inner.test_int: three indices
    let deep = fb.gep(
        IrType::Struct("struct.outer".into()),
        o,
        vec![Operand::i32(0), Operand::i32(0), Operand::i32(0)],
    );
    fb.load(IrType::i32(), deep);
    // field chosen at run time
    let dynamic = fb.gep(
        IrType::Struct("struct.test_struct".into()),
        s,
        vec![Operand::i32(0), i],
    );
    fb.store(Operand::i32(1), dynamic);
    fb.ret(None);
    module.add_function(fb.build());
    let before = module.clone();

    let result = rewrite(&mut module, &policy(STRUCT_POLICY)).unwrap();
    assert!(!result.changed);
    assert_eq!(result.field_reads + result.field_writes, 0);
    assert_eq!(module, before);
}

#[test]
fn test_global_reads_and_writes() {
    let mut module = Module::new("g.c");
    module.globals.push(GlobalVariable {
        name: "count".into(),
        ty: IrType::i32(),
        initializer: Some(Constant::Int(0)),
        constant: false,
    });
    module.globals.push(GlobalVariable {
        name: "counter".into(),
        ty: IrType::i32(),
        initializer: Some(Constant::Int(0)),
        constant: false,
    });
    let mut fb = FunctionBuilder::new("bump", IrType::Void, &[]);
    let old = fb.load(IrType::i32(), Operand::Global("count".into()));
    fb.store(old, Operand::Global("count".into()));
    fb.store(Operand::i32(0), Operand::Global("counter".into()));
    fb.ret(None);
    let f = module.add_function(fb.build());

    let result = rewrite(
        &mut module,
        &policy("logging: printf\nglobals:\n  - name: count\n    operations: [ read, write ]\n"),
    )
    .unwrap();
    assert_eq!(result.global_reads, 1);
    assert_eq!(result.global_writes, 1);
    assert_eq!(
        called(&module, f),
        vec!["__loom_global_load_count", "__loom_global_store_count"]
    );
    // the enclosing function is passed as context
    assert!(strings(&module).contains(&"bump".to_string()));
}

#[test]
fn test_everything_flag() {
    let (mut module, _) = alloc_module();
    let result = rewrite(&mut module, &policy("everything: true\n")).unwrap();
    assert!(result.changed);
    assert_eq!(result.functions, 2);
    assert_eq!(result.calls, 2);
    assert!(module.function("__loom_enter_main").is_some());
    assert!(module.function("__loom_return_malloc").is_some());
}

#[test]
fn test_pointer_instructions() {
    let mut module = Module::new("p.c");
    let mut fb = FunctionBuilder::new("local", IrType::i32(), &[("x", IrType::i32())]);
    let x = fb.param(0);
    let slot = fb.alloca(IrType::i32());
    fb.store(x, slot.clone());
    let value = fb.load(IrType::i32(), slot);
    fb.ret(Some(value));
    let f = module.add_function(fb.build());

    let result = rewrite(&mut module, &policy("pointerInsts: true\n")).unwrap();
    assert_eq!(result.pointer_insts, 2);
    assert_eq!(
        called(&module, f),
        vec!["__loom_pointer_store", "__loom_pointer_load"]
    );
}

#[test]
fn test_pointer_instructions_of_mixed_types() {
    let mut module = Module::new("p.c");
    let mut fb = FunctionBuilder::new(
        "mix",
        IrType::Double,
        &[("x", IrType::i32()), ("y", IrType::Double)],
    );
    let (x, y) = (fb.param(0), fb.param(1));
    let int_slot = fb.alloca(IrType::i32());
    let double_slot = fb.alloca(IrType::Double);
    fb.store(x, int_slot.clone());
    fb.store(y, double_slot.clone());
    fb.load(IrType::i32(), int_slot);
    let value = fb.load(IrType::Double, double_slot);
    fb.ret(Some(value));
    let f = module.add_function(fb.build());

    let result = rewrite(&mut module, &policy("logging: printf
pointerInsts: true
")).unwrap();
    assert_eq!(result.pointer_insts, 4);
    assert_eq!(
        called(&module, f),
        vec![
            "__loom_pointer_store",
            "__loom_pointer_store_f64p_f64",
            "__loom_pointer_load",
            "__loom_pointer_load_f64p_f64"
        ]
    );
    assert_eq!(assert_hook_signatures_match(&module), 4);
    assert!(module.verify().is_ok());
}

#[test]
fn test_everything_with_variadic_callee() {
    let mut module = Module::new("log.c");
    module.add_function(Function::declare(
        "log",
        IrType::i32(),
        vec![("fmt".into(), IrType::i8_ptr())],
        true,
    ));
    let mut main = FunctionBuilder::new("main", IrType::i32(), &[("argc", IrType::i32())]);
    let argc = main.param(0);
    let fmt = Operand::Null(IrType::i8_ptr());
    main.call("log", vec![fmt.clone()], IrType::i32());
    main.call(
        "log",
        vec![fmt.clone(), argc, Operand::ConstDouble(2.5f64.to_bits())],
        IrType::i32(),
    );
    main.call("log", vec![fmt], IrType::i32());
    main.ret(Some(Operand::i32(0)));
    let f = module.add_function(main.build());

    let result = rewrite(&mut module, &policy("logging: printf
everything: true
")).unwrap();
    assert_eq!(result.functions, 1);
    assert_eq!(result.calls, 3);
    assert_eq!(
        called(&module, f),
        vec![
            "__loom_enter_main",
            "__loom_call_log",
            "log",
            "__loom_return_log",
            "__loom_call_log_i8p_i32_f64",
            "log",
            "__loom_return_log_i32_i8p_i32_f64",
            "__loom_call_log",
            "log",
            "__loom_return_log",
            "__loom_leave_main"
        ]
    );
    assert_eq!(assert_hook_signatures_match(&module), 8);
    assert!(module.verify().is_ok());
}

#[test]
fn test_block_structure() {
    let (mut module, _) = alloc_module();
    let yaml = format!("block_structure: true\n{}", ALLOC_POLICY);
    rewrite(&mut module, &policy(&yaml)).unwrap();

    let main = module.function("main").unwrap();
    let labels: Vec<&str> = module
        .func(main)
        .blocks
        .iter()
        .map(|b| b.label.as_str())
        .collect();
    assert_eq!(
        labels,
        vec!["entry", "__loom_call_alloc.instr", "__loom_call_alloc.cont"]
    );
    assert!(module.verify().is_ok());
}

#[test]
fn test_structured_logging() {
    let (mut module, _) = alloc_module();
    let yaml = ALLOC_POLICY.replace("logging: printf", "logging: xo");
    rewrite(&mut module, &policy(&yaml)).unwrap();

    let enter = module.function("__loom_enter_alloc").unwrap();
    assert_eq!(called(&module, enter), vec!["xo_emit"]);
    assert!(strings(&module).contains(&"enter alloc:{P: }{h:size/%d}\n".to_string()));
}

#[test]
fn test_ktrace_with_nv_records() {
    let (mut module, _) = alloc_module();
    let yaml = r#"
strategy: inline
ktrace: utrace
serialization: nv
functions:
  - name: ^alloc$
    callee: [ entry ]
"#;
    let result = rewrite(&mut module, &policy(yaml)).unwrap();
    assert!(result.changed);

    let alloc = module.function("alloc").unwrap();
    assert_eq!(
        called(&module, alloc),
        vec![
            "nvlist_create",
            "nvlist_add_number",
            "nvlist_pack",
            "nvlist_destroy",
            "utrace",
            "free",
            "malloc"
        ]
    );
}

#[test]
fn test_dtrace_first_slot_names_hook() {
    let (mut module, _) = alloc_module();
    let yaml = "dtrace: userspace\nfunctions:\n  - name: ^alloc$\n    callee: [ entry ]\n";
    rewrite(&mut module, &policy(yaml)).unwrap();

    let enter = module.function("__loom_enter_alloc").unwrap();
    let site = module
        .func(enter)
        .instructions()
        .find(|i| i.called_function() == Some("dt_probe"))
        .unwrap();
    match &site.kind {
        InstKind::Call { args, .. } => {
            assert_eq!(args.len(), 6);
            assert_eq!(args[0], Operand::Function("__loom_enter_alloc".into()));
            assert_eq!(args[5], Operand::Null(IrType::i8_ptr()));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_within_file_uses_debug_info() {
    let (mut module, _) = alloc_module();
    let yaml = "logging: printf\nfunctions:\n  - name: alloc\n    within-file: 'other\\.c'\n    callee: [ entry ]\n";
    let result = rewrite(&mut module, &policy(yaml)).unwrap();
    assert_eq!(result.functions, 0);

    let (mut module, _) = alloc_module();
    let yaml = "logging: printf\nfunctions:\n  - name: alloc\n    within-file: 'alloc\\.c'\n    callee: [ entry ]\n";
    let result = rewrite(&mut module, &policy(yaml)).unwrap();
    assert_eq!(result.functions, 1);
}
