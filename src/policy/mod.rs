//! # Instrumentation Policy
//!
//! A policy tells the rewriter what to instrument and in which direction
//! (call vs. return, read vs. write), and how: callout or inline, which
//! loggers, which serializer, what to call the generated hooks.
//!
//! Every rule list is ordered and first-match-wins: the first rule whose
//! pattern matches a symbol decides the answer for that symbol.

mod file;
mod matcher;

pub use file::{
    FieldInstrumentation, FnInstrumentation, GlobalInstrumentation, Metadata, PolicyData,
    StructInstrumentation, Transform, DEFAULT_HOOK_PREFIX,
};
pub use matcher::{matches, NamePattern};

use crate::debug_info::base_file_name;
use crate::ir::{Function, GlobalVariable, StructType};
use crate::logger::{self, DTraceLogger, KTraceLogger, Logger};
use crate::serializer::{NullSerializer, NvSerializer, Serializer};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hook direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Function entry / call start
    #[serde(rename = "entry")]
    In,
    /// Function exit / call return
    #[serde(rename = "exit")]
    Out,
}

/// Requested directions, in policy order
pub type Directions = Vec<Direction>;

/// An operation on a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

/// Where generated instrumentation logic lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One generated hook function per hook identity, called from each site
    #[default]
    Callout,
    /// Logging code duplicated at each site
    Inline,
}

/// Simple (non-serializing) logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogType {
    #[default]
    #[serde(rename = "none")]
    None,
    /// `printf(3)`
    #[serde(rename = "printf")]
    PlainText,
    /// `xo_emit(3)` (libxo)
    #[serde(rename = "xo")]
    Structured,
}

/// ktrace(2) / utrace(2) sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KTraceTarget {
    #[default]
    #[serde(rename = "none")]
    None,
    /// In-kernel `ktrstruct`
    #[serde(rename = "kernel")]
    Kernel,
    /// Userspace `utrace`
    #[serde(rename = "utrace")]
    Userspace,
}

/// DTrace probe sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DTraceTarget {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "userspace")]
    Userspace,
}

/// Record serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerializationType {
    #[default]
    #[serde(rename = "none")]
    None,
    /// libnv name/value lists
    #[serde(rename = "nv")]
    NameValue,
}

/// IR name marker for C structures
const STRUCT_PREFIX: &str = "struct.";

/// A loaded, immutable instrumentation policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    data: PolicyData,
}

impl Policy {
    pub fn new(data: PolicyData) -> Self {
        Self { data }
    }

    /// Load a policy file; fails if it is missing or malformed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = PolicyData::open(path)?;
        tracing::debug!(
            "Loaded policy {}: {} function, {} structure, {} global rules",
            path.display(),
            data.functions.len(),
            data.structures.len(),
            data.globals.len()
        );
        Ok(Self::new(data))
    }

    /// Parse an in-memory policy document
    pub fn from_yaml(text: &str) -> Result<Self> {
        PolicyData::from_yaml(text).map(Self::new)
    }

    pub fn to_yaml(&self) -> Result<String> {
        self.data.to_yaml()
    }

    /// The policy as loaded
    pub fn data(&self) -> &PolicyData {
        &self.data
    }

    pub fn strategy(&self) -> Strategy {
        self.data.strategy
    }

    pub fn logging(&self) -> LogType {
        self.data.logging
    }

    pub fn ktrace(&self) -> KTraceTarget {
        self.data.ktrace
    }

    pub fn dtrace(&self) -> DTraceTarget {
        self.data.dtrace
    }

    pub fn serialization(&self) -> SerializationType {
        self.data.serialization
    }

    pub fn hook_prefix(&self) -> &str {
        &self.data.hook_prefix
    }

    pub fn use_block_structure(&self) -> bool {
        self.data.block_structure
    }

    pub fn instrument_all(&self) -> bool {
        self.data.everything
    }

    pub fn instrument_pointer_insts(&self) -> bool {
        self.data.pointer_insts
    }

    /// First function rule whose name pattern matches
    fn function_rule(&self, name: &str) -> Option<&FnInstrumentation> {
        self.data.functions.iter().find(|f| f.name.matches(name))
    }

    /// In which directions should calls to `function` be instrumented?
    pub fn call_hooks(&self, function: &Function) -> Directions {
        self.function_rule(&function.name)
            .map(|rule| rule.call.clone())
            .unwrap_or_default()
    }

    /// In which directions (prologue / return points) should `function` be
    /// instrumented? Rules with a `within-file` pattern only apply when it
    /// matches the basename of the function's source file.
    pub fn fn_hooks(&self, function: &Function) -> Directions {
        let file = function
            .subprogram
            .as_ref()
            .map(|sp| base_file_name(&sp.file))
            .unwrap_or("");
        self.body_hooks(&function.name, file)
    }

    /// `fn_hooks` for a function name and source file basename
    pub fn body_hooks(&self, name: &str, base_file_name: &str) -> Directions {
        self.data
            .functions
            .iter()
            .filter(|rule| rule.name.matches(name))
            .find(|rule| match &rule.file {
                Some(file) => file.matches(base_file_name),
                None => true,
            })
            .map(|rule| rule.body.clone())
            .unwrap_or_default()
    }

    /// Metadata of the first rule matching `function`
    pub fn instr_metadata(&self, function: &Function) -> Metadata {
        self.function_rule(&function.name)
            .map(|rule| rule.metadata.clone())
            .unwrap_or_default()
    }

    /// Value transforms of the first rule matching `function`
    pub fn instr_transforms(&self, function: &Function) -> Vec<Transform> {
        self.function_rule(&function.name)
            .map(|rule| rule.transforms.clone())
            .unwrap_or_default()
    }

    /// Unqualified name of a C structure type, if it is one
    fn struct_name(ty: &StructType) -> Option<&str> {
        ty.name.as_deref()?.strip_prefix(STRUCT_PREFIX)
    }

    /// First structure rule for `ty`
    fn struct_rule(&self, ty: &StructType) -> Option<&StructInstrumentation> {
        let name = Self::struct_name(ty)?;
        self.data.structures.iter().find(|s| s.name.matches(name))
    }

    /// Does any structure rule apply to this type? Unions and literal
    /// structs never match.
    pub fn struct_type_matters(&self, ty: &StructType) -> bool {
        self.struct_rule(ty).is_some()
    }

    fn field_operations(&self, ty: &StructType, field: &str) -> Option<&[Operation]> {
        let rule = self.struct_rule(ty)?;
        rule.fields
            .iter()
            .find(|f| f.name.matches(field))
            .map(|f| f.operations.as_slice())
    }

    /// Should a read from `field` of `ty` be instrumented?
    pub fn field_read_hook(&self, ty: &StructType, field: &str) -> bool {
        self.field_operations(ty, field)
            .is_some_and(|ops| ops.contains(&Operation::Read))
    }

    /// Should a write to `field` of `ty` be instrumented?
    pub fn field_write_hook(&self, ty: &StructType, field: &str) -> bool {
        self.field_operations(ty, field)
            .is_some_and(|ops| ops.contains(&Operation::Write))
    }

    fn global_operations(&self, global: &GlobalVariable) -> Option<&[Operation]> {
        if global.name.is_empty() {
            return None;
        }
        self.data
            .globals
            .iter()
            .find(|g| g.name == global.name)
            .map(|g| g.operations.as_slice())
    }

    /// Is there a rule for this global (exact name)?
    pub fn global_value_matters(&self, global: &GlobalVariable) -> bool {
        self.global_operations(global).is_some()
    }

    pub fn global_read_hook(&self, global: &GlobalVariable) -> bool {
        self.global_operations(global)
            .is_some_and(|ops| ops.contains(&Operation::Read))
    }

    pub fn global_write_hook(&self, global: &GlobalVariable) -> bool {
        self.global_operations(global)
            .is_some_and(|ops| ops.contains(&Operation::Write))
    }

    /// Name an instrumentation function: the hook prefix and `components`
    /// joined with `_`.
    pub fn instr_name<S: AsRef<str>>(&self, components: &[S]) -> String {
        std::iter::once(self.data.hook_prefix.as_str())
            .chain(components.iter().map(|c| c.as_ref()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Serializer selected by the policy
    pub fn serializer(&self) -> Box<dyn Serializer> {
        match self.data.serialization {
            SerializationType::NameValue => Box::new(NvSerializer),
            SerializationType::None => Box::new(NullSerializer),
        }
    }

    /// Loggers selected by the policy: simple logging, then ktrace, then DTrace
    pub fn loggers(&self) -> Vec<Box<dyn Logger>> {
        let mut loggers: Vec<Box<dyn Logger>> = Vec::new();

        if let Some(simple) = logger::create(self.data.logging) {
            loggers.push(simple);
        }

        if self.data.ktrace != KTraceTarget::None {
            // ktrace records are always self-describing
            let serializer: Box<dyn Serializer> = match self.data.serialization {
                SerializationType::None => Box::new(NvSerializer),
                SerializationType::NameValue => self.serializer(),
            };
            loggers.push(Box::new(KTraceLogger::new(self.data.ktrace, serializer)));
        }

        if self.data.dtrace == DTraceTarget::Userspace {
            loggers.push(Box::new(DTraceLogger));
        }

        loggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, IrType};

    fn function(name: &str, file: Option<&str>) -> Function {
        let mut fb = FunctionBuilder::new(name, IrType::Void, &[]);
        fb.ret(None);
        match file {
            Some(file) => fb.subprogram(file, 1).build(),
            None => fb.build(),
        }
    }

    fn struct_type(name: &str) -> StructType {
        StructType::named(name, vec![IrType::i32()])
    }

    #[test]
    fn test_call_hooks_first_match_wins() {
        let policy = Policy::from_yaml(
            r#"
functions:
  - name: alloc
    caller: [ entry ]
  - name: ^alloc$
    caller: [ entry, exit ]
"#,
        )
        .unwrap();
        assert_eq!(
            policy.call_hooks(&function("alloc", None)),
            vec![Direction::In]
        );
        assert!(policy.call_hooks(&function("free", None)).is_empty());
    }

    #[test]
    fn test_fn_hooks_within_file() {
        let constrained = Policy::from_yaml(
            "functions:\n  - name: foo\n    within-file: 'a\\.c'\n    callee: [ entry ]\n",
        )
        .unwrap();
        let unconstrained =
            Policy::from_yaml("functions:\n  - name: foo\n    callee: [ entry ]\n").unwrap();

        let in_b = function("foo", Some("/src/b.c"));
        let in_a = function("foo", Some("/src/a.c"));
        assert!(constrained.fn_hooks(&in_b).is_empty());
        assert_eq!(constrained.fn_hooks(&in_a), vec![Direction::In]);
        assert_eq!(unconstrained.fn_hooks(&in_b), vec![Direction::In]);
        assert_eq!(
            unconstrained.fn_hooks(&function("foo", None)),
            vec![Direction::In]
        );
    }

    #[test]
    fn test_fn_hooks_skips_to_next_rule_on_file_mismatch() {
        let policy = Policy::from_yaml(
            r#"
functions:
  - name: foo
    within-file: 'a\.c'
    callee: [ entry ]
  - name: foo
    callee: [ exit ]
"#,
        )
        .unwrap();
        assert_eq!(
            policy.fn_hooks(&function("foo", Some("b.c"))),
            vec![Direction::Out]
        );
    }

    #[test]
    fn test_struct_rules() {
        let policy = Policy::from_yaml(
            r#"
structures:
  - name: test_struct
    fields:
      - name: test_int
        operations: [ read ]
  - name: test_struct
    fields:
      - name: test_int
        operations: [ write ]
"#,
        )
        .unwrap();
        let ty = struct_type("struct.test_struct");
        assert!(policy.struct_type_matters(&ty));
        assert!(policy.field_read_hook(&ty, "test_int"));
        // only the first matching struct rule is consulted
        assert!(!policy.field_write_hook(&ty, "test_int"));
        assert!(!policy.field_read_hook(&ty, "other"));

        assert!(!policy.struct_type_matters(&struct_type("union.test_struct")));
        assert!(!policy.struct_type_matters(&StructType {
            name: None,
            fields: vec![]
        }));
    }

    #[test]
    fn test_global_rules_exact_name() {
        let policy =
            Policy::from_yaml("globals:\n  - name: count\n    operations: [ write ]\n").unwrap();
        let global = |name: &str| GlobalVariable {
            name: name.into(),
            ty: IrType::i32(),
            initializer: None,
            constant: false,
        };
        assert!(policy.global_value_matters(&global("count")));
        assert!(!policy.global_value_matters(&global("counter")));
        assert!(policy.global_write_hook(&global("count")));
        assert!(!policy.global_read_hook(&global("count")));
    }

    #[test]
    fn test_instr_name() {
        let policy = Policy::from_yaml("").unwrap();
        assert_eq!(policy.instr_name(&["x", "entry"]), "__loom_x_entry");

        let policy = Policy::from_yaml("hook_prefix: __test\n").unwrap();
        assert_eq!(policy.instr_name(&["call", "alloc"]), "__test_call_alloc");
    }

    #[test]
    fn test_loggers_from_policy() {
        let policy = Policy::from_yaml("logging: printf\nktrace: utrace\ndtrace: userspace\n")
            .unwrap();
        let names: Vec<&str> = policy.loggers().iter().map(|l| l.function_name()).collect();
        assert_eq!(names, vec!["printf", "utrace", "dt_probe"]);

        assert!(Policy::from_yaml("").unwrap().loggers().is_empty());
    }
}
