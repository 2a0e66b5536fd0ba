//! The on-disk policy document (YAML).
//!
//! ```yaml
//! strategy: callout
//! logging: printf
//! hook_prefix: __test_hook
//! functions:
//!   - name: ^alloc$
//!     within-file: alloc\.c
//!     caller: [ entry ]
//!     callee: [ entry, exit ]
//! structures:
//!   - name: test_struct
//!     fields:
//!       - name: test_int
//!         operations: [ read, write ]
//! globals:
//!   - name: counter
//!     operations: [ write ]
//! ```

use super::matcher::NamePattern;
use super::{DTraceTarget, Direction, KTraceTarget, LogType, Operation, SerializationType, Strategy};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default prefix for generated hook names
pub const DEFAULT_HOOK_PREFIX: &str = "__loom";

/// Extra information attached to a function's instrumentation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Metadata {
    /// Human-readable event name (replaces the function name when set)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Numeric event id (0 = unset)
    #[serde(skip_serializing_if = "is_zero")]
    pub id: u32,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.id == 0
    }
}

fn is_zero(id: &u32) -> bool {
    *id == 0
}

/// Substitute `func(arg)` for an argument before it is logged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Transform {
    /// Parameter name, or zero-based position
    pub arg: String,
    /// External transformation function
    #[serde(rename = "fn")]
    pub func: String,
}

/// How to instrument a function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FnInstrumentation {
    /// Function name pattern (as named in the IR, possibly mangled)
    pub name: NamePattern,
    /// Source file basename pattern
    #[serde(rename = "within-file", skip_serializing_if = "Option::is_none")]
    pub file: Option<NamePattern>,
    /// Instrumentation applied at call sites
    #[serde(rename = "caller")]
    pub call: Vec<Direction>,
    /// Instrumentation applied to the body (prologue and return points)
    #[serde(rename = "callee")]
    pub body: Vec<Direction>,
    /// Additional information about the function
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Value transformations applied when logging
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,
}

/// Which operations to instrument on a structure field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldInstrumentation {
    /// Field name pattern
    pub name: NamePattern,
    /// Operations to hook
    pub operations: Vec<Operation>,
}

/// How to instrument fields within a structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructInstrumentation {
    /// Structure name pattern (without the `struct.` marker)
    pub name: NamePattern,
    /// Field rules, first match wins
    pub fields: Vec<FieldInstrumentation>,
}

/// How to instrument a global variable (exact name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalInstrumentation {
    /// Global variable name
    pub name: String,
    /// Operations to hook
    pub operations: Vec<Operation>,
}

/// Everything contained in a policy file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyData {
    /// Callout functions or inline instrumentation
    pub strategy: Strategy,
    /// Simple (non-serializing) logging
    pub logging: LogType,
    /// ktrace/utrace records
    pub ktrace: KTraceTarget,
    /// DTrace probes
    pub dtrace: DTraceTarget,
    /// Record serialization
    pub serialization: SerializationType,
    /// Put instrumentation in its own basic blocks
    pub block_structure: bool,
    /// Prefix of every generated hook name
    pub hook_prefix: String,
    /// Instrument every function and call
    pub everything: bool,
    /// Instrument all loads and stores
    #[serde(rename = "pointerInsts")]
    pub pointer_insts: bool,
    /// Function rules
    pub functions: Vec<FnInstrumentation>,
    /// Structure field rules
    pub structures: Vec<StructInstrumentation>,
    /// Global variable rules
    pub globals: Vec<GlobalInstrumentation>,
}

impl Default for PolicyData {
    fn default() -> Self {
        Self {
            strategy: Strategy::Callout,
            logging: LogType::None,
            ktrace: KTraceTarget::None,
            dtrace: DTraceTarget::None,
            serialization: SerializationType::None,
            block_structure: false,
            hook_prefix: DEFAULT_HOOK_PREFIX.to_string(),
            everything: false,
            pointer_insts: false,
            functions: Vec::new(),
            structures: Vec::new(),
            globals: Vec::new(),
        }
    }
}

impl PolicyData {
    /// Parse a policy document
    pub fn from_yaml(text: &str) -> Result<Self> {
        if is_blank_document(text) {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Read and parse a policy file
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::PolicyFileNotFound {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&text)
    }

    /// Render as a policy document
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

/// Only whitespace, comments and document markers
fn is_blank_document(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}
