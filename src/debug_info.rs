//! Debug metadata lookups: source files of functions, names of struct fields.

use crate::ir::{Function, Module};

/// Read-only view over the debug metadata carried by a module
#[derive(Debug, Clone, Copy)]
pub struct DebugInfo<'m> {
    module: &'m Module,
}

impl<'m> DebugInfo<'m> {
    pub fn new(module: &'m Module) -> Self {
        Self { module }
    }

    /// Does every function definition carry a subprogram?
    pub fn module_has_full_debug_info(&self) -> bool {
        let mut definitions = self
            .module
            .functions
            .iter()
            .filter(|f| !f.is_declaration())
            .peekable();
        definitions.peek().is_some() && definitions.all(|f| f.subprogram.is_some())
    }

    /// Source file recorded for a function, if any
    pub fn source_file(&self, function: &'m Function) -> Option<&'m str> {
        function.subprogram.as_ref().map(|sp| sp.file.as_str())
    }

    /// Source-level name of field `ordinal` in struct type `type_name`.
    ///
    /// Without a composite type record the ordinal is used (`field2`).
    pub fn field_name(&self, type_name: &str, ordinal: usize) -> String {
        self.module
            .debug_types
            .iter()
            .find(|t| t.type_name == type_name)
            .and_then(|t| t.fields.get(ordinal))
            .cloned()
            .unwrap_or_else(|| format!("field{}", ordinal))
    }
}

/// File name with any directory (`/` or `\` separated) removed
pub fn base_file_name(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DiCompositeType, FunctionBuilder, IrType};

    #[test]
    fn test_base_file_name() {
        assert_eq!(base_file_name("/usr/src/sys/kern/a.c"), "a.c");
        assert_eq!(base_file_name("C:\\src\\b.c"), "b.c");
        assert_eq!(base_file_name("c.c"), "c.c");
        assert_eq!(base_file_name(""), "");
    }

    #[test]
    fn test_field_name_fallback() {
        let mut module = Module::new("m");
        module.debug_types.push(DiCompositeType {
            type_name: "struct.test_struct".into(),
            fields: vec!["test_int".into(), "test_charp".into()],
        });
        let debug = DebugInfo::new(&module);
        assert_eq!(debug.field_name("struct.test_struct", 1), "test_charp");
        assert_eq!(debug.field_name("struct.test_struct", 5), "field5");
        assert_eq!(debug.field_name("struct.other", 0), "field0");
    }

    #[test]
    fn test_full_debug_info() {
        let mut module = Module::new("m");
        assert!(!DebugInfo::new(&module).module_has_full_debug_info());

        let mut fb = FunctionBuilder::new("f", IrType::Void, &[]);
        fb.ret(None);
        module.add_function(fb.subprogram("/tmp/a.c", 3).build());
        assert!(DebugInfo::new(&module).module_has_full_debug_info());

        let mut fb = FunctionBuilder::new("g", IrType::Void, &[]);
        fb.ret(None);
        module.add_function(fb.build());
        assert!(!DebugInfo::new(&module).module_has_full_debug_info());
    }
}
