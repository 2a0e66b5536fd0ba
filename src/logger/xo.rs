//! Structured logging through libxo's `xo_emit(3)`

use super::{Logger, Parameter, SemanticType};

/// Emits `xo_emit(format, values...)` with named, humanized fields
#[derive(Debug, Clone, Copy, Default)]
pub struct LibxoLogger;

impl Logger for LibxoLogger {
    fn function_name(&self) -> &'static str {
        "xo_emit"
    }

    fn create_format_string(&self, prefix: &str, params: &[Parameter], suffix: &str) -> String {
        let mut format = String::from(prefix);

        for param in params {
            let token = match SemanticType::of(&param.ty) {
                SemanticType::Int32 => "%d",
                SemanticType::Floating => "%.0f",
                SemanticType::Char => "%c",
                SemanticType::CString => "\"%s\"",
                SemanticType::Pointer => "%p",
                SemanticType::Unsupported => "",
            };

            // padding, then a humanized (e.g. "44M") field named after the value
            format.push_str("{P: }");
            format.push_str("{h:");
            format.push_str(&param.name);
            format.push('/');
            format.push_str(token);
            format.push('}');
        }

        format.push_str(suffix);
        format
    }
}
