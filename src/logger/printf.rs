//! Plain-text logging through `printf(3)`

use super::{Logger, Parameter, SemanticType};

/// Emits `printf(format, values...)`
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintfLogger;

impl Logger for PrintfLogger {
    fn function_name(&self) -> &'static str {
        "printf"
    }

    fn create_format_string(&self, prefix: &str, params: &[Parameter], suffix: &str) -> String {
        let mut format = String::from(prefix);

        for param in params {
            match SemanticType::of(&param.ty) {
                SemanticType::Int32 => format.push_str(" %d"),
                SemanticType::Floating => format.push_str(" %.0f"),
                SemanticType::Char => format.push_str(" %c"),
                SemanticType::CString => format.push_str(" \"%s\""),
                SemanticType::Pointer => format.push_str(" %p"),
                SemanticType::Unsupported => {}
            }
        }

        format.push_str(suffix);
        format
    }
}
