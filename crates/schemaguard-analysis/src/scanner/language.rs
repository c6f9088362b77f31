//! Languages the code scanner understands, and their tree-sitter grammars.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
}

impl Language {
    /// Detect language from a file extension.
    pub fn from_extension(ext: Option<&str>) -> Option<Self> {
        match ext? {
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "py" => Some(Language::Python),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Python => "python",
        }
    }

    pub fn ts_language(&self) -> tree_sitter::Language {
        match self {
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
        }
    }

    /// Node kinds and field names for call-site extraction.
    pub fn shape(&self) -> &'static SyntaxShape {
        match self {
            Language::Python => &PYTHON_SHAPE,
            _ => &JS_SHAPE,
        }
    }
}

/// The handful of grammar names call-site extraction depends on.
#[derive(Debug)]
pub struct SyntaxShape {
    pub call: &'static str,
    pub member: &'static str,
    pub member_object_field: &'static str,
    pub member_property_field: &'static str,
    pub string_kinds: &'static [&'static str],
    pub object_kind: &'static str,
    pub array_kind: &'static str,
    /// Methods that name a table as their first argument.
    pub table_methods: &'static [&'static str],
}

static JS_SHAPE: SyntaxShape = SyntaxShape {
    call: "call_expression",
    member: "member_expression",
    member_object_field: "object",
    member_property_field: "property",
    string_kinds: &["string", "template_string"],
    object_kind: "object",
    array_kind: "array",
    table_methods: &["from"],
};

static PYTHON_SHAPE: SyntaxShape = SyntaxShape {
    call: "call",
    member: "attribute",
    member_object_field: "object",
    member_property_field: "attribute",
    string_kinds: &["string"],
    object_kind: "dictionary",
    array_kind: "list",
    table_methods: &["table", "from_"],
};
