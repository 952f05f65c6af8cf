//! Value types and the per-module type information side table.

use std::collections::HashMap;
use std::fmt;

use crate::ast::ExprId;

/// A fully resolved nominal type. Generic instantiations carry their mangled
/// name (`Result__int__int`). `is_copy` drives the move discipline: only
/// types transitively composed of Copy leaves are Copy.
///
/// Equality is nominal: two sides of a module boundary may disagree on the
/// Copy attribute of a type they both name, but they still mean the same
/// type.
#[derive(Debug, Clone, Eq)]
pub struct Type {
    pub name: String,
    pub is_copy: bool,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl std::hash::Hash for Type {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Type {
    pub fn named(name: impl Into<String>, is_copy: bool) -> Type {
        Type { name: name.into(), is_copy }
    }

    pub fn int() -> Type {
        Type::named("int", true)
    }

    pub fn bool_() -> Type {
        Type::named("bool", true)
    }

    pub fn string() -> Type {
        Type::named("string", false)
    }

    pub fn buffer() -> Type {
        Type::named("buffer", false)
    }

    pub fn view() -> Type {
        Type::named("view", true)
    }

    pub fn tensor() -> Type {
        Type::named("tensor", false)
    }

    pub fn channel() -> Type {
        Type::named("channel", false)
    }

    pub fn vec() -> Type {
        Type::named("vec", false)
    }

    pub fn unit() -> Type {
        Type::named("unit", true)
    }

    /// Owning runtime resources that `release` accepts.
    pub fn is_releasable(&self) -> bool {
        matches!(self.name.as_str(), "buffer" | "tensor" | "channel" | "string" | "vec")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Maps a builtin type name in either surface to its type.
pub fn builtin_type(name: &str) -> Option<Type> {
    match name {
        "int" | "정수" => Some(Type::int()),
        "bool" | "불리언" => Some(Type::bool_()),
        "string" | "문자열" => Some(Type::string()),
        "buffer" | "버퍼" => Some(Type::buffer()),
        "view" | "뷰" => Some(Type::view()),
        "tensor" | "텐서" => Some(Type::tensor()),
        "channel" | "채널" => Some(Type::channel()),
        "vec" | "벡터" => Some(Type::vec()),
        "unit" | "void" | "없음" => Some(Type::unit()),
        _ => None,
    }
}

/// Per-module results of type checking, consumed by the borrow checker and
/// the lowering pass.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    pub expr_types: HashMap<ExprId, Type>,
    pub var_types: HashMap<String, Type>,
    /// Declared struct/enum types (and their specializations) by name,
    /// carrying the Copy-ness the move discipline needs.
    pub named_types: HashMap<String, Type>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_leaves() {
        assert!(Type::int().is_copy);
        assert!(Type::view().is_copy);
        assert!(!Type::buffer().is_copy);
        assert!(!Type::string().is_copy);
    }

    #[test]
    fn korean_type_names_resolve() {
        assert_eq!(builtin_type("정수"), Some(Type::int()));
        assert_eq!(builtin_type("버퍼"), Some(Type::buffer()));
        assert_eq!(builtin_type("없음"), Some(Type::unit()));
    }
}
