//! Checked types of KataScript values.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{ExprId, TypeAnnotation, TypeKind};
use crate::builtin::Builtin;

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Number,
    String,
    Boolean,
    Void,
    Error,
    Array(Box<Type>),
    /// Produced after an error so one mistake is reported once.
    Unknown,
}

impl Type {
    /// Resolve a source annotation. Unknown names resolve to `None`.
    pub fn from_annotation(ann: &TypeAnnotation) -> Option<Type> {
        Some(match &ann.kind {
            TypeKind::Number => Type::Number,
            TypeKind::String => Type::String,
            TypeKind::Boolean => Type::Boolean,
            TypeKind::Void => Type::Void,
            TypeKind::Error => Type::Error,
            TypeKind::Array(inner) => Type::Array(Box::new(Type::from_annotation(inner)?)),
            TypeKind::Named(_) => return None,
        })
    }

    pub fn array_of(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        match self {
            Type::Unknown => true,
            Type::Array(inner) => inner.is_unknown(),
            _ => false,
        }
    }

    /// Whether values of this type live in the host heap.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::String | Type::Array(_) | Type::Error)
    }

    /// Whether `self` and `other` can stand for each other.
    /// `Unknown` is compatible with everything.
    pub fn compatible(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (Type::Array(a), Type::Array(b)) => a.compatible(b),
            (a, b) => a == b,
        }
    }

    /// The element kind code the host uses for arrays holding this type.
    pub fn elem_kind(&self) -> i32 {
        match self {
            Type::Number => crate::abi::KIND_NUMBER,
            Type::String => crate::abi::KIND_STRING,
            Type::Boolean => crate::abi::KIND_BOOLEAN,
            Type::Array(_) => crate::abi::KIND_ARRAY,
            Type::Error => crate::abi::KIND_ERROR,
            Type::Void | Type::Unknown => crate::abi::KIND_NUMBER,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::Boolean => write!(f, "boolean"),
            Type::Void => write!(f, "void"),
            Type::Error => write!(f, "Error"),
            Type::Array(inner) => write!(f, "{inner}[]"),
            Type::Unknown => write!(f, "unknown"),
        }
    }
}

/// Facts the checker attaches to expressions: the type of every expression
/// and the built-in each library call resolves to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeTable {
    exprs: HashMap<ExprId, Type>,
    builtins: HashMap<ExprId, Builtin>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: ExprId, ty: Type) {
        self.exprs.insert(id, ty);
    }

    pub fn record_builtin(&mut self, id: ExprId, builtin: Builtin) {
        self.builtins.insert(id, builtin);
    }

    pub fn type_of(&self, id: ExprId) -> Option<&Type> {
        self.exprs.get(&id)
    }

    pub fn builtin(&self, id: ExprId) -> Option<Builtin> {
        self.builtins.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Span;

    fn ann(kind: TypeKind) -> TypeAnnotation {
        TypeAnnotation::new(kind, Span::point(1, 1))
    }

    #[test]
    fn test_from_annotation() {
        assert_eq!(
            Type::from_annotation(&ann(TypeKind::Number)),
            Some(Type::Number)
        );
        let nested = ann(TypeKind::Array(Box::new(ann(TypeKind::Array(Box::new(
            ann(TypeKind::String),
        ))))));
        assert_eq!(
            Type::from_annotation(&nested),
            Some(Type::array_of(Type::array_of(Type::String)))
        );
        assert_eq!(
            Type::from_annotation(&ann(TypeKind::Named("Foo".into()))),
            None
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::array_of(Type::array_of(Type::Number)).to_string(), "number[][]");
        assert_eq!(Type::Boolean.to_string(), "boolean");
    }

    #[test]
    fn test_unknown_is_compatible() {
        assert!(Type::Unknown.compatible(&Type::String));
        assert!(Type::array_of(Type::Unknown).compatible(&Type::array_of(Type::Number)));
        assert!(!Type::Number.compatible(&Type::String));
        assert!(!Type::array_of(Type::Number).compatible(&Type::array_of(Type::String)));
    }
}
