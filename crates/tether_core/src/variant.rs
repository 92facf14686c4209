//! Dynamic values passed between host methods and scripts

use crate::ObjectId;
use std::fmt;
use thiserror::Error;

/// Host-side dynamic value.
///
/// Object variants do not own the object they name; lifetime is governed by
/// the object database.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectId),
    /// Host-only aggregate; not bridged into scripts.
    Array(Vec<Variant>),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VariantType {
    Nil,
    Bool,
    Number,
    String,
    Object,
    Array,
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariantType::Nil => "Nil",
            VariantType::Bool => "bool",
            VariantType::Number => "number",
            VariantType::String => "String",
            VariantType::Object => "Object",
            VariantType::Array => "Array",
        };
        f.write_str(name)
    }
}

impl Variant {
    pub fn get_type(&self) -> VariantType {
        match self {
            Variant::Nil => VariantType::Nil,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Number(_) => VariantType::Number,
            Variant::String(_) => VariantType::String,
            Variant::Object(_) => VariantType::Object,
            Variant::Array(_) => VariantType::Array,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Variant::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Variant::Object(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Number(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Number(value as f64)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<ObjectId> for Variant {
    fn from(id: ObjectId) -> Self {
        Variant::Object(id)
    }
}

/// Failure of a bound method call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("invalid method")]
    InvalidMethod,

    #[error("instance is null")]
    InstanceIsNull,

    #[error("invalid argument {index}: expected {expected}")]
    InvalidArgument { index: usize, expected: VariantType },

    #[error("too few arguments: expected {expected}, got {given}")]
    TooFewArguments { expected: usize, given: usize },

    #[error("script error: {0}")]
    Script(String),
}

impl CallError {
    /// Argument check used by method bodies.
    pub fn expect<T>(
        args: &[Variant],
        index: usize,
        expected: VariantType,
        read: impl FnOnce(&Variant) -> Option<T>,
    ) -> Result<T, CallError> {
        let value = args.get(index).ok_or(CallError::TooFewArguments {
            expected: index + 1,
            given: args.len(),
        })?;
        read(value).ok_or(CallError::InvalidArgument { index, expected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variant_kind() {
        assert_eq!(Variant::from(2.5).as_number(), Some(2.5));
        assert_eq!(Variant::from("abc").as_str(), Some("abc"));
        assert_eq!(Variant::from(true).as_bool(), Some(true));
        assert_eq!(Variant::from(ObjectId::from_raw(4)).as_object(), Some(ObjectId::from_raw(4)));
        assert!(Variant::default().is_nil());
        assert_eq!(Variant::Array(vec![]).get_type(), VariantType::Array);
        assert_eq!(Variant::from("abc").as_number(), None);
    }

    #[test]
    fn expect_reports_position_and_type() {
        let args = vec![Variant::from("name"), Variant::from(1.0)];

        let name = CallError::expect(&args, 0, VariantType::String, |v| v.as_str().map(str::to_owned));
        assert_eq!(name.as_deref(), Ok("name"));

        let wrong = CallError::expect(&args, 0, VariantType::Number, Variant::as_number);
        assert_eq!(
            wrong,
            Err(CallError::InvalidArgument { index: 0, expected: VariantType::Number })
        );

        let missing = CallError::expect(&args, 2, VariantType::Number, Variant::as_number);
        assert_eq!(missing, Err(CallError::TooFewArguments { expected: 3, given: 2 }));
    }
}
