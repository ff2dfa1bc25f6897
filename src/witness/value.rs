//! Typed witness variable values.
//!
//! ## WitnessValue Types
//!
//! - `Int`: Numbers (card runtime ids, positions, amounts)
//! - `Bool`: Flags
//! - `Text`: Strings
//! - `IntList`: Number lists (drawn card ids, damage targets)
//! - `TextList`: String lists

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Inline capacity for integer lists. Most witnesses carry a hand's worth
/// of card ids or fewer.
pub type IntList = SmallVec<[i64; 8]>;

/// Value of a single witness variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WitnessValue {
    /// Integer value.
    Int(i64),
    /// Boolean flag.
    Bool(bool),
    /// Text value.
    Text(String),
    /// List of integers.
    IntList(IntList),
    /// List of strings.
    TextList(Vec<String>),
}

/// Discriminant of a [`WitnessValue`], used by witness schemas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// [`WitnessValue::Int`]
    Int,
    /// [`WitnessValue::Bool`]
    Bool,
    /// [`WitnessValue::Text`]
    Text,
    /// [`WitnessValue::IntList`]
    IntList,
    /// [`WitnessValue::TextList`]
    TextList,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::Text => "text",
            ValueType::IntList => "int list",
            ValueType::TextList => "text list",
        };
        f.write_str(name)
    }
}

impl WitnessValue {
    /// The type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            WitnessValue::Int(_) => ValueType::Int,
            WitnessValue::Bool(_) => ValueType::Bool,
            WitnessValue::Text(_) => ValueType::Text,
            WitnessValue::IntList(_) => ValueType::IntList,
            WitnessValue::TextList(_) => ValueType::TextList,
        }
    }

    /// Get as integer if this is an Int value.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            WitnessValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as bool if this is a Bool value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WitnessValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string reference if this is a Text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WitnessValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as int slice if this is an IntList value.
    #[must_use]
    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            WitnessValue::IntList(v) => Some(v),
            _ => None,
        }
    }

    /// Get as text slice if this is a TextList value.
    #[must_use]
    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            WitnessValue::TextList(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for WitnessValue {
    fn from(v: i64) -> Self {
        WitnessValue::Int(v)
    }
}

impl From<i32> for WitnessValue {
    fn from(v: i32) -> Self {
        WitnessValue::Int(i64::from(v))
    }
}

impl From<bool> for WitnessValue {
    fn from(v: bool) -> Self {
        WitnessValue::Bool(v)
    }
}

impl From<String> for WitnessValue {
    fn from(v: String) -> Self {
        WitnessValue::Text(v)
    }
}

impl From<&str> for WitnessValue {
    fn from(v: &str) -> Self {
        WitnessValue::Text(v.to_string())
    }
}

impl From<Vec<i64>> for WitnessValue {
    fn from(v: Vec<i64>) -> Self {
        WitnessValue::IntList(IntList::from_vec(v))
    }
}

impl From<&[i64]> for WitnessValue {
    fn from(v: &[i64]) -> Self {
        WitnessValue::IntList(IntList::from_slice(v))
    }
}

impl From<Vec<String>> for WitnessValue {
    fn from(v: Vec<String>) -> Self {
        WitnessValue::TextList(v)
    }
}
