// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value-type descriptors and the default-value literal codec.
//!
//! Pins carry their default value as a serialized string. Leaf values are
//! stored verbatim (`1.5`, `True`, `None`); compound values use a
//! parenthesized literal, `(X=1.0,Y=2.0)` for structs and `(1.0,2.0)` for
//! arrays. Compound literals are only ever materialized on demand: the pin
//! tree stores defaults on its leaves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive (atomic, unfoldable) value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// Interned name
    Name,
    /// String value
    String,
}

/// Types that never unfold into child pins even though they are compound
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpaqueType {
    /// Rotation quaternion
    Quat,
    /// Color curve asset data
    ColorCurve,
    /// Execution context, used only to order side-effecting nodes
    ExecuteContext,
    /// Reference to an external asset of the given class
    AssetRef(String),
}

/// A named field of a struct type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructField {
    /// Field name, used as the child pin name
    pub name: String,
    /// Field type
    pub value_type: ValueType,
    /// Default literal for this field, `None` uses the type default
    pub default: Option<String>,
}

/// A struct type: an ordered list of fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructType {
    /// Struct name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<StructField>,
}

/// Recursive value-type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Atomic primitive
    Primitive(PrimitiveType),
    /// Struct of fields, unfolds into one child pin per field
    Struct(StructType),
    /// Array of elements, unfolds into one child pin per element
    Array(Box<ValueType>),
    /// Compound type treated as an atomic leaf
    Opaque(OpaqueType),
}

impl ValueType {
    /// Boolean type
    pub fn bool() -> Self {
        Self::Primitive(PrimitiveType::Bool)
    }

    /// Integer type
    pub fn int() -> Self {
        Self::Primitive(PrimitiveType::Int)
    }

    /// Float type
    pub fn float() -> Self {
        Self::Primitive(PrimitiveType::Float)
    }

    /// Name type
    pub fn name() -> Self {
        Self::Primitive(PrimitiveType::Name)
    }

    /// String type
    pub fn string() -> Self {
        Self::Primitive(PrimitiveType::String)
    }

    /// Execution context type
    pub fn execute_context() -> Self {
        Self::Opaque(OpaqueType::ExecuteContext)
    }

    /// Quaternion type
    pub fn quat() -> Self {
        Self::Opaque(OpaqueType::Quat)
    }

    /// Array of `element`
    pub fn array_of(element: ValueType) -> Self {
        Self::Array(Box::new(element))
    }

    /// Three component float vector
    pub fn vector() -> Self {
        Self::Struct(StructType {
            name: "Vector".to_string(),
            fields: ["X", "Y", "Z"]
                .into_iter()
                .map(|name| StructField {
                    name: name.to_string(),
                    value_type: Self::float(),
                    default: None,
                })
                .collect(),
        })
    }

    /// Translation / rotation / scale transform
    pub fn transform() -> Self {
        Self::Struct(StructType {
            name: "Transform".to_string(),
            fields: vec![
                StructField {
                    name: "Translation".to_string(),
                    value_type: Self::vector(),
                    default: None,
                },
                StructField {
                    name: "Rotation".to_string(),
                    value_type: Self::quat(),
                    default: None,
                },
                StructField {
                    name: "Scale".to_string(),
                    value_type: Self::vector(),
                    default: Some("(X=1.0,Y=1.0,Z=1.0)".to_string()),
                },
            ],
        })
    }

    /// Whether this is the execution context type
    pub fn is_execute_context(&self) -> bool {
        matches!(self, Self::Opaque(OpaqueType::ExecuteContext))
    }

    /// Whether this is an array type
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Element type of an array, `None` otherwise
    pub fn element_type(&self) -> Option<&ValueType> {
        match self {
            Self::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Whether pins of this type decompose into child pins
    pub fn unfolds(&self) -> bool {
        matches!(self, Self::Struct(_) | Self::Array(_))
    }

    /// Check if a link may carry a value of this type into `other`
    pub fn can_link_to(&self, other: &ValueType) -> bool {
        self == other
    }

    /// Default literal for a value of this type
    pub fn default_value(&self) -> String {
        match self {
            Self::Primitive(PrimitiveType::Bool) => "False".to_string(),
            Self::Primitive(PrimitiveType::Int) => "0".to_string(),
            Self::Primitive(PrimitiveType::Float) => "0.0".to_string(),
            Self::Primitive(PrimitiveType::Name) => "None".to_string(),
            Self::Primitive(PrimitiveType::String) => String::new(),
            Self::Struct(ty) => join_struct(ty.fields.iter().map(|field| {
                let value = field
                    .default
                    .clone()
                    .unwrap_or_else(|| field.value_type.default_value());
                (field.name.clone(), value)
            })),
            Self::Array(_) => "()".to_string(),
            Self::Opaque(OpaqueType::Quat) => "(X=0.0,Y=0.0,Z=0.0,W=1.0)".to_string(),
            Self::Opaque(OpaqueType::AssetRef(_)) => "None".to_string(),
            Self::Opaque(OpaqueType::ColorCurve | OpaqueType::ExecuteContext) => String::new(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(PrimitiveType::Bool) => write!(f, "bool"),
            Self::Primitive(PrimitiveType::Int) => write!(f, "int32"),
            Self::Primitive(PrimitiveType::Float) => write!(f, "float"),
            Self::Primitive(PrimitiveType::Name) => write!(f, "FName"),
            Self::Primitive(PrimitiveType::String) => write!(f, "FString"),
            Self::Struct(ty) => write!(f, "F{}", ty.name),
            Self::Array(element) => write!(f, "TArray<{element}>"),
            Self::Opaque(OpaqueType::Quat) => write!(f, "FQuat"),
            Self::Opaque(OpaqueType::ColorCurve) => write!(f, "FColorCurve"),
            Self::Opaque(OpaqueType::ExecuteContext) => write!(f, "FExecuteContext"),
            Self::Opaque(OpaqueType::AssetRef(class)) => write!(f, "TObjectPtr<{class}>"),
        }
    }
}

/// Split a compound literal into its top-level elements.
///
/// Returns `None` when `value` is not wrapped in parentheses. Commas inside
/// nested parentheses or double quotes do not split.
pub fn split_compound(value: &str) -> Option<Vec<String>> {
    let inner = value.trim().strip_prefix('(')?.strip_suffix(')')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current.trim().to_string());
    Some(parts)
}

/// Split a struct literal into `(field, value)` pairs
pub fn split_struct(value: &str) -> Option<Vec<(String, String)>> {
    split_compound(value)?
        .into_iter()
        .map(|part| {
            let (name, value) = part.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Join array elements into a compound literal
pub fn join_array<I, S>(elements: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let inner: Vec<String> = elements
        .into_iter()
        .map(|element| element.as_ref().to_string())
        .collect();
    format!("({})", inner.join(","))
}

/// Join `(field, value)` pairs into a struct literal
pub fn join_struct<I>(fields: I) -> String
where
    I: IntoIterator<Item = (String, String)>,
{
    let inner: Vec<String> = fields
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    format!("({})", inner.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_nested_compound() {
        let parts = split_compound("((X=1.0,Y=2.0),(X=3.0,Y=4.0))").unwrap();
        assert_eq!(parts, vec!["(X=1.0,Y=2.0)", "(X=3.0,Y=4.0)"]);

        assert_eq!(split_compound("()").unwrap(), Vec::<String>::new());
        assert!(split_compound("1.0").is_none());
    }

    #[test]
    fn test_split_respects_quotes() {
        let parts = split_compound("(\"a,b\",c)").unwrap();
        assert_eq!(parts, vec!["\"a,b\"", "c"]);
    }

    #[test]
    fn test_struct_literal() {
        let fields = split_struct("(X=1.0, Y=2.0)").unwrap();
        assert_eq!(
            fields,
            vec![
                ("X".to_string(), "1.0".to_string()),
                ("Y".to_string(), "2.0".to_string())
            ]
        );
        assert!(split_struct("(1.0,2.0)").is_none());
    }

    #[test]
    fn test_type_defaults() {
        assert_eq!(ValueType::vector().default_value(), "(X=0.0,Y=0.0,Z=0.0)");
        let transform = ValueType::transform().default_value();
        assert!(transform.ends_with("Scale=(X=1.0,Y=1.0,Z=1.0))"));
        assert_eq!(ValueType::array_of(ValueType::float()).default_value(), "()");
    }

    #[test]
    fn test_unfolding() {
        assert!(ValueType::vector().unfolds());
        assert!(ValueType::array_of(ValueType::int()).unfolds());
        assert!(!ValueType::quat().unfolds());
        assert!(!ValueType::execute_context().unfolds());
        assert!(!ValueType::float().can_link_to(&ValueType::int()));
    }

    #[test]
    fn test_display() {
        assert_eq!(ValueType::array_of(ValueType::vector()).to_string(), "TArray<FVector>");
    }
}
