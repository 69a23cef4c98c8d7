use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CodaError, ErrorKind};

/// Value kinds known to the command layer. `Multi` only appears in
/// parameter and return declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Invalid,
    Numeric,
    String,
    Reference,
    Multi,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Reference => "reference",
            Self::Multi => "multi",
        }
    }

    pub fn accepts(self, value: &CodaValue) -> bool {
        self == Self::Multi || self == value.data_type()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = CodaError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "invalid" | "void" => Ok(Self::Invalid),
            "numeric" | "number" => Ok(Self::Numeric),
            "string" => Ok(Self::String),
            "reference" | "ref" => Ok(Self::Reference),
            "multi" => Ok(Self::Multi),
            other => Err(CodaError::new(
                ErrorKind::Parse,
                format!("Unknown data type \"{}\".", other),
            )),
        }
    }
}

/// Runtime value; always one concrete kind, never `Multi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CodaValue {
    Invalid,
    Numeric(f64),
    String(String),
    Reference(u32),
}

impl CodaValue {
    pub const NULL_REFERENCE: CodaValue = CodaValue::Reference(0);

    /// Neutral value substituted when a command or call yields nothing usable.
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Invalid => Self::Invalid,
            DataType::Numeric | DataType::Multi => Self::Numeric(0.0),
            DataType::String => Self::String(String::new()),
            DataType::Reference => Self::NULL_REFERENCE,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Invalid => DataType::Invalid,
            Self::Numeric(_) => DataType::Numeric,
            Self::String(_) => DataType::String,
            Self::Reference(_) => DataType::Reference,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numeric(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<u32> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Invalid => false,
            Self::Numeric(value) => *value != 0.0,
            Self::String(value) => !value.is_empty(),
            Self::Reference(id) => *id != 0,
        }
    }

    /// Keeps the value when `expected` accepts it, otherwise substitutes the
    /// zero-equivalent of `expected`. The flag reports a substitution.
    pub fn coerce_or_zero(self, expected: DataType) -> (Self, bool) {
        if expected.accepts(&self) && !(self.is_invalid() && expected != DataType::Invalid) {
            (self, false)
        } else {
            (Self::zero(expected), true)
        }
    }
}

impl fmt::Display for CodaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => Ok(()),
            Self::Numeric(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{}", value)
                }
            }
            Self::String(value) => f.write_str(value),
            Self::Reference(id) => write!(f, "{:08X}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_types_only_accept_themselves() {
        let number = CodaValue::Numeric(1.0);
        let text = CodaValue::String("a".to_string());
        assert!(DataType::Numeric.accepts(&number));
        assert!(!DataType::Numeric.accepts(&text));
        assert!(!DataType::Reference.accepts(&number));
        assert!(DataType::Multi.accepts(&number));
        assert!(DataType::Multi.accepts(&text));
        assert!(DataType::Multi.accepts(&CodaValue::Invalid));
    }

    #[test]
    fn zero_equivalents_are_defined_per_type() {
        assert_eq!(CodaValue::zero(DataType::Numeric), CodaValue::Numeric(0.0));
        assert_eq!(CodaValue::zero(DataType::Multi), CodaValue::Numeric(0.0));
        assert_eq!(
            CodaValue::zero(DataType::String),
            CodaValue::String(String::new())
        );
        assert_eq!(CodaValue::zero(DataType::Reference), CodaValue::Reference(0));
        assert_eq!(CodaValue::zero(DataType::Invalid), CodaValue::Invalid);
    }

    #[test]
    fn coerce_or_zero_replaces_invalid_and_mismatched_values() {
        let (value, coerced) = CodaValue::Invalid.coerce_or_zero(DataType::Numeric);
        assert_eq!(value, CodaValue::Numeric(0.0));
        assert!(coerced);

        let (value, coerced) =
            CodaValue::String("x".to_string()).coerce_or_zero(DataType::Reference);
        assert_eq!(value, CodaValue::Reference(0));
        assert!(coerced);

        let (value, coerced) = CodaValue::Numeric(3.0).coerce_or_zero(DataType::Multi);
        assert_eq!(value, CodaValue::Numeric(3.0));
        assert!(!coerced);

        let (value, coerced) = CodaValue::Invalid.coerce_or_zero(DataType::Invalid);
        assert_eq!(value, CodaValue::Invalid);
        assert!(!coerced);
    }

    #[test]
    fn data_type_names_parse_case_insensitively() {
        assert_eq!("Numeric".parse::<DataType>().ok(), Some(DataType::Numeric));
        assert_eq!("ref".parse::<DataType>().ok(), Some(DataType::Reference));
        assert_eq!("void".parse::<DataType>().ok(), Some(DataType::Invalid));
        let error = "float".parse::<DataType>().expect_err("unknown type");
        assert_eq!(error.kind, ErrorKind::Parse);
    }

    #[test]
    fn display_renders_script_facing_text() {
        assert_eq!(CodaValue::Numeric(3.0).to_string(), "3");
        assert_eq!(CodaValue::Numeric(2.5).to_string(), "2.5");
        assert_eq!(CodaValue::Reference(0x14).to_string(), "00000014");
        assert_eq!(CodaValue::Invalid.to_string(), "");
    }

    #[test]
    fn values_serialize_with_type_tags() {
        let json = serde_json::to_string(&CodaValue::Numeric(1.5)).expect("serialize");
        assert_eq!(json, r#"{"type":"numeric","value":1.5}"#);
        let json = serde_json::to_string(&CodaValue::Invalid).expect("serialize");
        assert_eq!(json, r#"{"type":"invalid"}"#);
    }

    #[test]
    fn truthiness_follows_zero_equivalents() {
        assert!(!CodaValue::zero(DataType::Numeric).is_truthy());
        assert!(!CodaValue::zero(DataType::String).is_truthy());
        assert!(!CodaValue::zero(DataType::Reference).is_truthy());
        assert!(CodaValue::Numeric(-1.0).is_truthy());
    }
}
