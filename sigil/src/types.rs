//! Concrete executable types and runtime values
//!
//! The signature model reasons about *descriptors* of types, possibly with
//! free variables. Once the external binder has produced bindings, the
//! descriptors resolve into the [`LogicalType`]s defined here, and runtime
//! aggregators consume/produce [`Datum`]s of these types.

use std::fmt::Display;

/// All of the concrete types the runtime can execute over. Different logical
/// types may share a machine representation; the logical type adds the SQL
/// semantic above it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Boolean value represent `true` or `false`
    Boolean,
    /// Signed 8-bit integer
    TinyInt,
    /// Signed 16-bit integer
    SmallInt,
    /// Signed 32-bit integer
    Integer,
    /// Signed 64-bit integer
    BigInt,
    /// 32-bit float number
    Float,
    /// 64-bit float number
    Double,
    /// Variable length Utf-8 String
    VarChar,
    /// Fixed-point numbers with precision and scale
    ///
    /// For example number `3.14` has a precision of `3` and a scale of `2`.
    /// The unscaled value is stored in a `BIGINT` up to 18 precision and in a
    /// `HUGEINT` above it
    Decimal {
        /// 1 <= precision <= 38
        precision: u8,
        /// 0 <= scale <= precision
        scale: u8,
    },
    /// Type of an untyped SQL `NULL`. It can only appear when a type variable
    /// explicitly allows binding to it
    Unknown,
}

impl LogicalType {
    /// Can values of this type be tested for equality?
    pub fn is_comparable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Can values of this type be totally ordered?
    pub fn is_orderable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::TinyInt => write!(f, "tinyint"),
            Self::SmallInt => write!(f, "smallint"),
            Self::Integer => write!(f, "integer"),
            Self::BigInt => write!(f, "bigint"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::VarChar => write!(f, "varchar"),
            Self::Decimal { precision, scale } => write!(f, "decimal({}, {})", precision, scale),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Dynamically typed runtime value
///
/// A row passed to [`Aggregator::update`] is a slice of datums, one per
/// argument of the call site. `Datum` is deliberately small: it models the
/// values the builtin aggregators and auxiliary callables exchange, not a
/// full columnar representation
///
/// [`Aggregator::update`]: crate::aggregate::Aggregator::update
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// SQL NULL
    Null,
    /// Boolean value
    Boolean(bool),
    /// Signed 64-bit integer value
    BigInt(i64),
    /// 64-bit float value
    Double(f64),
    /// Utf-8 string value
    VarChar(String),
}

impl Datum {
    /// Is the datum a SQL NULL?
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// View the datum as an `i64`, if it is a bigint
    #[inline]
    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// View the datum as an `f64`, if it is a double
    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// View the datum as a `&str`, if it is a varchar
    #[inline]
    pub fn as_varchar(&self) -> Option<&str> {
        match self {
            Self::VarChar(v) => Some(v),
            _ => None,
        }
    }

    /// Logical type of the datum. `None` for [`Datum::Null`]: an untyped null
    /// carries no type of its own
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(LogicalType::Boolean),
            Self::BigInt(_) => Some(LogicalType::BigInt),
            Self::Double(_) => Some(LogicalType::Double),
            Self::VarChar(_) => Some(LogicalType::VarChar),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_type_display() {
        assert_eq!(LogicalType::BigInt.to_string(), "bigint");
        assert_eq!(
            LogicalType::Decimal {
                precision: 10,
                scale: 2
            }
            .to_string(),
            "decimal(10, 2)"
        );
    }

    #[test]
    fn test_unknown_is_neither_comparable_nor_orderable() {
        assert!(!LogicalType::Unknown.is_comparable());
        assert!(!LogicalType::Unknown.is_orderable());
        assert!(LogicalType::VarChar.is_orderable());
    }

    #[test]
    fn test_datum_accessors() {
        assert_eq!(Datum::BigInt(7).as_bigint(), Some(7));
        assert_eq!(Datum::Double(0.5).as_bigint(), None);
        assert_eq!(Datum::VarChar("haha".to_string()).as_varchar(), Some("haha"));
        assert!(Datum::Null.is_null());
        assert_eq!(Datum::Null.logical_type(), None);
        assert_eq!(Datum::Boolean(true).logical_type(), Some(LogicalType::Boolean));
    }
}
