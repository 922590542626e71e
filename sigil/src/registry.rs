//! Registry contracts
//!
//! Specialization consumes two capabilities furnished by the surrounding
//! runtime: a [`TypeRegistry`] that turns variable-free type descriptors into
//! concrete executable types, and a [`FunctionRegistry`] that resolves the
//! auxiliary functions an aggregator depends on (e.g. an element-type
//! comparator). The builtin implementations cover the builtin type
//! vocabulary; an embedding engine supplies richer ones

use std::fmt::Debug;
use std::sync::Arc;

use snafu::{Snafu, ensure};

use crate::error::SendableError;
use crate::signature::type_desc::TypeDescriptor;
use crate::types::{Datum, LogicalType};

/// Error resolving a type or function through a registry
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RegistryError {
    /// The descriptor does not name a type the registry knows
    #[snafu(display("unknown type `{descriptor}`"))]
    UnknownType {
        /// The unresolvable descriptor, rendered
        descriptor: String,
    },
    /// No function is registered under the queried name and argument types
    #[snafu(display("no function registered for `{name}` over argument types {argument_types:?}"))]
    FunctionNotFound {
        /// Queried function name
        name: String,
        /// Queried argument types
        argument_types: Vec<LogicalType>,
    },
}

/// Resolves variable-free type descriptors into concrete executable types
pub trait TypeRegistry: Send + Sync {
    /// Resolve `descriptor` into a concrete type. The descriptor must not
    /// contain variable references anymore
    fn resolve(&self, descriptor: &TypeDescriptor) -> Result<LogicalType, RegistryError>;

    /// Can a value of type `from` be implicitly coerced to type `to`?
    fn can_coerce(&self, from: &LogicalType, to: &LogicalType) -> bool;
}

/// Lookup key for an auxiliary function
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionQuery {
    name: String,
    argument_types: Vec<LogicalType>,
}

impl FunctionQuery {
    /// Create a query for `name` over the given argument types
    pub fn new(name: impl Into<String>, argument_types: Vec<LogicalType>) -> Self {
        Self {
            name: name.into(),
            argument_types,
        }
    }

    /// Queried function name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queried argument types
    #[inline]
    pub fn argument_types(&self) -> &[LogicalType] {
        &self.argument_types
    }
}

/// A concrete auxiliary function resolved from a [`FunctionRegistry`]
#[derive(Clone)]
pub struct Callable(Arc<dyn Fn(&[Datum]) -> Result<Datum, SendableError> + Send + Sync>);

impl Callable {
    /// Wrap a function value
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&[Datum]) -> Result<Datum, SendableError> + Send + Sync + 'static,
    {
        Self(Arc::new(function))
    }

    /// Invoke the function over the given arguments
    #[inline]
    pub fn invoke(&self, arguments: &[Datum]) -> Result<Datum, SendableError> {
        (self.0)(arguments)
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Callable")
    }
}

/// Resolves auxiliary functions specialization depends on
pub trait FunctionRegistry: Send + Sync {
    /// Look up the function matching `query`
    fn lookup(&self, query: &FunctionQuery) -> Result<Callable, RegistryError>;
}

/// Type registry over the builtin type vocabulary
#[derive(Debug, Default)]
pub struct BuiltinTypeRegistry;

impl TypeRegistry for BuiltinTypeRegistry {
    fn resolve(&self, descriptor: &TypeDescriptor) -> Result<LogicalType, RegistryError> {
        use crate::signature::type_desc::TypeDescriptorParameter;

        let unknown = || UnknownTypeSnafu {
            descriptor: descriptor.to_string(),
        };

        // A descriptor reaching a registry must not carry variable
        // references anymore
        ensure!(descriptor.is_concrete(), unknown());

        if descriptor.parameters().is_empty() {
            return match descriptor.base() {
                "boolean" => Ok(LogicalType::Boolean),
                "tinyint" => Ok(LogicalType::TinyInt),
                "smallint" => Ok(LogicalType::SmallInt),
                "integer" => Ok(LogicalType::Integer),
                "bigint" => Ok(LogicalType::BigInt),
                "float" => Ok(LogicalType::Float),
                "double" => Ok(LogicalType::Double),
                "varchar" => Ok(LogicalType::VarChar),
                "unknown" => Ok(LogicalType::Unknown),
                _ => unknown().fail(),
            };
        }

        // The only parametric builtin type family
        ensure!(descriptor.base() == "decimal", unknown());
        let [
            TypeDescriptorParameter::Literal(precision),
            TypeDescriptorParameter::Literal(scale),
        ] = descriptor.parameters()
        else {
            return unknown().fail();
        };
        ensure!(
            (1..=38).contains(precision) && (0..=*precision).contains(scale),
            unknown()
        );
        Ok(LogicalType::Decimal {
            precision: *precision as u8,
            scale: *scale as u8,
        })
    }

    fn can_coerce(&self, from: &LogicalType, to: &LogicalType) -> bool {
        use LogicalType::*;

        if from == to {
            return true;
        }
        // An untyped null coerces to any type
        if matches!(from, Unknown) {
            return true;
        }
        // Widening chains only, narrowing needs an explicit cast
        let rank = |logical_type: &LogicalType| match logical_type {
            TinyInt => Some(0),
            SmallInt => Some(1),
            Integer => Some(2),
            BigInt => Some(3),
            _ => None,
        };
        match (rank(from), rank(to)) {
            (Some(from_rank), Some(to_rank)) => from_rank <= to_rank,
            (Some(_), None) => matches!(to, Double),
            _ => matches!(from, Float) && matches!(to, Double),
        }
    }
}

/// Function registry exposing the builtin auxiliary functions. Currently a
/// single entry: the three-way `compare` over every orderable type
#[derive(Debug, Default)]
pub struct BuiltinFunctionRegistry;

impl FunctionRegistry for BuiltinFunctionRegistry {
    fn lookup(&self, query: &FunctionQuery) -> Result<Callable, RegistryError> {
        match (query.name(), query.argument_types()) {
            ("compare", [left, right]) if left == right && left.is_orderable() => {
                Ok(Callable::new(compare))
            }
            _ => FunctionNotFoundSnafu {
                name: query.name(),
                argument_types: query.argument_types().to_vec(),
            }
            .fail(),
        }
    }
}

/// Three-way comparison over two datums of the same type. Returns the
/// ordering as a bigint: negative, zero or positive
fn compare(arguments: &[Datum]) -> Result<Datum, SendableError> {
    let ordering = match arguments {
        [Datum::Boolean(left), Datum::Boolean(right)] => left.cmp(right),
        [Datum::BigInt(left), Datum::BigInt(right)] => left.cmp(right),
        [Datum::Double(left), Datum::Double(right)] => left.total_cmp(right),
        [Datum::VarChar(left), Datum::VarChar(right)] => left.cmp(right),
        _ => {
            return Err(format!("`compare` is undefined over arguments {:?}", arguments).into());
        }
    };
    Ok(Datum::BigInt(ordering as i64))
}
