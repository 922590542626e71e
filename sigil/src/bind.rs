//! Variable bindings
//!
//! The external binder unifies the argument types of one call site against a
//! signature's constraints and records the outcome here: a concrete value for
//! every variable the signature declares. A [`BoundVariables`] is built once
//! per distinct call-site argument-type combination and consumed by a single
//! specialization call

use crate::AHashMap;
use crate::types::LogicalType;

/// Immutable mapping from a signature's declared variables to concrete
/// values, local to one call site
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundVariables {
    type_variables: AHashMap<String, LogicalType>,
    long_variables: AHashMap<String, i64>,
}

impl BoundVariables {
    /// Start building bindings
    pub fn builder() -> BoundVariablesBuilder {
        BoundVariablesBuilder {
            inner: Self::default(),
        }
    }

    /// The concrete type bound to a type variable, if any
    #[inline]
    pub fn type_variable(&self, name: &str) -> Option<&LogicalType> {
        self.type_variables.get(name)
    }

    /// The concrete value bound to a long variable, if any
    #[inline]
    pub fn long_variable(&self, name: &str) -> Option<i64> {
        self.long_variables.get(name).copied()
    }
}

/// Builder for [`BoundVariables`]
#[derive(Debug, Default)]
pub struct BoundVariablesBuilder {
    inner: BoundVariables,
}

impl BoundVariablesBuilder {
    /// Bind a type variable to a concrete type. Rebinding replaces the
    /// previous value
    pub fn set_type_variable(mut self, name: impl Into<String>, bound: LogicalType) -> Self {
        self.inner.type_variables.insert(name.into(), bound);
        self
    }

    /// Bind a long variable to a concrete value. Rebinding replaces the
    /// previous value
    pub fn set_long_variable(mut self, name: impl Into<String>, value: i64) -> Self {
        self.inner.long_variables.insert(name.into(), value);
        self
    }

    /// Finish building, the result is immutable
    pub fn build(self) -> BoundVariables {
        self.inner
    }
}
