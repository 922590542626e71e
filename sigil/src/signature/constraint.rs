//! Constraint model
//!
//! A signature declares its free variables here: named type variables and
//! named long (integer) variables, each scoped to exactly one signature and
//! each carrying admissibility restrictions the external binder must honor

use crate::bind::BoundVariables;
use crate::types::LogicalType;

/// Declaration of a free type variable with its admissibility flags
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeVariableConstraint {
    name: String,
    comparable_required: bool,
    orderable_required: bool,
    bindable_to_unknown: bool,
}

impl TypeVariableConstraint {
    /// Declare an unconstrained type variable
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparable_required: false,
            orderable_required: false,
            bindable_to_unknown: false,
        }
    }

    /// Declare a type variable that only binds to comparable types
    pub fn comparable(name: impl Into<String>) -> Self {
        Self {
            comparable_required: true,
            ..Self::new(name)
        }
    }

    /// Declare a type variable that only binds to orderable types
    pub fn orderable(name: impl Into<String>) -> Self {
        Self {
            orderable_required: true,
            ..Self::new(name)
        }
    }

    /// Additionally allow the variable to bind to the unknown type of an
    /// untyped `NULL`
    pub fn bindable_to_unknown(mut self) -> Self {
        self.bindable_to_unknown = true;
        self
    }

    /// Name of the declared variable
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Must the bound type be comparable?
    #[inline]
    pub fn is_comparable_required(&self) -> bool {
        self.comparable_required
    }

    /// Must the bound type be orderable?
    #[inline]
    pub fn is_orderable_required(&self) -> bool {
        self.orderable_required
    }

    /// May the variable bind to the unknown type?
    #[inline]
    pub fn is_bindable_to_unknown(&self) -> bool {
        self.bindable_to_unknown
    }

    /// Would binding the variable to `logical_type` satisfy the constraint?
    /// Used by the external binder when it unifies call-site argument types
    pub fn admits(&self, logical_type: &LogicalType) -> bool {
        if matches!(logical_type, LogicalType::Unknown) {
            return self.bindable_to_unknown;
        }
        (!self.comparable_required || logical_type.is_comparable())
            && (!self.orderable_required || logical_type.is_orderable())
    }
}

/// Derivation relation restricting a long variable against another declared
/// long variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LongVariableBound {
    /// The value must not exceed the value bound to the named variable.
    /// Used by parametric types with paired parameters, e.g. requiring a
    /// decimal scale to stay within its precision
    AtMost(String),
}

/// Declaration of a free long (integer) variable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LongVariableConstraint {
    name: String,
    bound: Option<LongVariableBound>,
}

impl LongVariableConstraint {
    /// Declare an unconstrained long variable
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: None,
        }
    }

    /// Declare a long variable that must not exceed another declared long
    /// variable
    pub fn at_most(name: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bound: Some(LongVariableBound::AtMost(other.into())),
        }
    }

    /// Name of the declared variable
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derivation relation, if any
    #[inline]
    pub fn bound(&self) -> Option<&LongVariableBound> {
        self.bound.as_ref()
    }

    /// Would binding the variable to `value` satisfy the constraint, given
    /// the other bindings? An unbound referenced variable admits nothing
    pub fn admits(&self, value: i64, bindings: &BoundVariables) -> bool {
        match &self.bound {
            None => true,
            Some(LongVariableBound::AtMost(other)) => bindings
                .long_variable(other)
                .is_some_and(|upper| value <= upper),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconstrained_admits_everything_but_unknown() {
        let constraint = TypeVariableConstraint::new("T");
        assert!(constraint.admits(&LogicalType::BigInt));
        assert!(constraint.admits(&LogicalType::VarChar));
        assert!(!constraint.admits(&LogicalType::Unknown));
        assert!(
            TypeVariableConstraint::new("T")
                .bindable_to_unknown()
                .admits(&LogicalType::Unknown)
        );
    }

    #[test]
    fn test_orderable_constraint() {
        let constraint = TypeVariableConstraint::orderable("T");
        assert!(constraint.is_orderable_required());
        assert!(!constraint.is_comparable_required());
        assert!(constraint.admits(&LogicalType::Double));
        assert!(!constraint.admits(&LogicalType::Unknown));
    }

    #[test]
    fn test_long_variable_at_most() {
        let scale = LongVariableConstraint::at_most("s", "p");
        let bindings = BoundVariables::builder().set_long_variable("p", 18).build();
        assert!(scale.admits(4, &bindings));
        assert!(scale.admits(18, &bindings));
        assert!(!scale.admits(19, &bindings));

        // Referencing a variable with no binding admits nothing
        let empty = BoundVariables::builder().build();
        assert!(!scale.admits(0, &empty));

        assert!(LongVariableConstraint::new("p").admits(i64::MAX, &empty));
    }
}
