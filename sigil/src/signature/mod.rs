//! Function signatures
//!
//! A [`Signature`] is the immutable declarative contract of one function: its
//! qualified name, kind, free-variable constraints and argument/return type
//! shapes. Signatures are built once at registration time, validated eagerly
//! and shared read-only afterwards; the catalog uses them as lookup keys

pub mod constraint;
pub mod type_desc;

use std::fmt::Display;

use snafu::{Snafu, ensure};

use self::constraint::{LongVariableBound, LongVariableConstraint, TypeVariableConstraint};
use self::type_desc::TypeDescriptor;
use crate::AHashSet;

/// Kind of a declared function. A closed set: the catalog dispatches on the
/// kind instead of downcasting declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Scalar function, one output row per input row
    Scalar,
    /// Aggregate function, one output value per group
    Aggregate,
    /// Window function, one output row per input row over a frame
    Window,
}

impl Display for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => write!(f, "scalar"),
            Self::Aggregate => write!(f, "aggregate"),
            Self::Window => write!(f, "window"),
        }
    }
}

/// Namespace-qualified function name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    namespace: String,
    name: String,
}

impl QualifiedName {
    /// Create a qualified name from its two parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Qualify a bare name with `default_namespace`. A name that already
    /// contains a `.` separator is split and passes through unchanged
    pub fn qualify(default_namespace: &str, name: &str) -> Self {
        match name.rsplit_once('.') {
            Some((namespace, bare)) => Self::new(namespace, bare),
            None => Self::new(default_namespace, name),
        }
    }

    /// Namespace part
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Bare name part
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// Error constructing a [`Signature`] or wrapping one into a declaration
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SignatureError {
    /// A required builder field was never supplied
    #[snafu(display("signature is missing the required field `{field}`"))]
    MissingField {
        /// Name of the absent field
        field: &'static str,
    },
    /// A descriptor references a variable no constraint list declares
    #[snafu(display(
        "descriptor `{descriptor}` of signature `{name}` references undeclared variable `{variable}`"
    ))]
    UndeclaredVariable {
        /// The offending descriptor, rendered
        descriptor: String,
        /// Signature name, rendered
        name: String,
        /// The undeclared variable
        variable: String,
    },
    /// The same variable name was declared more than once
    #[snafu(display("signature `{name}` declares variable `{variable}` more than once"))]
    DuplicateVariable {
        /// Signature name, rendered
        name: String,
        /// The duplicated variable
        variable: String,
    },
    /// A long-variable derivation references an undeclared long variable
    #[snafu(display(
        "long variable `{variable}` of signature `{name}` is bounded by undeclared variable `{bound}`"
    ))]
    UndeclaredBound {
        /// Signature name, rendered
        name: String,
        /// The constrained variable
        variable: String,
        /// The undeclared variable it references
        bound: String,
    },
    /// A declaration constructor received a signature of the wrong kind
    #[snafu(display("expect an `{expect}` function signature, found `{found}` in `{name}`"))]
    KindMismatch {
        /// The kind the constructor requires
        expect: FunctionKind,
        /// The kind the signature carries
        found: FunctionKind,
        /// Signature name, rendered
        name: String,
    },
}

/// Immutable declarative contract of one function
///
/// Equality and hashing cover every field, order-sensitively for the lists,
/// so a signature can serve as a catalog lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    name: QualifiedName,
    kind: FunctionKind,
    type_variable_constraints: Vec<TypeVariableConstraint>,
    long_variable_constraints: Vec<LongVariableConstraint>,
    return_type: TypeDescriptor,
    argument_types: Vec<TypeDescriptor>,
    variadic: bool,
}

impl Signature {
    /// Start building a signature of the given kind
    pub fn builder(kind: FunctionKind) -> SignatureBuilder {
        SignatureBuilder {
            kind,
            name: None,
            type_variable_constraints: Vec::new(),
            long_variable_constraints: Vec::new(),
            return_type: None,
            argument_types: None,
            variadic: false,
        }
    }

    /// Start building an aggregate signature. The kind is fixed by this
    /// constructor, there is nothing left to check at runtime
    pub fn aggregate() -> SignatureBuilder {
        Self::builder(FunctionKind::Aggregate)
    }

    /// Qualified name of the function
    #[inline]
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Kind of the function
    #[inline]
    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Declared type variables, in declaration order
    #[inline]
    pub fn type_variable_constraints(&self) -> &[TypeVariableConstraint] {
        &self.type_variable_constraints
    }

    /// Declared long variables, in declaration order
    #[inline]
    pub fn long_variable_constraints(&self) -> &[LongVariableConstraint] {
        &self.long_variable_constraints
    }

    /// Return type descriptor
    #[inline]
    pub fn return_type(&self) -> &TypeDescriptor {
        &self.return_type
    }

    /// Argument type descriptors, in declaration order
    #[inline]
    pub fn argument_types(&self) -> &[TypeDescriptor] {
        &self.argument_types
    }

    /// Does the last declared argument repeat at the call site?
    #[inline]
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut arguments = self.argument_types.iter();
        if let Some(first) = arguments.next() {
            write!(f, "{}", first)?;
            for argument in arguments {
                write!(f, ", {}", argument)?;
            }
        }
        if self.variadic {
            write!(f, "...")?;
        }
        write!(f, "):{}", self.return_type)
    }
}

/// Builder for [`Signature`]. Name, return type and argument list are
/// required; the constraint lists may stay empty
#[derive(Debug)]
pub struct SignatureBuilder {
    kind: FunctionKind,
    name: Option<String>,
    type_variable_constraints: Vec<TypeVariableConstraint>,
    long_variable_constraints: Vec<LongVariableConstraint>,
    return_type: Option<TypeDescriptor>,
    argument_types: Option<Vec<TypeDescriptor>>,
    variadic: bool,
}

impl SignatureBuilder {
    /// Set the function name. May already be qualified with a `.` separator
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare a free type variable
    pub fn type_variable(mut self, constraint: TypeVariableConstraint) -> Self {
        self.type_variable_constraints.push(constraint);
        self
    }

    /// Declare a free long variable
    pub fn long_variable(mut self, constraint: LongVariableConstraint) -> Self {
        self.long_variable_constraints.push(constraint);
        self
    }

    /// Set the return type descriptor
    pub fn returns(mut self, return_type: TypeDescriptor) -> Self {
        self.return_type = Some(return_type);
        self
    }

    /// Set the full argument descriptor list. Use an empty vector for a
    /// zero-argument function
    pub fn arguments(mut self, argument_types: Vec<TypeDescriptor>) -> Self {
        self.argument_types = Some(argument_types);
        self
    }

    /// Append one argument descriptor
    pub fn argument(mut self, argument_type: TypeDescriptor) -> Self {
        self.argument_types
            .get_or_insert_with(Vec::new)
            .push(argument_type);
        self
    }

    /// Let the last declared argument repeat at the call site
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Validate and build the signature. Bare names are qualified with
    /// `default_namespace`; already-qualified names pass through unchanged
    pub fn build(self, default_namespace: &str) -> Result<Signature, SignatureError> {
        let name = self.name.ok_or(SignatureError::MissingField { field: "name" })?;
        let name = QualifiedName::qualify(default_namespace, &name);
        let return_type = self
            .return_type
            .ok_or(SignatureError::MissingField {
                field: "return_type",
            })?;
        let argument_types = self.argument_types.ok_or(SignatureError::MissingField {
            field: "argument_types",
        })?;

        // Every variable name, type and long alike, shares one scope
        let mut declared = AHashSet::default();
        for variable in self
            .type_variable_constraints
            .iter()
            .map(TypeVariableConstraint::name)
            .chain(
                self.long_variable_constraints
                    .iter()
                    .map(LongVariableConstraint::name),
            )
        {
            ensure!(
                declared.insert(variable.to_string()),
                DuplicateVariableSnafu {
                    name: name.to_string(),
                    variable
                }
            );
        }

        for constraint in &self.long_variable_constraints {
            if let Some(LongVariableBound::AtMost(other)) = constraint.bound() {
                ensure!(
                    self.long_variable_constraints
                        .iter()
                        .any(|candidate| candidate.name() == other.as_str()),
                    UndeclaredBoundSnafu {
                        name: name.to_string(),
                        variable: constraint.name(),
                        bound: other
                    }
                );
            }
        }

        let return_type = return_type.canonicalize(&declared);
        let argument_types = argument_types
            .into_iter()
            .map(|descriptor| descriptor.canonicalize(&declared))
            .collect::<Vec<_>>();

        for descriptor in std::iter::once(&return_type).chain(&argument_types) {
            if let Some(variable) = descriptor.find_undeclared(&declared) {
                return UndeclaredVariableSnafu {
                    descriptor: descriptor.to_string(),
                    name: name.to_string(),
                    variable,
                }
                .fail();
            }
        }

        Ok(Signature {
            name,
            kind: self.kind,
            type_variable_constraints: self.type_variable_constraints,
            long_variable_constraints: self.long_variable_constraints,
            return_type,
            argument_types,
            variadic: self.variadic,
        })
    }
}
