//! Aggregate function declarations and their runtime descriptors
//!
//! An [`AggregateFunction`] pairs one [`Signature`] with visibility and
//! determinism metadata and a specialization closure. Declarations are
//! process-wide and immutable; [`AggregateFunction::specialize`] turns one
//! declaration plus call-site [`BoundVariables`] into a fresh [`Aggregator`],
//! the runtime descriptor the execution engine drives. Specialization is a
//! pure function of its inputs and safe to invoke concurrently

pub mod count;
pub mod min_max;
pub mod sum;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use snafu::{OptionExt, Snafu, ensure};

use crate::bind::BoundVariables;
use crate::error::SendableError;
use crate::registry::{FunctionRegistry, RegistryError, TypeRegistry};
use crate::signature::type_desc::UnboundVariableError;
use crate::signature::{FunctionKind, KindMismatchSnafu, Signature, SignatureError};
use crate::types::{Datum, LogicalType};

/// Error specializing a declaration into a runtime aggregator
#[derive(Debug, Snafu)]
pub enum SpecializeError {
    /// The supplied bindings omit a variable the signature declares
    #[snafu(display("bindings for `{signature}` do not cover declared variable `{variable}`"))]
    IncompleteBindings {
        /// Signature, rendered
        signature: String,
        /// The first declared variable with no binding
        variable: String,
    },
    /// The call-site argument count contradicts the declared contract
    #[snafu(display(
        "`{signature}` declares {declared} argument(s){}, called with arity {actual}",
        if *variadic { " or more" } else { "" }
    ))]
    ArityMismatch {
        /// Signature, rendered
        signature: String,
        /// Declared fixed-argument count
        declared: usize,
        /// Whether the last argument repeats
        variadic: bool,
        /// Arity supplied by the call site
        actual: usize,
    },
    /// A specialization closure resolved an argument index outside the
    /// declared argument list
    #[snafu(display("`{signature}` has no argument at index {index}"))]
    ArgumentIndexOutOfRange {
        /// Signature, rendered
        signature: String,
        /// The out-of-range index
        index: usize,
    },
    /// Unknown-type and function-not-found failures, propagated unchanged
    /// from the registries
    #[snafu(transparent)]
    Registry {
        /// The registry failure
        source: RegistryError,
    },
}

/// Error raised by a running aggregator
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
pub enum AggregationError {
    #[snafu(display("`{func}` expects a row of {expect} value(s), got {actual}"))]
    RowWidthMismatch {
        func: &'static str,
        expect: usize,
        actual: usize,
    },
    #[snafu(display("`{func}` expects `{expect}` values, got `{actual:?}`"))]
    ValueTypeMismatch {
        func: &'static str,
        expect: LogicalType,
        actual: Datum,
    },
    #[snafu(display("state passed to `{func}` does not match its state layout"))]
    StateTypeMismatch { func: &'static str },
    #[snafu(display("`{func}` overflowed its accumulator"))]
    NumericOverflow { func: &'static str },
    #[snafu(display("`{func}` failed to evaluate an auxiliary function"))]
    Auxiliary {
        func: &'static str,
        source: SendableError,
    },
    #[snafu(display("`{func}` cannot deserialize the partial state"))]
    CorruptPartialState { func: &'static str },
}

/// Aggregation result
pub type Result<T> = std::result::Result<T, AggregationError>;

/// Opaque accumulator state of one aggregator instance
///
/// Each aggregator defines its own state layout; the execution engine only
/// allocates, transports and hands the state back. The concrete layout is
/// recovered with the downcast helpers
pub struct AggregatorState(Box<dyn Any + Send>);

impl AggregatorState {
    /// Wrap a concrete state
    pub fn new<S: Any + Send>(state: S) -> Self {
        Self(Box::new(state))
    }

    /// View the state as `&S`, `None` if the layout does not match
    #[inline]
    pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
        self.0.downcast_ref()
    }

    /// View the state as `&mut S`, `None` if the layout does not match
    #[inline]
    pub fn downcast_mut<S: Any>(&mut self) -> Option<&mut S> {
        self.0.downcast_mut()
    }

    /// Consume the state, `Err(self)` if the layout does not match
    pub fn downcast<S: Any>(self) -> std::result::Result<S, Self> {
        match self.0.downcast::<S>() {
            Ok(state) => Ok(*state),
            Err(boxed) => Err(Self(boxed)),
        }
    }
}

impl Debug for AggregatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AggregatorState")
    }
}

/// Serialization pair for shipping partial states between the partial and
/// final stages of a distributed aggregation
pub trait StateCodec: Debug + Send + Sync {
    /// Encode a partial state for transport
    fn serialize(&self, state: &AggregatorState) -> Result<Vec<u8>>;

    /// Decode a transported partial state
    fn deserialize(&self, bytes: &[u8]) -> Result<AggregatorState>;
}

/// Runtime aggregation descriptor produced by specialization
///
/// One instance is owned by one execution-engine operator. The descriptor
/// itself is stateless; all accumulation happens inside the
/// [`AggregatorState`]s it creates, so a single descriptor may drive many
/// states (one per group) at once
pub trait Aggregator: Debug + Send + Sync {
    /// Name of the aggregation, for diagnostics
    fn name(&self) -> &'static str;

    /// Concrete output type
    fn return_type(&self) -> LogicalType;

    /// Create a fresh accumulator state
    fn init_state(&self) -> AggregatorState;

    /// Fold one input row into the state
    fn update(&self, state: &mut AggregatorState, row: &[Datum]) -> Result<()>;

    /// Merge a partial state produced by another instance of the same
    /// descriptor into `state`. Required for distributed partial/final
    /// aggregation
    fn combine(&self, state: &mut AggregatorState, partial: AggregatorState) -> Result<()>;

    /// Consume the state and produce the aggregate output value
    fn finalize(&self, state: AggregatorState) -> Result<Datum>;

    /// Serialization pair for partial-state transport. `None` when the
    /// partial state cannot leave the process
    fn state_codec(&self) -> Option<&dyn StateCodec> {
        None
    }
}

/// Everything a specialization closure may consult
pub struct SpecializeContext<'a> {
    signature: &'a Signature,
    bindings: &'a BoundVariables,
    arity: usize,
    types: &'a dyn TypeRegistry,
    functions: &'a dyn FunctionRegistry,
}

impl Debug for SpecializeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecializeContext")
            .field("signature", &self.signature)
            .field("bindings", &self.bindings)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl<'a> SpecializeContext<'a> {
    /// The declaration's signature
    #[inline]
    pub fn signature(&self) -> &'a Signature {
        self.signature
    }

    /// Call-site bindings, complete over the declared variables
    #[inline]
    pub fn bindings(&self) -> &'a BoundVariables {
        self.bindings
    }

    /// Call-site argument count, already checked against the contract
    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The type registry of the surrounding runtime
    #[inline]
    pub fn types(&self) -> &'a dyn TypeRegistry {
        self.types
    }

    /// The function registry of the surrounding runtime
    #[inline]
    pub fn functions(&self) -> &'a dyn FunctionRegistry {
        self.functions
    }

    /// Resolve the signature's return descriptor, with the bindings applied,
    /// into a concrete type
    pub fn resolve_return_type(&self) -> std::result::Result<LogicalType, SpecializeError> {
        self.resolve(self.signature.return_type())
    }

    /// Resolve the `index`-th argument descriptor, with the bindings applied,
    /// into a concrete type. On a variadic signature, indices at or past the
    /// fixed-argument count resolve the repeated last argument. An index with
    /// no argument behind it fails instead of resolving
    pub fn resolve_argument_type(
        &self,
        index: usize,
    ) -> std::result::Result<LogicalType, SpecializeError> {
        let arguments = self.signature.argument_types();
        let descriptor = if self.signature.is_variadic() && index >= arguments.len() {
            arguments.last()
        } else {
            arguments.get(index)
        }
        .context(ArgumentIndexOutOfRangeSnafu {
            signature: self.signature.to_string(),
            index,
        })?;
        self.resolve(descriptor)
    }

    fn resolve(
        &self,
        descriptor: &crate::signature::type_desc::TypeDescriptor,
    ) -> std::result::Result<LogicalType, SpecializeError> {
        let closed = descriptor
            .substitute(self.bindings)
            .map_err(|UnboundVariableError { name }| SpecializeError::IncompleteBindings {
                signature: self.signature.to_string(),
                variable: name,
            })?;
        Ok(self.types.resolve(&closed)?)
    }
}

/// Specialization closure supplied at registration time
pub type SpecializeFn = Arc<
    dyn Fn(SpecializeContext<'_>) -> std::result::Result<Box<dyn Aggregator>, SpecializeError>
        + Send
        + Sync,
>;

/// Declaration of one aggregate function
///
/// Created once at registration, immutable and shared afterwards. The only
/// state transition is declared -> specialized, which never mutates or
/// consumes the declaration: a declaration may be specialized zero, one or
/// many times, concurrently
#[derive(Clone)]
pub struct AggregateFunction {
    signature: Arc<Signature>,
    hidden: bool,
    specialize: SpecializeFn,
}

impl Debug for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateFunction")
            .field("signature", &self.signature)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

impl AggregateFunction {
    /// Declare an aggregate function. Fails with a kind mismatch when the
    /// signature was built for any other function kind
    pub fn try_new(
        signature: Signature,
        specialize: SpecializeFn,
    ) -> std::result::Result<Self, SignatureError> {
        ensure!(
            signature.kind() == FunctionKind::Aggregate,
            KindMismatchSnafu {
                expect: FunctionKind::Aggregate,
                found: signature.kind(),
                name: signature.name().to_string(),
            }
        );

        Ok(Self {
            signature: Arc::new(signature),
            hidden: false,
            specialize,
        })
    }

    /// Hide the declaration: it stays resolvable by exact qualified name but
    /// the catalog excludes it from enumeration
    pub fn hide(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// The fixed signature of the declaration
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Is the declaration excluded from catalog listings? Hidden declarations
    /// remain resolvable by exact qualified name during planning
    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Aggregates in this model are always deterministic
    #[inline]
    pub fn is_deterministic(&self) -> bool {
        true
    }

    /// Specialize the declaration into a runtime aggregator
    ///
    /// `bindings` must cover every variable the signature declares and
    /// `arity` must match the declared argument contract: exactly the
    /// declared count for a fixed-arity signature, at least the
    /// fixed-argument count for a variadic one. Registry failures propagate
    /// unchanged
    ///
    /// Pure over its inputs: equal inputs yield behaviorally equivalent
    /// aggregators, and concurrent calls never share mutable state
    pub fn specialize(
        &self,
        bindings: &BoundVariables,
        arity: usize,
        types: &dyn TypeRegistry,
        functions: &dyn FunctionRegistry,
    ) -> std::result::Result<Box<dyn Aggregator>, SpecializeError> {
        for constraint in self.signature.type_variable_constraints() {
            ensure!(
                bindings.type_variable(constraint.name()).is_some(),
                IncompleteBindingsSnafu {
                    signature: self.signature.to_string(),
                    variable: constraint.name(),
                }
            );
        }
        for constraint in self.signature.long_variable_constraints() {
            ensure!(
                bindings.long_variable(constraint.name()).is_some(),
                IncompleteBindingsSnafu {
                    signature: self.signature.to_string(),
                    variable: constraint.name(),
                }
            );
        }

        let declared = self.signature.argument_types().len();
        let arity_matches = if self.signature.is_variadic() {
            arity >= declared
        } else {
            arity == declared
        };
        ensure!(
            arity_matches,
            ArityMismatchSnafu {
                signature: self.signature.to_string(),
                declared,
                variadic: self.signature.is_variadic(),
                actual: arity,
            }
        );

        tracing::debug!(
            "Specializing `{}` with arity {}",
            self.signature,
            arity
        );

        (self.specialize)(SpecializeContext {
            signature: &self.signature,
            bindings,
            arity,
            types,
            functions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BuiltinFunctionRegistry, BuiltinTypeRegistry, Callable, FunctionQuery};
    use crate::signature::constraint::{LongVariableConstraint, TypeVariableConstraint};
    use crate::signature::type_desc::TypeDescriptor;

    /// Aggregator used by tests: counts updates, nothing else
    #[derive(Debug)]
    struct Probe;

    impl Aggregator for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn return_type(&self) -> LogicalType {
            LogicalType::BigInt
        }

        fn init_state(&self) -> AggregatorState {
            AggregatorState::new(0_i64)
        }

        fn update(&self, state: &mut AggregatorState, _row: &[Datum]) -> Result<()> {
            *state
                .downcast_mut::<i64>()
                .ok_or(AggregationError::StateTypeMismatch { func: "probe" })? += 1;
            Ok(())
        }

        fn combine(&self, state: &mut AggregatorState, partial: AggregatorState) -> Result<()> {
            let partial = partial
                .downcast::<i64>()
                .map_err(|_| AggregationError::StateTypeMismatch { func: "probe" })?;
            *state
                .downcast_mut::<i64>()
                .ok_or(AggregationError::StateTypeMismatch { func: "probe" })? += partial;
            Ok(())
        }

        fn finalize(&self, state: AggregatorState) -> Result<Datum> {
            state
                .downcast::<i64>()
                .map(Datum::BigInt)
                .map_err(|_| AggregationError::StateTypeMismatch { func: "probe" })
        }
    }

    fn probe_specialize() -> SpecializeFn {
        Arc::new(|_context| Ok(Box::new(Probe) as Box<dyn Aggregator>))
    }

    fn generic_signature(variadic: bool) -> Signature {
        let builder = Signature::aggregate()
            .name("probe")
            .type_variable(TypeVariableConstraint::orderable("T"))
            .long_variable(LongVariableConstraint::new("p"))
            .long_variable(LongVariableConstraint::at_most("s", "p"))
            .returns(TypeDescriptor::leaf("T"))
            .arguments(vec![
                TypeDescriptor::leaf("T"),
                TypeDescriptor::parse("decimal(p, s)").unwrap(),
            ]);
        let builder = if variadic { builder.variadic() } else { builder };
        builder.build("core").unwrap()
    }

    fn complete_bindings() -> BoundVariables {
        BoundVariables::builder()
            .set_type_variable("T", LogicalType::BigInt)
            .set_long_variable("p", 10)
            .set_long_variable("s", 2)
            .build()
    }

    #[test]
    fn test_default_flags() {
        let declaration =
            AggregateFunction::try_new(generic_signature(false), probe_specialize()).unwrap();
        assert!(!declaration.is_hidden());
        assert!(declaration.is_deterministic());
        assert!(declaration.hide().is_hidden());
    }

    #[test]
    fn test_non_aggregate_kind_is_rejected() {
        for kind in [FunctionKind::Scalar, FunctionKind::Window] {
            let signature = Signature::builder(kind)
                .name("probe")
                .returns(TypeDescriptor::leaf("bigint"))
                .arguments(vec![TypeDescriptor::leaf("bigint")])
                .build("core")
                .unwrap();
            let err = AggregateFunction::try_new(signature, probe_specialize()).unwrap_err();
            assert!(matches!(err, SignatureError::KindMismatch { .. }));
        }
    }

    #[test]
    fn test_incomplete_bindings_each_variable() {
        let declaration =
            AggregateFunction::try_new(generic_signature(false), probe_specialize()).unwrap();
        let types = BuiltinTypeRegistry;
        let functions = BuiltinFunctionRegistry;

        // Omitting any single declared variable names exactly that variable
        let cases: [(&str, BoundVariables); 3] = [
            (
                "T",
                BoundVariables::builder()
                    .set_long_variable("p", 10)
                    .set_long_variable("s", 2)
                    .build(),
            ),
            (
                "p",
                BoundVariables::builder()
                    .set_type_variable("T", LogicalType::BigInt)
                    .set_long_variable("s", 2)
                    .build(),
            ),
            (
                "s",
                BoundVariables::builder()
                    .set_type_variable("T", LogicalType::BigInt)
                    .set_long_variable("p", 10)
                    .build(),
            ),
        ];
        for (missing, bindings) in cases {
            let err = declaration
                .specialize(&bindings, 2, &types, &functions)
                .unwrap_err();
            match err {
                SpecializeError::IncompleteBindings { variable, .. } => {
                    assert_eq!(variable, missing)
                }
                other => panic!("expect IncompleteBindings, got {other}"),
            }
        }
    }

    #[test]
    fn test_fixed_arity_contract() {
        let declaration =
            AggregateFunction::try_new(generic_signature(false), probe_specialize()).unwrap();
        let types = BuiltinTypeRegistry;
        let functions = BuiltinFunctionRegistry;
        let bindings = complete_bindings();

        for arity in [0, 1, 3] {
            let err = declaration
                .specialize(&bindings, arity, &types, &functions)
                .unwrap_err();
            assert!(matches!(err, SpecializeError::ArityMismatch { .. }));
        }
        assert!(declaration.specialize(&bindings, 2, &types, &functions).is_ok());
    }

    #[test]
    fn test_variadic_arity_contract() {
        let declaration =
            AggregateFunction::try_new(generic_signature(true), probe_specialize()).unwrap();
        let types = BuiltinTypeRegistry;
        let functions = BuiltinFunctionRegistry;
        let bindings = complete_bindings();

        for arity in [0, 1] {
            let err = declaration
                .specialize(&bindings, arity, &types, &functions)
                .unwrap_err();
            assert!(matches!(err, SpecializeError::ArityMismatch { .. }));
        }
        for arity in [2, 3, 17] {
            assert!(
                declaration
                    .specialize(&bindings, arity, &types, &functions)
                    .is_ok()
            );
        }
    }

    #[test]
    fn test_arity_mismatch_message() {
        let declaration =
            AggregateFunction::try_new(generic_signature(true), probe_specialize()).unwrap();
        let err = declaration
            .specialize(
                &complete_bindings(),
                1,
                &BuiltinTypeRegistry,
                &BuiltinFunctionRegistry,
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`core.probe(T, decimal(p, s)...):T` declares 2 argument(s) or more, called with arity 1"
        );
    }

    #[test]
    fn test_context_resolves_bound_descriptors() {
        let signature = generic_signature(false);
        let declaration = AggregateFunction::try_new(
            signature,
            Arc::new(|context: SpecializeContext<'_>| {
                assert_eq!(context.resolve_return_type()?, LogicalType::BigInt);
                assert_eq!(context.resolve_argument_type(0)?, LogicalType::BigInt);
                assert_eq!(
                    context.resolve_argument_type(1)?,
                    LogicalType::Decimal {
                        precision: 10,
                        scale: 2
                    }
                );
                Ok(Box::new(Probe) as Box<dyn Aggregator>)
            }),
        )
        .unwrap();

        declaration
            .specialize(
                &complete_bindings(),
                2,
                &BuiltinTypeRegistry,
                &BuiltinFunctionRegistry,
            )
            .unwrap();
    }

    #[test]
    fn test_resolve_argument_index_out_of_range() {
        // A variadic signature may declare zero fixed arguments; resolving
        // any index then has no descriptor to repeat
        let signature = Signature::aggregate()
            .name("probe")
            .returns(TypeDescriptor::leaf("bigint"))
            .arguments(vec![])
            .variadic()
            .build("core")
            .unwrap();
        let declaration = AggregateFunction::try_new(
            signature,
            Arc::new(|context: SpecializeContext<'_>| {
                context.resolve_argument_type(0)?;
                unreachable!("resolution must fail")
            }),
        )
        .unwrap();
        let err = declaration
            .specialize(
                &BoundVariables::builder().build(),
                0,
                &BuiltinTypeRegistry,
                &BuiltinFunctionRegistry,
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`core.probe(...):bigint` has no argument at index 0"
        );

        // Out of range on a fixed-arity signature fails the same way
        let declaration = AggregateFunction::try_new(
            generic_signature(false),
            Arc::new(|context: SpecializeContext<'_>| {
                context.resolve_argument_type(2)?;
                unreachable!("resolution must fail")
            }),
        )
        .unwrap();
        let err = declaration
            .specialize(
                &complete_bindings(),
                2,
                &BuiltinTypeRegistry,
                &BuiltinFunctionRegistry,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SpecializeError::ArgumentIndexOutOfRange { index: 2, .. }
        ));
    }

    #[test]
    fn test_unknown_type_propagates_from_registry() {
        let signature = Signature::aggregate()
            .name("probe")
            .returns(TypeDescriptor::leaf("geometry"))
            .arguments(vec![TypeDescriptor::leaf("geometry")])
            .build("core")
            .unwrap();
        let declaration = AggregateFunction::try_new(
            signature,
            Arc::new(|context: SpecializeContext<'_>| {
                context.resolve_return_type()?;
                unreachable!("resolution must fail")
            }),
        )
        .unwrap();

        let err = declaration
            .specialize(
                &BoundVariables::builder().build(),
                1,
                &BuiltinTypeRegistry,
                &BuiltinFunctionRegistry,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown type `geometry`");
    }

    #[test]
    fn test_function_not_found_propagates_from_registry() {
        struct Empty;
        impl FunctionRegistry for Empty {
            fn lookup(
                &self,
                query: &FunctionQuery,
            ) -> std::result::Result<Callable, crate::registry::RegistryError> {
                crate::registry::FunctionNotFoundSnafu {
                    name: query.name(),
                    argument_types: query.argument_types().to_vec(),
                }
                .fail()
            }
        }

        let declaration = AggregateFunction::try_new(
            generic_signature(false),
            Arc::new(|context: SpecializeContext<'_>| {
                let argument = context.resolve_argument_type(0)?;
                context
                    .functions()
                    .lookup(&FunctionQuery::new("compare", vec![argument.clone(), argument]))?;
                unreachable!("lookup must fail")
            }),
        )
        .unwrap();

        let err = declaration
            .specialize(&complete_bindings(), 2, &BuiltinTypeRegistry, &Empty)
            .unwrap_err();
        assert!(matches!(
            err,
            SpecializeError::Registry {
                source: crate::registry::RegistryError::FunctionNotFound { .. }
            }
        ));
    }

    #[test]
    fn test_specialization_is_repeatable() {
        let declaration =
            AggregateFunction::try_new(generic_signature(false), probe_specialize()).unwrap();
        let bindings = complete_bindings();
        let types = BuiltinTypeRegistry;
        let functions = BuiltinFunctionRegistry;

        let run = || {
            let aggregator = declaration
                .specialize(&bindings, 2, &types, &functions)
                .unwrap();
            let mut state = aggregator.init_state();
            for value in [3_i64, 1, 4] {
                aggregator
                    .update(&mut state, &[Datum::BigInt(value), Datum::Null])
                    .unwrap();
            }
            aggregator.finalize(state).unwrap()
        };

        // Two specializations with equal inputs behave identically
        assert_eq!(run(), run());
    }
}
