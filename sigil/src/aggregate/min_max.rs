//! Min/Max aggregate functions
//!
//! Declared over one orderable type variable `T` with shape `(T) -> T`.
//! Specialization resolves `T` and pulls the three-way `compare(T, T)`
//! comparator out of the function registry, so the aggregator itself stays
//! agnostic of the element type

use std::sync::Arc;

use snafu::{OptionExt, ResultExt, ensure};

use super::{
    AggregateFunction, AggregationError, Aggregator, AggregatorState, AuxiliarySnafu, Result,
    RowWidthMismatchSnafu, SpecializeContext, SpecializeError, SpecializeFn, StateTypeMismatchSnafu,
    ValueTypeMismatchSnafu,
};
use crate::registry::{Callable, FunctionQuery};
use crate::signature::constraint::TypeVariableConstraint;
use crate::signature::type_desc::TypeDescriptor;
use crate::signature::{Signature, SignatureError};
use crate::types::{Datum, LogicalType};

/// Declare the `min` aggregate under `namespace`
pub fn min(namespace: &str) -> std::result::Result<AggregateFunction, SignatureError> {
    declare::<true>(namespace)
}

/// Declare the `max` aggregate under `namespace`
pub fn max(namespace: &str) -> std::result::Result<AggregateFunction, SignatureError> {
    declare::<false>(namespace)
}

fn declare<const IS_MIN: bool>(
    namespace: &str,
) -> std::result::Result<AggregateFunction, SignatureError> {
    let signature = Signature::aggregate()
        .name(MinMax::<IS_MIN>::name_())
        .type_variable(TypeVariableConstraint::orderable("T"))
        .returns(TypeDescriptor::leaf("T"))
        .arguments(vec![TypeDescriptor::leaf("T")])
        .build(namespace)?;
    AggregateFunction::try_new(signature, Arc::new(specialize::<IS_MIN>) as SpecializeFn)
}

fn specialize<const IS_MIN: bool>(
    context: SpecializeContext<'_>,
) -> std::result::Result<Box<dyn Aggregator>, SpecializeError> {
    let payload_type = context.resolve_argument_type(0)?;
    let compare = context.functions().lookup(&FunctionQuery::new(
        "compare",
        vec![payload_type.clone(), payload_type.clone()],
    ))?;
    Ok(Box::new(MinMax::<IS_MIN> {
        payload_type,
        compare,
    }))
}

/// Aggregation state of the min/max function: the best value seen so far
#[derive(Debug)]
struct MinMaxState(Option<Datum>);

/// Min/Max aggregator
///
/// # Generic
///
/// - `IS_MIN`: if it is true, it will be the min aggregator
#[derive(Debug)]
pub struct MinMax<const IS_MIN: bool> {
    payload_type: LogicalType,
    compare: Callable,
}

/// Min aggregator
pub type Min = MinMax<true>;
/// Max aggregator
pub type Max = MinMax<false>;

impl<const IS_MIN: bool> MinMax<IS_MIN> {
    fn name_() -> &'static str {
        if IS_MIN { "min" } else { "max" }
    }

    /// Replace the incumbent if the candidate orders better. Nulls never
    /// reach this point
    fn challenge(&self, current: &mut Option<Datum>, candidate: Datum) -> Result<()> {
        let Some(incumbent) = current.as_mut() else {
            *current = Some(candidate);
            return Ok(());
        };

        let ordering = self
            .compare
            .invoke(&[candidate.clone(), incumbent.clone()])
            .context(AuxiliarySnafu { func: Self::name_() })?;
        let ordering = ordering.as_bigint().ok_or_else(|| AggregationError::Auxiliary {
            func: Self::name_(),
            source: format!("`compare` returned non-bigint value {:?}", ordering).into(),
        })?;

        if (IS_MIN && ordering < 0) || (!IS_MIN && ordering > 0) {
            *incumbent = candidate;
        }
        Ok(())
    }
}

impl<const IS_MIN: bool> Aggregator for MinMax<IS_MIN> {
    fn name(&self) -> &'static str {
        Self::name_()
    }

    fn return_type(&self) -> LogicalType {
        self.payload_type.clone()
    }

    fn init_state(&self) -> AggregatorState {
        AggregatorState::new(MinMaxState(None))
    }

    fn update(&self, state: &mut AggregatorState, row: &[Datum]) -> Result<()> {
        ensure!(
            row.len() == 1,
            RowWidthMismatchSnafu {
                func: Self::name_(),
                expect: 1_usize,
                actual: row.len(),
            }
        );
        let value = &row[0];
        if value.is_null() {
            return Ok(());
        }
        ensure!(
            value.logical_type().as_ref() == Some(&self.payload_type),
            ValueTypeMismatchSnafu {
                func: Self::name_(),
                expect: self.payload_type.clone(),
                actual: value.clone(),
            }
        );

        let state = state
            .downcast_mut::<MinMaxState>()
            .context(StateTypeMismatchSnafu {
                func: Self::name_(),
            })?;
        self.challenge(&mut state.0, value.clone())
    }

    fn combine(&self, state: &mut AggregatorState, partial: AggregatorState) -> Result<()> {
        let partial = partial
            .downcast::<MinMaxState>()
            .map_err(|_| AggregationError::StateTypeMismatch {
                func: Self::name_(),
            })?;
        let state = state
            .downcast_mut::<MinMaxState>()
            .context(StateTypeMismatchSnafu {
                func: Self::name_(),
            })?;
        match partial.0 {
            Some(candidate) => self.challenge(&mut state.0, candidate),
            None => Ok(()),
        }
    }

    fn finalize(&self, state: AggregatorState) -> Result<Datum> {
        let state = state
            .downcast::<MinMaxState>()
            .map_err(|_| AggregationError::StateTypeMismatch {
                func: Self::name_(),
            })?;
        Ok(state.0.unwrap_or(Datum::Null))
    }
}
