//! Count aggregate functions
//!
//! Two overloads share the name `count`: `count(T) -> bigint` over any type
//! including an untyped null, and the zero-argument row count. The catalog
//! tells them apart by arity

use std::sync::Arc;

use snafu::{OptionExt, ensure};

use super::{
    AggregateFunction, AggregationError, Aggregator, AggregatorState, Result,
    RowWidthMismatchSnafu, SpecializeFn, StateCodec, StateTypeMismatchSnafu,
};
use crate::discovery::AggregateDefinition;
use crate::signature::constraint::TypeVariableConstraint;
use crate::signature::type_desc::TypeDescriptor;
use crate::signature::{Signature, SignatureError};
use crate::types::{Datum, LogicalType};

/// Discovery source exporting both `count` overloads, the value form first
#[derive(Debug)]
pub struct CountAggregate {
    namespace: String,
}

impl CountAggregate {
    /// Export the `count` overloads under `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl AggregateDefinition for CountAggregate {
    fn declarations(&self) -> std::result::Result<Vec<AggregateFunction>, SignatureError> {
        Ok(vec![count(&self.namespace)?, count_star(&self.namespace)?])
    }
}

/// Declare `count(T) -> bigint` under `namespace`. Nulls are not counted
pub fn count(namespace: &str) -> std::result::Result<AggregateFunction, SignatureError> {
    let signature = Signature::aggregate()
        .name("count")
        .type_variable(TypeVariableConstraint::new("T").bindable_to_unknown())
        .returns(TypeDescriptor::leaf("bigint"))
        .arguments(vec![TypeDescriptor::leaf("T")])
        .build(namespace)?;
    let specialize: SpecializeFn =
        Arc::new(|_context: super::SpecializeContext<'_>| Ok(Box::new(Count::<false>)));
    AggregateFunction::try_new(signature, specialize)
}

/// Declare the zero-argument row count under `namespace`
pub fn count_star(namespace: &str) -> std::result::Result<AggregateFunction, SignatureError> {
    let signature = Signature::aggregate()
        .name("count")
        .returns(TypeDescriptor::leaf("bigint"))
        .arguments(vec![])
        .build(namespace)?;
    let specialize: SpecializeFn =
        Arc::new(|_context: super::SpecializeContext<'_>| Ok(Box::new(Count::<true>)));
    AggregateFunction::try_new(signature, specialize)
}

/// Aggregation state of the count function
#[derive(Debug, Default)]
struct CountState(u64);

/// Count aggregator
///
/// If the `STAR` generic is true, every row counts, nulls included
#[derive(Debug)]
pub struct Count<const STAR: bool>;

/// Count(*) aggregator
pub type CountStar = Count<true>;

impl<const STAR: bool> Aggregator for Count<STAR> {
    fn name(&self) -> &'static str {
        if STAR { "count_star" } else { "count" }
    }

    fn return_type(&self) -> LogicalType {
        LogicalType::BigInt
    }

    fn init_state(&self) -> AggregatorState {
        AggregatorState::new(CountState::default())
    }

    fn update(&self, state: &mut AggregatorState, row: &[Datum]) -> Result<()> {
        let counts = if STAR {
            true
        } else {
            ensure!(
                row.len() == 1,
                RowWidthMismatchSnafu {
                    func: self.name(),
                    expect: 1_usize,
                    actual: row.len(),
                }
            );
            !row[0].is_null()
        };
        if counts {
            state
                .downcast_mut::<CountState>()
                .context(StateTypeMismatchSnafu { func: self.name() })?
                .0 += 1;
        }
        Ok(())
    }

    fn combine(&self, state: &mut AggregatorState, partial: AggregatorState) -> Result<()> {
        let partial = partial
            .downcast::<CountState>()
            .map_err(|_| AggregationError::StateTypeMismatch { func: self.name() })?;
        state
            .downcast_mut::<CountState>()
            .context(StateTypeMismatchSnafu { func: self.name() })?
            .0 += partial.0;
        Ok(())
    }

    fn finalize(&self, state: AggregatorState) -> Result<Datum> {
        let state = state
            .downcast::<CountState>()
            .map_err(|_| AggregationError::StateTypeMismatch { func: self.name() })?;
        Ok(Datum::BigInt(state.0 as i64))
    }

    fn state_codec(&self) -> Option<&dyn StateCodec> {
        Some(self)
    }
}

impl<const STAR: bool> StateCodec for Count<STAR> {
    fn serialize(&self, state: &AggregatorState) -> Result<Vec<u8>> {
        let state = state
            .downcast_ref::<CountState>()
            .context(StateTypeMismatchSnafu { func: self.name() })?;
        Ok(state.0.to_le_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<AggregatorState> {
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| AggregationError::CorruptPartialState { func: self.name() })?;
        Ok(AggregatorState::new(CountState(u64::from_le_bytes(bytes))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::BoundVariables;
    use crate::discovery;
    use crate::registry::{BuiltinFunctionRegistry, BuiltinTypeRegistry};

    #[test]
    fn test_overloads_share_the_name() {
        let declarations = discovery::declarations(&CountAggregate::new("core")).unwrap();
        assert_eq!(declarations.len(), 2);
        assert_eq!(declarations[0].signature().to_string(), "core.count(T):bigint");
        assert_eq!(declarations[1].signature().to_string(), "core.count():bigint");
    }

    #[test]
    fn test_count_skips_nulls() {
        let declaration = count("core").unwrap();
        let aggregator = declaration
            .specialize(
                &BoundVariables::builder()
                    .set_type_variable("T", LogicalType::VarChar)
                    .build(),
                1,
                &BuiltinTypeRegistry,
                &BuiltinFunctionRegistry,
            )
            .unwrap();

        let mut state = aggregator.init_state();
        for value in [
            Datum::VarChar("a".to_string()),
            Datum::Null,
            Datum::VarChar("b".to_string()),
        ] {
            aggregator.update(&mut state, &[value]).unwrap();
        }
        assert_eq!(aggregator.finalize(state).unwrap(), Datum::BigInt(2));
    }

    #[test]
    fn test_count_star_counts_every_row() {
        let declaration = count_star("core").unwrap();
        let aggregator = declaration
            .specialize(
                &BoundVariables::builder().build(),
                0,
                &BuiltinTypeRegistry,
                &BuiltinFunctionRegistry,
            )
            .unwrap();

        let mut state = aggregator.init_state();
        for _ in 0..3 {
            aggregator.update(&mut state, &[]).unwrap();
        }
        assert_eq!(aggregator.finalize(state).unwrap(), Datum::BigInt(3));
    }

    #[test]
    fn test_combine_and_codec() {
        let aggregator: CountStar = Count::<true>;
        let mut combined = aggregator.init_state();
        let mut partial = aggregator.init_state();
        aggregator.update(&mut combined, &[]).unwrap();
        aggregator.update(&mut partial, &[]).unwrap();
        aggregator.update(&mut partial, &[]).unwrap();

        let codec = aggregator.state_codec().unwrap();
        let bytes = codec.serialize(&partial).unwrap();
        let revived = codec.deserialize(&bytes).unwrap();
        aggregator.combine(&mut combined, revived).unwrap();
        assert_eq!(aggregator.finalize(combined).unwrap(), Datum::BigInt(3));

        assert!(codec.deserialize(&[0_u8; 3]).is_err());
    }
}
