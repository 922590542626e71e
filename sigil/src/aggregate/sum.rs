//! Sum aggregate functions
//!
//! `sum` is instantiated for two input-type families: `(bigint) -> bigint`
//! with overflow-checked accumulation and `(double) -> double`. Both carry a
//! partial-state codec so a distributed plan can ship partial sums between
//! the partial and final stages

use std::sync::Arc;

use snafu::{OptionExt, ensure};

use super::{
    AggregateFunction, AggregationError, Aggregator, AggregatorState, CorruptPartialStateSnafu,
    NumericOverflowSnafu, Result, RowWidthMismatchSnafu, SpecializeFn, StateCodec,
    StateTypeMismatchSnafu, ValueTypeMismatchSnafu,
};
use crate::discovery::AggregateDefinition;
use crate::signature::type_desc::TypeDescriptor;
use crate::signature::{Signature, SignatureError};
use crate::types::{Datum, LogicalType};

/// Discovery source exporting every `sum` variant
#[derive(Debug)]
pub struct SumAggregate {
    namespace: String,
}

impl SumAggregate {
    /// Export the `sum` variants under `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl AggregateDefinition for SumAggregate {
    fn declarations(&self) -> std::result::Result<Vec<AggregateFunction>, SignatureError> {
        Ok(vec![
            declare(&self.namespace, "bigint", || Box::new(BigIntSum))?,
            declare(&self.namespace, "double", || Box::new(DoubleSum))?,
        ])
    }
}

fn declare(
    namespace: &str,
    payload: &str,
    build: fn() -> Box<dyn Aggregator>,
) -> std::result::Result<AggregateFunction, SignatureError> {
    let signature = Signature::aggregate()
        .name("sum")
        .returns(TypeDescriptor::leaf(payload))
        .arguments(vec![TypeDescriptor::leaf(payload)])
        .build(namespace)?;
    let specialize: SpecializeFn = Arc::new(move |_context: super::SpecializeContext<'_>| Ok(build()));
    AggregateFunction::try_new(signature, specialize)
}

/// Aggregation state of the sum function. The non-null count distinguishes
/// "no input at all" (a null sum) from "a sum that happens to be zero"
#[derive(Debug, Default)]
struct SumState<T> {
    sum: T,
    non_null: u64,
}

impl<T> SumState<T> {
    const ENCODED_LEN: usize = 16;
}

/// `sum(bigint) -> bigint` with overflow-checked accumulation
#[derive(Debug)]
pub struct BigIntSum;

impl Aggregator for BigIntSum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn return_type(&self) -> LogicalType {
        LogicalType::BigInt
    }

    fn init_state(&self) -> AggregatorState {
        AggregatorState::new(SumState::<i64>::default())
    }

    fn update(&self, state: &mut AggregatorState, row: &[Datum]) -> Result<()> {
        ensure!(
            row.len() == 1,
            RowWidthMismatchSnafu {
                func: "sum",
                expect: 1_usize,
                actual: row.len(),
            }
        );
        if row[0].is_null() {
            return Ok(());
        }
        let value = row[0].as_bigint().context(ValueTypeMismatchSnafu {
            func: "sum",
            expect: LogicalType::BigInt,
            actual: row[0].clone(),
        })?;

        let state = state
            .downcast_mut::<SumState<i64>>()
            .context(StateTypeMismatchSnafu { func: "sum" })?;
        state.sum = state
            .sum
            .checked_add(value)
            .context(NumericOverflowSnafu { func: "sum" })?;
        state.non_null += 1;
        Ok(())
    }

    fn combine(&self, state: &mut AggregatorState, partial: AggregatorState) -> Result<()> {
        let partial = partial
            .downcast::<SumState<i64>>()
            .map_err(|_| AggregationError::StateTypeMismatch { func: "sum" })?;
        let state = state
            .downcast_mut::<SumState<i64>>()
            .context(StateTypeMismatchSnafu { func: "sum" })?;
        state.sum = state
            .sum
            .checked_add(partial.sum)
            .context(NumericOverflowSnafu { func: "sum" })?;
        state.non_null += partial.non_null;
        Ok(())
    }

    fn finalize(&self, state: AggregatorState) -> Result<Datum> {
        let state = state
            .downcast::<SumState<i64>>()
            .map_err(|_| AggregationError::StateTypeMismatch { func: "sum" })?;
        Ok(if state.non_null == 0 {
            Datum::Null
        } else {
            Datum::BigInt(state.sum)
        })
    }

    fn state_codec(&self) -> Option<&dyn StateCodec> {
        Some(self)
    }
}

impl StateCodec for BigIntSum {
    fn serialize(&self, state: &AggregatorState) -> Result<Vec<u8>> {
        let state = state
            .downcast_ref::<SumState<i64>>()
            .context(StateTypeMismatchSnafu { func: "sum" })?;
        let mut bytes = Vec::with_capacity(SumState::<i64>::ENCODED_LEN);
        bytes.extend_from_slice(&state.sum.to_le_bytes());
        bytes.extend_from_slice(&state.non_null.to_le_bytes());
        Ok(bytes)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<AggregatorState> {
        let (sum, non_null) = decode_pair(bytes, "sum")?;
        Ok(AggregatorState::new(SumState {
            sum: i64::from_le_bytes(sum),
            non_null,
        }))
    }
}

/// `sum(double) -> double`
#[derive(Debug)]
pub struct DoubleSum;

impl Aggregator for DoubleSum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn return_type(&self) -> LogicalType {
        LogicalType::Double
    }

    fn init_state(&self) -> AggregatorState {
        AggregatorState::new(SumState::<f64>::default())
    }

    fn update(&self, state: &mut AggregatorState, row: &[Datum]) -> Result<()> {
        ensure!(
            row.len() == 1,
            RowWidthMismatchSnafu {
                func: "sum",
                expect: 1_usize,
                actual: row.len(),
            }
        );
        if row[0].is_null() {
            return Ok(());
        }
        let value = row[0].as_double().context(ValueTypeMismatchSnafu {
            func: "sum",
            expect: LogicalType::Double,
            actual: row[0].clone(),
        })?;

        let state = state
            .downcast_mut::<SumState<f64>>()
            .context(StateTypeMismatchSnafu { func: "sum" })?;
        state.sum += value;
        state.non_null += 1;
        Ok(())
    }

    fn combine(&self, state: &mut AggregatorState, partial: AggregatorState) -> Result<()> {
        let partial = partial
            .downcast::<SumState<f64>>()
            .map_err(|_| AggregationError::StateTypeMismatch { func: "sum" })?;
        let state = state
            .downcast_mut::<SumState<f64>>()
            .context(StateTypeMismatchSnafu { func: "sum" })?;
        state.sum += partial.sum;
        state.non_null += partial.non_null;
        Ok(())
    }

    fn finalize(&self, state: AggregatorState) -> Result<Datum> {
        let state = state
            .downcast::<SumState<f64>>()
            .map_err(|_| AggregationError::StateTypeMismatch { func: "sum" })?;
        Ok(if state.non_null == 0 {
            Datum::Null
        } else {
            Datum::Double(state.sum)
        })
    }

    fn state_codec(&self) -> Option<&dyn StateCodec> {
        Some(self)
    }
}

impl StateCodec for DoubleSum {
    fn serialize(&self, state: &AggregatorState) -> Result<Vec<u8>> {
        let state = state
            .downcast_ref::<SumState<f64>>()
            .context(StateTypeMismatchSnafu { func: "sum" })?;
        let mut bytes = Vec::with_capacity(SumState::<f64>::ENCODED_LEN);
        bytes.extend_from_slice(&state.sum.to_le_bytes());
        bytes.extend_from_slice(&state.non_null.to_le_bytes());
        Ok(bytes)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<AggregatorState> {
        let (sum, non_null) = decode_pair(bytes, "sum")?;
        Ok(AggregatorState::new(SumState {
            sum: f64::from_le_bytes(sum),
            non_null,
        }))
    }
}

/// Decode the `(8-byte accumulator, u64 non-null count)` layout both sum
/// codecs share
fn decode_pair(bytes: &[u8], func: &'static str) -> Result<([u8; 8], u64)> {
    ensure!(bytes.len() == 16, CorruptPartialStateSnafu { func });
    let accumulator: [u8; 8] = bytes[..8]
        .try_into()
        .map_err(|_| AggregationError::CorruptPartialState { func })?;
    let non_null: [u8; 8] = bytes[8..]
        .try_into()
        .map_err(|_| AggregationError::CorruptPartialState { func })?;
    Ok((accumulator, u64::from_le_bytes(non_null)))
}
