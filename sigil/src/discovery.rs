//! Discovery adapter contract
//!
//! Any mechanism that produces declarations (a builtin table, a plugin
//! manifest, generated code) plugs in through [`AggregateDefinition`]: an
//! explicit registration surface where the implementer assembles signatures
//! and specialization closures, instead of the runtime introspecting an
//! implementation class. The helpers here enforce the cardinality a caller
//! expects from a source

use snafu::{Snafu, ensure};

use crate::aggregate::AggregateFunction;
use crate::signature::SignatureError;

/// A source of aggregate function declarations
pub trait AggregateDefinition {
    /// Every declaration this source exports, in declaration order. A source
    /// may export several when the same aggregate is instantiated for
    /// multiple input-type families
    fn declarations(&self) -> Result<Vec<AggregateFunction>, SignatureError>;
}

/// Error extracting declarations from a definition source
#[derive(Debug, Snafu)]
pub enum DiscoveryError {
    /// The source exports nothing
    #[snafu(display("definition source exports no aggregate signature"))]
    MissingDefinition,
    /// The source exports several signatures where exactly one was expected
    #[snafu(display(
        "definition source exports {count} aggregate signatures, exactly one expected"
    ))]
    AmbiguousDefinition {
        /// How many signatures the source exports
        count: usize,
    },
    /// A declaration of the source failed to construct
    #[snafu(transparent)]
    Definition {
        /// The construction failure
        source: SignatureError,
    },
}

/// Extract the single declaration of a source known to export exactly one
/// signature. Fails when the source exports zero or more than one
pub fn single_declaration(
    definition: &dyn AggregateDefinition,
) -> Result<AggregateFunction, DiscoveryError> {
    let mut declarations = definition.declarations()?;
    ensure!(
        declarations.len() <= 1,
        AmbiguousDefinitionSnafu {
            count: declarations.len()
        }
    );
    declarations.pop().ok_or(DiscoveryError::MissingDefinition)
}

/// Extract every declaration of a source, in declaration order
pub fn declarations(
    definition: &dyn AggregateDefinition,
) -> Result<Vec<AggregateFunction>, DiscoveryError> {
    Ok(definition.declarations()?)
}
