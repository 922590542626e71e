#![warn(clippy::todo)]
#![deny(
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    rustdoc::private_intra_doc_links,
    rust_2018_idioms,
    missing_docs,
    clippy::needless_borrow,
    clippy::redundant_clone,
    missing_debug_implementations
)]

//! # Sigil
//!
//! `Sigil` is the function-signature model used by a SQL function catalog to
//! declare polymorphic aggregate functions and specialize them, at
//! call-resolution time, into concrete runtime aggregators.
//!
//! The flow through the crate:
//!
//! 1. [`signature::type_desc::TypeDescriptor`]s and the constraint model in
//!    [`signature::constraint`] compose into an immutable [`signature::Signature`]
//!    when a function is registered.
//! 2. An external binder unifies call-site argument types against the
//!    signature's constraints and produces [`bind::BoundVariables`].
//! 3. [`aggregate::AggregateFunction::specialize`] consumes the bindings,
//!    together with the [`registry::TypeRegistry`] and
//!    [`registry::FunctionRegistry`], and yields a runtime
//!    [`aggregate::Aggregator`] for the execution engine.
//!
//! Signatures and declarations are immutable after construction and safe to
//! share across planning and execution threads without synchronization.

pub mod aggregate;
pub mod bind;
pub mod discovery;
pub mod error;
pub mod registry;
pub mod signature;
pub mod types;

/// Hash map used across the crate, same hasher for every build
pub(crate) type AHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
/// Hash set used across the crate
pub(crate) type AHashSet<T> = hashbrown::HashSet<T, ahash::RandomState>;
