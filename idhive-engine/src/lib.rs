// SPDX-License-Identifier: MIT OR Apache-2.0

//! The idhive statement evaluation engine.
//!
//! Attributes of an entity within a group are either assigned directly or
//! computed by [attribute statements](idhive_core::AttributeStatement)
//! attached to the groups on the path from the root down to the group in
//! question. The [`StatementResolver`] walks that path, evaluates every
//! group's statements in order through a pluggable [`ExpressionEvaluator`],
//! applies conflict resolution and returns the effective attribute set.
//!
//! Statements may pull in the resolved attributes of *another* group
//! ("extra attributes group"). References can point anywhere in the tree
//! and may form cycles; resolution bounds the recursion with a visited set
//! and a depth limit so that cyclic statement pairs simply contribute
//! nothing.
//!
//! The remaining pieces keep the directory consistent around the resolver:
//! the [`maintenance`] sweep drops statements orphaned by removed attribute
//! types or groups, the [`classes`] validator enforces attribute-class
//! constraints, and [`Directory`] ties writes and validation together over
//! a store.

pub mod classes;
mod context;
mod evaluator;
mod manager;
pub mod maintenance;
mod resolver;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use context::ResolutionContext;
pub use evaluator::{ExpressionError, ExpressionEvaluator, StatementContext};
pub use manager::{Directory, DirectoryError};
pub use resolver::{ResolveError, ResolverConfig, StatementResolver};
