// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic helpers for testing engines and embedders: a small
//! expression interpreter implementing the [`ExpressionEvaluator`]
//! contract, and fixture builders.
//!
//! [`ExpressionEvaluator`]: crate::ExpressionEvaluator

mod expression;

pub use expression::TestEvaluator;

use idhive_core::{AttributeType, GroupPath};

/// Single-valued text attribute type with a small value limit.
pub fn bounded_type(name: &str) -> AttributeType {
    AttributeType::new(name).with_bounds(1, Some(5))
}

/// Text attribute type without an upper value bound; `merge` conflict
/// resolution only applies to such types.
pub fn unbounded_type(name: &str) -> AttributeType {
    AttributeType::new(name).with_bounds(1, None)
}

/// Parse a known-good group path.
pub fn path(value: &str) -> GroupPath {
    GroupPath::parse(value).unwrap()
}

/// Install a `tracing` subscriber honoring `RUST_LOG`, once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
