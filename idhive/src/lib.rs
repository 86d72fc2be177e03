// SPDX-License-Identifier: MIT OR Apache-2.0

//! Meta-crate re-exporting the idhive identity directory stack.
//!
//! - [`core`]: directory data types, from groups and attributes to
//!   attribute classes.
//! - [`store`]: persistence interfaces and the in-memory store.
//! - [`engine`]: the statement evaluation engine, consistency sweep,
//!   class validation and the directory management surface.

pub use idhive_core as core;
pub use idhive_engine as engine;
pub use idhive_store as store;
