// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types of the idhive identity directory.
//!
//! Groups form a hierarchical namespace addressed by slash-delimited
//! [`GroupPath`]s. Entities are members of groups and carry directly-assigned
//! [`Attribute`]s per group. On top of that, every [`Group`] holds an ordered
//! list of [`AttributeStatement`]s: conditional rules which compute further
//! attributes for the group's members. [`AttributesClass`] definitions
//! constrain which attributes an entity may or must hold within a group.
//!
//! This crate contains data types and their validation only. Persistence
//! interfaces live in `idhive-store`, statement evaluation in
//! `idhive-engine`.

mod attribute;
mod attribute_class;
mod attribute_type;
mod group;
mod identity;
mod path;
mod statement;

pub use attribute::{Attribute, AttributeExt, Provenance};
pub use attribute_class::{AttributesClass, ClassError, EffectiveClass};
pub use attribute_type::{
    AttributeType, AttributeTypeRegistry, AttributeValueSyntax, ValueError,
};
pub use group::Group;
pub use identity::{EntityId, Identity};
pub use path::{GroupPath, PathError};
pub use statement::{AttributeStatement, ConflictResolution, StatementAssignment, StatementError};
