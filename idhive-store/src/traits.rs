// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use idhive_core::{
    Attribute, AttributeType, AttributesClass, EntityId, Group, GroupPath, Identity,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown group {0}")]
    UnknownGroup(GroupPath),

    #[error("group {0} already exists")]
    GroupExists(GroupPath),

    #[error("the root group cannot be removed")]
    RootRemoval,

    #[error("group {0} contains subgroups")]
    GroupNotEmpty(GroupPath),

    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    #[error("entity {entity} is not a member of {group}")]
    NotMember { entity: EntityId, group: GroupPath },

    #[error("entity {entity} is already a member of {group}")]
    AlreadyMember { entity: EntityId, group: GroupPath },

    #[error("entity {entity} is not a member of the parent of {group}")]
    ParentMembershipRequired { entity: EntityId, group: GroupPath },

    #[error("entities cannot be removed from the root group")]
    RootMembership,

    #[error("unknown attribute type '{0}'")]
    UnknownAttributeType(String),

    #[error("attribute type '{0}' already exists")]
    AttributeTypeExists(String),

    #[error("unknown attributes class '{0}'")]
    UnknownClass(String),

    #[error("attributes class '{0}' already exists")]
    ClassExists(String),

    #[error("write contention: {0}")]
    Contention(String),
}

/// Group tree storage.
///
/// Implementations maintain the tree invariants: the root group always
/// exists, a group's parent exists before the group does, the root is never
/// removed and non-recursive removal of a non-empty group fails.
pub trait GroupStore {
    fn insert_group(&mut self, group: Group) -> Result<(), StoreError>;

    /// Replace the stored group (statements, classes, description) under
    /// the same path.
    fn update_group(&mut self, group: Group) -> Result<(), StoreError>;

    fn remove_group(&mut self, path: &GroupPath, recursive: bool) -> Result<(), StoreError>;

    fn get_group(&self, path: &GroupPath) -> Result<Option<Group>, StoreError>;

    /// All groups, parents before children.
    fn all_groups(&self) -> Result<Vec<Group>, StoreError>;

    fn child_groups(&self, path: &GroupPath) -> Result<Vec<GroupPath>, StoreError>;
}

/// Attribute type definitions.
pub trait AttributeTypeStore {
    fn insert_attribute_type(&mut self, attribute_type: AttributeType) -> Result<(), StoreError>;

    /// Remove a type definition together with all direct attribute
    /// instances of it. Statements referencing the type are left in place;
    /// the consistency sweeper removes them later.
    fn remove_attribute_type(&mut self, name: &str) -> Result<(), StoreError>;

    fn get_attribute_type(&self, name: &str) -> Result<Option<AttributeType>, StoreError>;

    fn all_attribute_types(&self) -> Result<Vec<AttributeType>, StoreError>;
}

/// Directly-assigned attributes of entities, keyed by entity and group.
pub trait AttributeStore {
    fn set_attribute(&mut self, entity: EntityId, attribute: Attribute) -> Result<(), StoreError>;

    /// Returns `true` when an attribute was removed.
    fn remove_attribute(
        &mut self,
        entity: EntityId,
        group: &GroupPath,
        name: &str,
    ) -> Result<bool, StoreError>;

    fn attributes_in_group(
        &self,
        entity: EntityId,
        group: &GroupPath,
    ) -> Result<Vec<Attribute>, StoreError>;

    fn attributes_by_group(
        &self,
        entity: EntityId,
    ) -> Result<BTreeMap<GroupPath, Vec<Attribute>>, StoreError>;
}

/// Entities and their group memberships.
///
/// Every entity is implicitly a member of the root group; joining any other
/// group requires membership of its parent first. Removing a member from a
/// group also removes it from all subgroups and drops its direct attributes
/// and class assignments there.
pub trait MembershipStore {
    fn add_entity(&mut self, identities: Vec<Identity>) -> Result<EntityId, StoreError>;

    fn identities(&self, entity: EntityId) -> Result<Vec<Identity>, StoreError>;

    fn add_member(&mut self, group: &GroupPath, entity: EntityId) -> Result<(), StoreError>;

    fn remove_member(&mut self, group: &GroupPath, entity: EntityId) -> Result<(), StoreError>;

    fn member_groups(&self, entity: EntityId) -> Result<BTreeSet<GroupPath>, StoreError>;

    fn members(&self, group: &GroupPath) -> Result<Vec<EntityId>, StoreError>;

    fn is_member(&self, entity: EntityId, group: &GroupPath) -> Result<bool, StoreError>;
}

/// Attribute class catalogue and per-(entity, group) class assignments.
pub trait ClassStore {
    fn insert_class(&mut self, class: AttributesClass) -> Result<(), StoreError>;

    fn update_class(&mut self, class: AttributesClass) -> Result<(), StoreError>;

    fn remove_class(&mut self, name: &str) -> Result<(), StoreError>;

    fn get_class(&self, name: &str) -> Result<Option<AttributesClass>, StoreError>;

    fn all_classes(&self) -> Result<BTreeMap<String, AttributesClass>, StoreError>;

    fn set_entity_classes(
        &mut self,
        entity: EntityId,
        group: &GroupPath,
        classes: BTreeSet<String>,
    ) -> Result<(), StoreError>;

    fn entity_classes(
        &self,
        entity: EntityId,
        group: &GroupPath,
    ) -> Result<BTreeSet<String>, StoreError>;

    /// True when any entity has the class assigned in any group.
    fn is_class_assigned(&self, name: &str) -> Result<bool, StoreError>;
}
