// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use idhive_core::{
    Attribute, AttributeExt, AttributeType, AttributeTypeRegistry, AttributesClass, EntityId,
    Group, GroupPath, Identity, StatementAssignment, StatementError,
};
use idhive_store::{
    AttributeStore, AttributeTypeStore, ClassStore, GroupStore, MembershipStore, MemoryStore,
    StoreError,
};

use crate::classes::{self, ClassValidationError};
use crate::context::ResolutionContext;
use crate::evaluator::{ExpressionError, ExpressionEvaluator};
use crate::maintenance;
use crate::resolver::{ResolveError, ResolverConfig, StatementResolver};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid statement: {0}")]
    Statement(#[from] StatementError),

    #[error("invalid statement expression: {0}")]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Constraint(#[from] ClassValidationError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("entity {entity} is not a member of {group}")]
    NotMember { entity: EntityId, group: GroupPath },

    #[error("attribute '{attribute}' has {actual} values, outside the type's bounds")]
    ValueCount { attribute: String, actual: usize },

    #[error(transparent)]
    Value(#[from] idhive_core::ValueError),

    #[error("attribute '{0}' does not belong to group {1}")]
    AttributeGroupMismatch(String, GroupPath),
}

/// The management surface over the engine: every write goes through the
/// validation the data model demands, every read of effective attributes
/// goes through the statement resolver on a consistent snapshot.
#[derive(Debug)]
pub struct Directory<E> {
    store: MemoryStore,
    evaluator: E,
    reserved_types: BTreeSet<String>,
    resolver_config: ResolverConfig,
}

impl<E> Directory<E>
where
    E: ExpressionEvaluator,
{
    pub fn new(evaluator: E) -> Self {
        Self {
            store: MemoryStore::new(),
            evaluator,
            reserved_types: BTreeSet::new(),
            resolver_config: ResolverConfig::default(),
        }
    }

    /// Mark attribute type names as system-reserved: they can never be the
    /// target of an attribute statement.
    pub fn with_reserved_types(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.reserved_types = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_resolver_config(mut self, config: ResolverConfig) -> Self {
        self.resolver_config = config;
        self
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn registry(&self) -> Result<AttributeTypeRegistry, StoreError> {
        Ok(AttributeTypeRegistry::new(
            self.store.all_attribute_types()?,
            self.reserved_types.iter().cloned(),
        ))
    }

    pub fn add_attribute_type(&mut self, attribute_type: AttributeType) -> Result<(), DirectoryError> {
        self.store.insert_attribute_type(attribute_type)?;
        Ok(())
    }

    /// Remove an attribute type and all its direct instances. Statements
    /// targeting the type stay behind as dead rules until [`Self::sweep`]
    /// drops them.
    pub fn remove_attribute_type(&mut self, name: &str) -> Result<(), DirectoryError> {
        self.store.remove_attribute_type(name)?;
        Ok(())
    }

    pub fn add_group(&mut self, path: GroupPath) -> Result<(), DirectoryError> {
        self.store.insert_group(Group::new(path))?;
        Ok(())
    }

    /// Replace a group definition. All statements are validated against the
    /// attribute type registry and the expression evaluator; the group's
    /// class set is validated against its members' current attributes.
    pub fn update_group(&mut self, group: Group) -> Result<(), DirectoryError> {
        let registry = self.registry()?;
        for statement in &group.statements {
            statement.validate(&group.path, &registry)?;
            self.evaluator.validate(&statement.condition)?;
            if let StatementAssignment::Dynamic { expression, .. } = &statement.assignment {
                self.evaluator.validate(expression)?;
            }
        }
        classes::validate_group_classes(&self.store, &group)?;
        self.store.update_group(group)?;
        Ok(())
    }

    pub fn remove_group(&mut self, path: &GroupPath, recursive: bool) -> Result<(), DirectoryError> {
        self.store.remove_group(path, recursive)?;
        Ok(())
    }

    pub fn add_entity(&mut self, identities: Vec<Identity>) -> Result<EntityId, DirectoryError> {
        Ok(self.store.add_entity(identities)?)
    }

    pub fn add_member(&mut self, group: &GroupPath, entity: EntityId) -> Result<(), DirectoryError> {
        self.add_member_with_attributes(group, entity, Vec::new())
    }

    /// Add an entity to a group, optionally with an initial attribute set.
    /// The initial set must satisfy the group's class constraints: a group
    /// with mandatory attributes cannot be joined without them.
    pub fn add_member_with_attributes(
        &mut self,
        group: &GroupPath,
        entity: EntityId,
        initial_attributes: Vec<Attribute>,
    ) -> Result<(), DirectoryError> {
        let effective = classes::effective_for(&self.store, entity, group)?;
        let names: BTreeSet<String> = initial_attributes
            .iter()
            .map(|attribute| attribute.name.clone())
            .collect();
        classes::check_attribute_set(&effective, &names, group)?;

        let mut checked = Vec::with_capacity(initial_attributes.len());
        for attribute in initial_attributes {
            if &attribute.group != group {
                return Err(DirectoryError::AttributeGroupMismatch(
                    attribute.name,
                    group.clone(),
                ));
            }
            checked.push(self.checked_values(attribute)?);
        }

        self.store.add_member(group, entity)?;
        for attribute in checked {
            self.store.set_attribute(entity, attribute)?;
        }
        Ok(())
    }

    pub fn remove_member(&mut self, group: &GroupPath, entity: EntityId) -> Result<(), DirectoryError> {
        self.store.remove_member(group, entity)?;
        Ok(())
    }

    /// Create or replace a direct attribute of an entity.
    pub fn set_attribute(&mut self, entity: EntityId, attribute: Attribute) -> Result<(), DirectoryError> {
        if !self.store.is_member(entity, &attribute.group)? {
            return Err(DirectoryError::NotMember {
                entity,
                group: attribute.group.clone(),
            });
        }
        classes::validate_attribute_write(&self.store, entity, &attribute.group, &attribute.name, false)?;
        let attribute = self.checked_values(attribute)?;
        self.store.set_attribute(entity, attribute)?;
        Ok(())
    }

    /// Remove a direct attribute. Returns `true` when an attribute was
    /// actually removed.
    pub fn remove_attribute(
        &mut self,
        entity: EntityId,
        group: &GroupPath,
        name: &str,
    ) -> Result<bool, DirectoryError> {
        classes::validate_attribute_write(&self.store, entity, group, name, true)?;
        Ok(self.store.remove_attribute(entity, group, name)?)
    }

    /// Assign attribute classes to an entity within a group. The entity's
    /// current attribute set there must already satisfy the classes.
    pub fn set_entity_classes(
        &mut self,
        entity: EntityId,
        group: &GroupPath,
        classes: BTreeSet<String>,
    ) -> Result<(), DirectoryError> {
        if !self.store.is_member(entity, group)? {
            return Err(DirectoryError::NotMember {
                entity,
                group: group.clone(),
            });
        }
        classes::validate_assignment(&self.store, entity, group, &classes)?;
        self.store.set_entity_classes(entity, group, classes)?;
        Ok(())
    }

    pub fn entity_classes(
        &self,
        entity: EntityId,
        group: &GroupPath,
    ) -> Result<BTreeSet<String>, DirectoryError> {
        Ok(self.store.entity_classes(entity, group)?)
    }

    pub fn add_class(&mut self, class: AttributesClass) -> Result<(), DirectoryError> {
        classes::validate_class_addition(&self.store, &class)?;
        self.store.insert_class(class)?;
        Ok(())
    }

    pub fn update_class(&mut self, class: AttributesClass) -> Result<(), DirectoryError> {
        classes::validate_class_update(&self.store, &class)?;
        self.store.update_class(class)?;
        Ok(())
    }

    pub fn remove_class(&mut self, name: &str) -> Result<(), DirectoryError> {
        classes::validate_class_removal(&self.store, name)?;
        self.store.remove_class(name)?;
        Ok(())
    }

    pub fn classes(&self) -> Result<BTreeMap<String, AttributesClass>, DirectoryError> {
        Ok(self.store.all_classes()?)
    }

    /// Resolve the effective attributes of an entity in a group over a
    /// consistent snapshot of the directory.
    pub fn effective_attributes(
        &self,
        entity: EntityId,
        group: &GroupPath,
        queried_attribute: Option<&str>,
        include_inherited: bool,
    ) -> Result<BTreeMap<String, AttributeExt>, DirectoryError> {
        if !self.store.is_member(entity, group)? {
            return Err(DirectoryError::NotMember {
                entity,
                group: group.clone(),
            });
        }

        let snapshot = self.store.snapshot();
        let registry = AttributeTypeRegistry::new(
            snapshot.all_attribute_types()?,
            self.reserved_types.iter().cloned(),
        );
        let context = ResolutionContext::build(&snapshot, entity)?;
        let resolver =
            StatementResolver::new(&self.evaluator, &registry).with_config(self.resolver_config);
        Ok(resolver.resolve_attributes(&snapshot, &context, group, queried_attribute, include_inherited)?)
    }

    /// Drop statements orphaned by removed attribute types or groups.
    /// Returns the number of groups modified.
    pub fn sweep(&mut self) -> Result<usize, DirectoryError> {
        let modified = maintenance::sweep(&mut self.store)?;
        debug!(groups = modified, "consistency sweep finished");
        Ok(modified)
    }

    /// Validate an attribute's value count and syntax against its type,
    /// canonicalizing the values.
    fn checked_values(&self, attribute: Attribute) -> Result<Attribute, DirectoryError> {
        let Some(attribute_type) = self.store.get_attribute_type(&attribute.name)? else {
            return Err(DirectoryError::Store(StoreError::UnknownAttributeType(
                attribute.name,
            )));
        };

        let count = attribute.values.len();
        let too_many = attribute_type
            .max_elements
            .is_some_and(|max| count > max);
        if count < attribute_type.min_elements || too_many {
            return Err(DirectoryError::ValueCount {
                attribute: attribute.name,
                actual: count,
            });
        }

        let mut values = Vec::with_capacity(count);
        for value in &attribute.values {
            values.push(attribute_type.syntax.convert(value)?);
        }
        Ok(Attribute {
            values,
            ..attribute
        })
    }
}
