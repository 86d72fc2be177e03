// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use idhive_core::{
    Attribute, AttributeType, AttributesClass, EntityId, Group, GroupPath, Identity,
};

use crate::traits::{
    AttributeStore, AttributeTypeStore, ClassStore, GroupStore, MembershipStore, StoreError,
};

/// In-memory implementation of all directory store traits.
///
/// Cloning is cheap relative to resolution work and yields a consistent
/// [snapshot](MemoryStore::snapshot) of the whole directory, which is how
/// resolution reads are isolated from concurrent writes.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    groups: BTreeMap<GroupPath, Group>,
    attribute_types: BTreeMap<String, AttributeType>,
    entities: BTreeMap<EntityId, Vec<Identity>>,
    memberships: BTreeMap<EntityId, BTreeSet<GroupPath>>,
    attributes: BTreeMap<(EntityId, GroupPath), BTreeMap<String, Attribute>>,
    classes: BTreeMap<String, AttributesClass>,
    entity_classes: BTreeMap<(EntityId, GroupPath), BTreeSet<String>>,
    next_entity_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        let root = GroupPath::root();
        Self {
            groups: BTreeMap::from([(root.clone(), Group::new(root))]),
            attribute_types: BTreeMap::new(),
            entities: BTreeMap::new(),
            memberships: BTreeMap::new(),
            attributes: BTreeMap::new(),
            classes: BTreeMap::new(),
            entity_classes: BTreeMap::new(),
            next_entity_id: 1,
        }
    }

    /// Consistent point-in-time copy of the whole store.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    fn require_entity(&self, entity: EntityId) -> Result<(), StoreError> {
        if self.entities.contains_key(&entity) {
            Ok(())
        } else {
            Err(StoreError::UnknownEntity(entity))
        }
    }

    fn require_group(&self, path: &GroupPath) -> Result<(), StoreError> {
        if self.groups.contains_key(path) {
            Ok(())
        } else {
            Err(StoreError::UnknownGroup(path.clone()))
        }
    }

    /// Drop an entity's per-group state (attributes, class assignments) in
    /// the given group.
    fn clear_entity_group_state(&mut self, entity: EntityId, group: &GroupPath) {
        self.attributes.remove(&(entity, group.clone()));
        self.entity_classes.remove(&(entity, group.clone()));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupStore for MemoryStore {
    fn insert_group(&mut self, group: Group) -> Result<(), StoreError> {
        if self.groups.contains_key(&group.path) {
            return Err(StoreError::GroupExists(group.path));
        }
        if let Some(parent) = group.path.parent() {
            self.require_group(&parent)?;
        }
        self.groups.insert(group.path.clone(), group);
        Ok(())
    }

    fn update_group(&mut self, group: Group) -> Result<(), StoreError> {
        self.require_group(&group.path)?;
        self.groups.insert(group.path.clone(), group);
        Ok(())
    }

    fn remove_group(&mut self, path: &GroupPath, recursive: bool) -> Result<(), StoreError> {
        if path.is_root() {
            return Err(StoreError::RootRemoval);
        }
        self.require_group(path)?;

        let subtree: Vec<GroupPath> = self
            .groups
            .keys()
            .filter(|group| *group == path || group.is_descendant_of(path))
            .cloned()
            .collect();

        if !recursive && subtree.len() > 1 {
            return Err(StoreError::GroupNotEmpty(path.clone()));
        }

        for group in &subtree {
            self.groups.remove(group);
            let entities: Vec<EntityId> = self.entities.keys().copied().collect();
            for entity in entities {
                if let Some(member_of) = self.memberships.get_mut(&entity) {
                    member_of.remove(group);
                }
                self.clear_entity_group_state(entity, group);
            }
        }
        Ok(())
    }

    fn get_group(&self, path: &GroupPath) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.get(path).cloned())
    }

    fn all_groups(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.groups.values().cloned().collect())
    }

    fn child_groups(&self, path: &GroupPath) -> Result<Vec<GroupPath>, StoreError> {
        self.require_group(path)?;
        Ok(self
            .groups
            .keys()
            .filter(|group| group.parent().as_ref() == Some(path))
            .cloned()
            .collect())
    }
}

impl AttributeTypeStore for MemoryStore {
    fn insert_attribute_type(&mut self, attribute_type: AttributeType) -> Result<(), StoreError> {
        if self.attribute_types.contains_key(&attribute_type.name) {
            return Err(StoreError::AttributeTypeExists(attribute_type.name));
        }
        self.attribute_types
            .insert(attribute_type.name.clone(), attribute_type);
        Ok(())
    }

    fn remove_attribute_type(&mut self, name: &str) -> Result<(), StoreError> {
        if self.attribute_types.remove(name).is_none() {
            return Err(StoreError::UnknownAttributeType(name.to_string()));
        }
        for instances in self.attributes.values_mut() {
            instances.remove(name);
        }
        Ok(())
    }

    fn get_attribute_type(&self, name: &str) -> Result<Option<AttributeType>, StoreError> {
        Ok(self.attribute_types.get(name).cloned())
    }

    fn all_attribute_types(&self) -> Result<Vec<AttributeType>, StoreError> {
        Ok(self.attribute_types.values().cloned().collect())
    }
}

impl AttributeStore for MemoryStore {
    fn set_attribute(&mut self, entity: EntityId, attribute: Attribute) -> Result<(), StoreError> {
        self.require_entity(entity)?;
        self.require_group(&attribute.group)?;
        if !self.attribute_types.contains_key(&attribute.name) {
            return Err(StoreError::UnknownAttributeType(attribute.name));
        }
        self.attributes
            .entry((entity, attribute.group.clone()))
            .or_default()
            .insert(attribute.name.clone(), attribute);
        Ok(())
    }

    fn remove_attribute(
        &mut self,
        entity: EntityId,
        group: &GroupPath,
        name: &str,
    ) -> Result<bool, StoreError> {
        self.require_entity(entity)?;
        Ok(self
            .attributes
            .get_mut(&(entity, group.clone()))
            .is_some_and(|instances| instances.remove(name).is_some()))
    }

    fn attributes_in_group(
        &self,
        entity: EntityId,
        group: &GroupPath,
    ) -> Result<Vec<Attribute>, StoreError> {
        self.require_entity(entity)?;
        Ok(self
            .attributes
            .get(&(entity, group.clone()))
            .map(|instances| instances.values().cloned().collect())
            .unwrap_or_default())
    }

    fn attributes_by_group(
        &self,
        entity: EntityId,
    ) -> Result<BTreeMap<GroupPath, Vec<Attribute>>, StoreError> {
        self.require_entity(entity)?;
        let mut by_group = BTreeMap::new();
        for ((owner, group), instances) in &self.attributes {
            if *owner == entity && !instances.is_empty() {
                by_group.insert(group.clone(), instances.values().cloned().collect());
            }
        }
        Ok(by_group)
    }
}

impl MembershipStore for MemoryStore {
    fn add_entity(&mut self, identities: Vec<Identity>) -> Result<EntityId, StoreError> {
        let entity = EntityId(self.next_entity_id);
        self.next_entity_id += 1;
        self.entities.insert(entity, identities);
        // Every entity is a member of the root group from the start.
        self.memberships
            .insert(entity, BTreeSet::from([GroupPath::root()]));
        Ok(entity)
    }

    fn identities(&self, entity: EntityId) -> Result<Vec<Identity>, StoreError> {
        self.entities
            .get(&entity)
            .cloned()
            .ok_or(StoreError::UnknownEntity(entity))
    }

    fn add_member(&mut self, group: &GroupPath, entity: EntityId) -> Result<(), StoreError> {
        self.require_entity(entity)?;
        self.require_group(group)?;

        let member_of = self.memberships.entry(entity).or_default();
        if member_of.contains(group) {
            return Err(StoreError::AlreadyMember {
                entity,
                group: group.clone(),
            });
        }
        if let Some(parent) = group.parent() {
            if !member_of.contains(&parent) {
                return Err(StoreError::ParentMembershipRequired {
                    entity,
                    group: group.clone(),
                });
            }
        }
        member_of.insert(group.clone());
        Ok(())
    }

    fn remove_member(&mut self, group: &GroupPath, entity: EntityId) -> Result<(), StoreError> {
        if group.is_root() {
            return Err(StoreError::RootMembership);
        }
        self.require_entity(entity)?;

        let member_of = self.memberships.entry(entity).or_default();
        if !member_of.contains(group) {
            return Err(StoreError::NotMember {
                entity,
                group: group.clone(),
            });
        }

        let removed: Vec<GroupPath> = member_of
            .iter()
            .filter(|member| *member == group || member.is_descendant_of(group))
            .cloned()
            .collect();
        member_of.retain(|member| !removed.contains(member));
        for gone in &removed {
            self.clear_entity_group_state(entity, gone);
        }
        Ok(())
    }

    fn member_groups(&self, entity: EntityId) -> Result<BTreeSet<GroupPath>, StoreError> {
        self.memberships
            .get(&entity)
            .cloned()
            .ok_or(StoreError::UnknownEntity(entity))
    }

    fn members(&self, group: &GroupPath) -> Result<Vec<EntityId>, StoreError> {
        self.require_group(group)?;
        Ok(self
            .memberships
            .iter()
            .filter(|(_, member_of)| member_of.contains(group))
            .map(|(entity, _)| *entity)
            .collect())
    }

    fn is_member(&self, entity: EntityId, group: &GroupPath) -> Result<bool, StoreError> {
        Ok(self
            .memberships
            .get(&entity)
            .is_some_and(|member_of| member_of.contains(group)))
    }
}

impl ClassStore for MemoryStore {
    fn insert_class(&mut self, class: AttributesClass) -> Result<(), StoreError> {
        if self.classes.contains_key(&class.name) {
            return Err(StoreError::ClassExists(class.name));
        }
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    fn update_class(&mut self, class: AttributesClass) -> Result<(), StoreError> {
        if !self.classes.contains_key(&class.name) {
            return Err(StoreError::UnknownClass(class.name));
        }
        self.classes.insert(class.name.clone(), class);
        Ok(())
    }

    fn remove_class(&mut self, name: &str) -> Result<(), StoreError> {
        if self.classes.remove(name).is_none() {
            return Err(StoreError::UnknownClass(name.to_string()));
        }
        Ok(())
    }

    fn get_class(&self, name: &str) -> Result<Option<AttributesClass>, StoreError> {
        Ok(self.classes.get(name).cloned())
    }

    fn all_classes(&self) -> Result<BTreeMap<String, AttributesClass>, StoreError> {
        Ok(self.classes.clone())
    }

    fn set_entity_classes(
        &mut self,
        entity: EntityId,
        group: &GroupPath,
        classes: BTreeSet<String>,
    ) -> Result<(), StoreError> {
        self.require_entity(entity)?;
        self.require_group(group)?;
        for name in &classes {
            if !self.classes.contains_key(name) {
                return Err(StoreError::UnknownClass(name.clone()));
            }
        }
        if classes.is_empty() {
            self.entity_classes.remove(&(entity, group.clone()));
        } else {
            self.entity_classes.insert((entity, group.clone()), classes);
        }
        Ok(())
    }

    fn entity_classes(
        &self,
        entity: EntityId,
        group: &GroupPath,
    ) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .entity_classes
            .get(&(entity, group.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn is_class_assigned(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .entity_classes
            .values()
            .any(|classes| classes.contains(name)))
    }
}

#[cfg(test)]
mod tests {
    use idhive_core::{Attribute, AttributeType, Group, GroupPath};

    use crate::traits::{
        AttributeStore, AttributeTypeStore, GroupStore, MembershipStore, StoreError,
    };

    use super::MemoryStore;

    fn path(value: &str) -> GroupPath {
        GroupPath::parse(value).unwrap()
    }

    fn store_with_tree() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_group(Group::new(path("/A"))).unwrap();
        store.insert_group(Group::new(path("/A/B"))).unwrap();
        store
    }

    #[test]
    fn root_group_exists_from_the_start() {
        let store = MemoryStore::new();
        assert!(store.get_group(&GroupPath::root()).unwrap().is_some());
    }

    #[test]
    fn group_requires_existing_parent() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.insert_group(Group::new(path("/A/B"))),
            Err(StoreError::UnknownGroup(path("/A")))
        );
    }

    #[test]
    fn root_group_cannot_be_removed() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.remove_group(&GroupPath::root(), true),
            Err(StoreError::RootRemoval)
        );
    }

    #[test]
    fn non_recursive_removal_of_non_empty_group_fails() {
        let mut store = store_with_tree();
        assert_eq!(
            store.remove_group(&path("/A"), false),
            Err(StoreError::GroupNotEmpty(path("/A")))
        );
        store.remove_group(&path("/A"), true).unwrap();
        assert!(store.get_group(&path("/A/B")).unwrap().is_none());
    }

    #[test]
    fn membership_requires_parent_membership_first() {
        let mut store = store_with_tree();
        let entity = store.add_entity(vec![]).unwrap();

        assert_eq!(
            store.add_member(&path("/A/B"), entity),
            Err(StoreError::ParentMembershipRequired {
                entity,
                group: path("/A/B"),
            })
        );

        store.add_member(&path("/A"), entity).unwrap();
        store.add_member(&path("/A/B"), entity).unwrap();
        assert!(store.is_member(entity, &path("/A/B")).unwrap());
    }

    #[test]
    fn member_removal_cascades_to_subgroups() {
        let mut store = store_with_tree();
        store
            .insert_attribute_type(AttributeType::new("a1"))
            .unwrap();
        let entity = store.add_entity(vec![]).unwrap();
        store.add_member(&path("/A"), entity).unwrap();
        store.add_member(&path("/A/B"), entity).unwrap();
        store
            .set_attribute(entity, Attribute::new("a1", path("/A/B"), ["v"]))
            .unwrap();

        store.remove_member(&path("/A"), entity).unwrap();
        assert!(!store.is_member(entity, &path("/A")).unwrap());
        assert!(!store.is_member(entity, &path("/A/B")).unwrap());
        assert!(
            store
                .attributes_in_group(entity, &path("/A/B"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn attribute_type_removal_drops_instances_only() {
        let mut store = store_with_tree();
        store
            .insert_attribute_type(AttributeType::new("a1"))
            .unwrap();
        let entity = store.add_entity(vec![]).unwrap();
        store.add_member(&path("/A"), entity).unwrap();
        store
            .set_attribute(entity, Attribute::new("a1", path("/A"), ["v"]))
            .unwrap();

        store.remove_attribute_type("a1").unwrap();
        assert!(
            store
                .attributes_in_group(entity, &path("/A"))
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store.remove_attribute_type("a1"),
            Err(StoreError::UnknownAttributeType("a1".to_string()))
        );
    }
}
