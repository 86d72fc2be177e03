// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use idhive_core::{AttributeExt, AttributesClass, EntityId, GroupPath, Identity};
use idhive_store::{AttributeStore, ClassStore, MembershipStore, StoreError};

/// Everything about one entity the resolver needs, gathered from a single
/// consistent store snapshot: identities, group memberships, directly
/// assigned attributes per group and attribute-class assignments.
#[derive(Debug)]
pub struct ResolutionContext {
    pub entity_id: EntityId,

    pub identities: Vec<Identity>,

    /// Identity values grouped by identity type, as exposed to expressions.
    pub ids_by_type: BTreeMap<String, Vec<String>>,

    pub member_groups: BTreeSet<GroupPath>,

    /// Direct attribute assignments, keyed by group and attribute name.
    pub direct_by_group: BTreeMap<GroupPath, BTreeMap<String, AttributeExt>>,

    /// The full attribute-class catalogue.
    pub known_classes: BTreeMap<String, AttributesClass>,

    /// Classes assigned to this entity, per group.
    pub classes_by_group: BTreeMap<GroupPath, BTreeSet<String>>,
}

impl ResolutionContext {
    /// Gather the context for an entity from a store snapshot.
    pub fn build<S>(store: &S, entity_id: EntityId) -> Result<Self, StoreError>
    where
        S: AttributeStore + MembershipStore + ClassStore,
    {
        let identities = store.identities(entity_id)?;

        let mut ids_by_type: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for identity in &identities {
            ids_by_type
                .entry(identity.type_id.clone())
                .or_default()
                .push(identity.value.clone());
        }

        let member_groups = store.member_groups(entity_id)?;

        let mut direct_by_group = BTreeMap::new();
        for (group, attributes) in store.attributes_by_group(entity_id)? {
            let by_name = attributes
                .into_iter()
                .map(|attribute| (attribute.name.clone(), AttributeExt::direct(attribute)))
                .collect();
            direct_by_group.insert(group, by_name);
        }

        let mut classes_by_group = BTreeMap::new();
        for group in &member_groups {
            let classes = store.entity_classes(entity_id, group)?;
            if !classes.is_empty() {
                classes_by_group.insert(group.clone(), classes);
            }
        }

        Ok(Self {
            entity_id,
            identities,
            ids_by_type,
            member_groups,
            direct_by_group,
            known_classes: store.all_classes()?,
            classes_by_group,
        })
    }

    /// Classes assigned to the entity in the given group (not including
    /// group-wide classes, which live on the group itself).
    pub fn entity_classes(&self, group: &GroupPath) -> BTreeSet<String> {
        self.classes_by_group.get(group).cloned().unwrap_or_default()
    }
}
