// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attribute-class constraint validation.
//!
//! Attribute classes constrain which attributes an entity may (`allowed`)
//! and must (`mandatory`) hold within a group. Classes apply to an entity
//! either through a direct (entity, group) assignment or group-wide via the
//! group's class set; the constraints in force are the flattened union of
//! both. All checks here run against direct attribute assignments: they
//! gate writes, before statements are ever evaluated.

use std::collections::BTreeSet;

use thiserror::Error;

use idhive_core::{ClassError, EffectiveClass, EntityId, Group, GroupPath};
use idhive_store::{AttributeStore, ClassStore, GroupStore, MembershipStore, StoreError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassValidationError {
    #[error("mandatory attribute '{attribute}' is missing in {group}")]
    MandatoryMissing { attribute: String, group: GroupPath },

    #[error("attribute '{attribute}' is not allowed in {group}")]
    NotAllowed { attribute: String, group: GroupPath },

    #[error("attribute '{attribute}' is mandatory in {group} and cannot be removed")]
    MandatoryRemoval { attribute: String, group: GroupPath },

    #[error("attributes class '{0}' is in use")]
    InUse(String),

    #[error(transparent)]
    Class(#[from] ClassError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The flattened constraints applying to an entity in a group: its own
/// class assignments unioned with the group-wide classes.
pub fn effective_for<S>(
    store: &S,
    entity: EntityId,
    group: &GroupPath,
) -> Result<EffectiveClass, ClassValidationError>
where
    S: ClassStore + GroupStore,
{
    let mut names = store.entity_classes(entity, group)?;
    if let Some(stored_group) = store.get_group(group)? {
        names.extend(stored_group.attribute_classes.iter().cloned());
    }
    Ok(EffectiveClass::flatten(names.iter(), &store.all_classes()?)?)
}

/// Check a complete attribute-name set against the constraints: all
/// mandatory attributes present, nothing disallowed.
pub fn check_attribute_set(
    effective: &EffectiveClass,
    names: &BTreeSet<String>,
    group: &GroupPath,
) -> Result<(), ClassValidationError> {
    for mandatory in &effective.mandatory {
        if !names.contains(mandatory) {
            return Err(ClassValidationError::MandatoryMissing {
                attribute: mandatory.clone(),
                group: group.clone(),
            });
        }
    }
    for name in names {
        if !effective.is_allowed(name) {
            return Err(ClassValidationError::NotAllowed {
                attribute: name.clone(),
                group: group.clone(),
            });
        }
    }
    Ok(())
}

/// Validate assigning `proposed` classes to an entity in a group: the
/// entity's current direct attribute set there must already satisfy the
/// proposed constraints (unioned with the group-wide classes).
pub fn validate_assignment<S>(
    store: &S,
    entity: EntityId,
    group: &GroupPath,
    proposed: &BTreeSet<String>,
) -> Result<(), ClassValidationError>
where
    S: ClassStore + GroupStore + AttributeStore,
{
    let mut names = proposed.clone();
    if let Some(stored_group) = store.get_group(group)? {
        names.extend(stored_group.attribute_classes.iter().cloned());
    }
    let effective = EffectiveClass::flatten(names.iter(), &store.all_classes()?)?;

    let current: BTreeSet<String> = store
        .attributes_in_group(entity, group)?
        .into_iter()
        .map(|attribute| attribute.name)
        .collect();
    check_attribute_set(&effective, &current, group)
}

/// Validate a direct attribute write (or removal) against the classes in
/// force for the entity in the group.
pub fn validate_attribute_write<S>(
    store: &S,
    entity: EntityId,
    group: &GroupPath,
    attribute: &str,
    is_removal: bool,
) -> Result<(), ClassValidationError>
where
    S: ClassStore + GroupStore + AttributeStore,
{
    let effective = effective_for(store, entity, group)?;
    if is_removal {
        if effective.is_mandatory(attribute) {
            return Err(ClassValidationError::MandatoryRemoval {
                attribute: attribute.to_string(),
                group: group.clone(),
            });
        }
    } else if !effective.is_allowed(attribute) {
        return Err(ClassValidationError::NotAllowed {
            attribute: attribute.to_string(),
            group: group.clone(),
        });
    }
    Ok(())
}

/// Validate a new class definition: its inheritance chain must resolve.
pub fn validate_class_addition<S>(
    store: &S,
    class: &idhive_core::AttributesClass,
) -> Result<(), ClassValidationError>
where
    S: ClassStore,
{
    let mut catalogue = store.all_classes()?;
    catalogue.insert(class.name.clone(), class.clone());
    let names = BTreeSet::from([class.name.clone()]);
    EffectiveClass::flatten(names.iter(), &catalogue)?;
    Ok(())
}

/// Validate a class update. While a class is in use (assigned to an
/// entity, attached to a group, or the parent of another class) the update
/// must not restrict it: the new effective allowed set must cover the old
/// one and the mandatory set must not grow.
pub fn validate_class_update<S>(
    store: &S,
    updated: &idhive_core::AttributesClass,
) -> Result<(), ClassValidationError>
where
    S: ClassStore + GroupStore,
{
    let catalogue = store.all_classes()?;
    if !catalogue.contains_key(&updated.name) {
        return Err(ClassValidationError::Store(StoreError::UnknownClass(
            updated.name.clone(),
        )));
    }

    let names = BTreeSet::from([updated.name.clone()]);
    let old_effective = EffectiveClass::flatten(names.iter(), &catalogue)?;

    let mut new_catalogue = catalogue;
    new_catalogue.insert(updated.name.clone(), updated.clone());
    let new_effective = EffectiveClass::flatten(names.iter(), &new_catalogue)?;

    if class_in_use(store, &updated.name)? && old_effective.is_restricted_by(&new_effective) {
        return Err(ClassValidationError::InUse(updated.name.clone()));
    }
    Ok(())
}

/// Validate removing a class: it must not be assigned, attached to a group
/// or the parent of another class.
pub fn validate_class_removal<S>(store: &S, name: &str) -> Result<(), ClassValidationError>
where
    S: ClassStore + GroupStore,
{
    if store.get_class(name)?.is_none() {
        return Err(ClassValidationError::Store(StoreError::UnknownClass(
            name.to_string(),
        )));
    }
    if class_in_use(store, name)? {
        return Err(ClassValidationError::InUse(name.to_string()));
    }
    Ok(())
}

/// Validate an updated group definition's class set: all classes must
/// exist, and every member's direct attributes must still satisfy the
/// constraints resulting from the new set.
pub fn validate_group_classes<S>(store: &S, group: &Group) -> Result<(), ClassValidationError>
where
    S: ClassStore + GroupStore + AttributeStore + MembershipStore,
{
    let catalogue = store.all_classes()?;
    for member in store.members(&group.path)? {
        let mut names = store.entity_classes(member, &group.path)?;
        names.extend(group.attribute_classes.iter().cloned());
        let effective = EffectiveClass::flatten(names.iter(), &catalogue)?;

        let current: BTreeSet<String> = store
            .attributes_in_group(member, &group.path)?
            .into_iter()
            .map(|attribute| attribute.name)
            .collect();
        check_attribute_set(&effective, &current, &group.path)?;
    }

    // Even with no members the class names themselves must resolve.
    EffectiveClass::flatten(group.attribute_classes.iter(), &catalogue)?;
    Ok(())
}

fn class_in_use<S>(store: &S, name: &str) -> Result<bool, ClassValidationError>
where
    S: ClassStore + GroupStore,
{
    if store.is_class_assigned(name)? {
        return Ok(true);
    }
    if store
        .all_classes()?
        .values()
        .any(|class| class.parent_class.as_deref() == Some(name))
    {
        return Ok(true);
    }
    if store
        .all_groups()?
        .iter()
        .any(|group| group.attribute_classes.contains(name))
    {
        return Ok(true);
    }
    Ok(false)
}
