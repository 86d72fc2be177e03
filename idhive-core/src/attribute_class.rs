// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassError {
    #[error("unknown attributes class '{0}'")]
    UnknownClass(String),

    #[error("attributes class inheritance cycle involving '{0}'")]
    CyclicInheritance(String),
}

/// A named constraint set over the attributes an entity may and must hold
/// within a group.
///
/// A class may inherit from one parent class; the constraints in force are
/// the flattened union over the inheritance chain (see [`EffectiveClass`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributesClass {
    pub name: String,

    pub description: String,

    /// Attribute names members may hold. Mandatory names are implicitly
    /// allowed.
    pub allowed: BTreeSet<String>,

    /// Attribute names members must hold.
    pub mandatory: BTreeSet<String>,

    /// When set, any attribute name is allowed; `allowed` is moot.
    pub allow_arbitrary: bool,

    pub parent_class: Option<String>,
}

impl AttributesClass {
    pub fn new(
        name: impl Into<String>,
        allowed: impl IntoIterator<Item = impl Into<String>>,
        mandatory: impl IntoIterator<Item = impl Into<String>>,
        allow_arbitrary: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            allowed: allowed.into_iter().map(Into::into).collect(),
            mandatory: mandatory.into_iter().map(Into::into).collect(),
            allow_arbitrary,
            parent_class: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_class = Some(parent.into());
        self
    }
}

/// The flattened constraints of a set of attribute classes: unions of
/// allowed and mandatory names over every class and its inheritance chain.
///
/// An empty class set constrains nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectiveClass {
    pub allowed: BTreeSet<String>,
    pub mandatory: BTreeSet<String>,
    pub allow_arbitrary: bool,
    unconstrained: bool,
}

impl EffectiveClass {
    /// The constraint set of no classes at all: everything is allowed,
    /// nothing is mandatory.
    pub fn unconstrained() -> Self {
        Self {
            unconstrained: true,
            ..Default::default()
        }
    }

    /// Flatten the named classes (and their ancestors) from the known-class
    /// catalogue.
    pub fn flatten<'a>(
        class_names: impl IntoIterator<Item = &'a String>,
        known: &BTreeMap<String, AttributesClass>,
    ) -> Result<Self, ClassError> {
        let mut effective = EffectiveClass {
            unconstrained: true,
            ..Default::default()
        };

        for name in class_names {
            effective.unconstrained = false;

            let mut chain = BTreeSet::new();
            let mut current = name.clone();
            loop {
                if !chain.insert(current.clone()) {
                    return Err(ClassError::CyclicInheritance(current));
                }
                let class = known
                    .get(&current)
                    .ok_or_else(|| ClassError::UnknownClass(current.clone()))?;

                effective.allowed.extend(class.allowed.iter().cloned());
                effective.allowed.extend(class.mandatory.iter().cloned());
                effective.mandatory.extend(class.mandatory.iter().cloned());
                effective.allow_arbitrary |= class.allow_arbitrary;

                match &class.parent_class {
                    Some(parent) => current = parent.clone(),
                    None => break,
                }
            }
        }

        Ok(effective)
    }

    /// True when no class constrains the attribute set at all.
    pub fn is_unconstrained(&self) -> bool {
        self.unconstrained
    }

    pub fn is_allowed(&self, attribute: &str) -> bool {
        self.unconstrained || self.allow_arbitrary || self.allowed.contains(attribute)
    }

    pub fn is_mandatory(&self, attribute: &str) -> bool {
        self.mandatory.contains(attribute)
    }

    /// True when `other` does not permit everything `self` permits or
    /// requires more than `self` requires. Used to reject restricting
    /// updates of classes that are in use.
    pub fn is_restricted_by(&self, other: &EffectiveClass) -> bool {
        if !other.mandatory.is_subset(&self.mandatory) {
            return true;
        }
        if self.allow_arbitrary && !other.allow_arbitrary {
            return true;
        }
        if !other.allow_arbitrary && !self.allowed.is_subset(&other.allowed) {
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{AttributesClass, ClassError, EffectiveClass};

    fn known(classes: Vec<AttributesClass>) -> BTreeMap<String, AttributesClass> {
        classes
            .into_iter()
            .map(|class| (class.name.clone(), class))
            .collect()
    }

    #[test]
    fn empty_class_set_constrains_nothing() {
        let effective = EffectiveClass::flatten(std::iter::empty(), &BTreeMap::new()).unwrap();
        assert!(effective.is_unconstrained());
        assert!(effective.is_allowed("anything"));
        assert!(!effective.is_mandatory("anything"));
    }

    #[test]
    fn mandatory_names_are_implicitly_allowed() {
        let catalogue = known(vec![AttributesClass::new("ac1", ["a2"], ["a1"], false)]);
        let names = vec!["ac1".to_string()];
        let effective = EffectiveClass::flatten(names.iter(), &catalogue).unwrap();

        assert!(effective.is_allowed("a1"));
        assert!(effective.is_allowed("a2"));
        assert!(!effective.is_allowed("a3"));
        assert!(effective.is_mandatory("a1"));
    }

    #[test]
    fn inheritance_chain_is_unioned() {
        let catalogue = known(vec![
            AttributesClass::new("parent", ["a1"], ["a2"], false),
            AttributesClass::new("child", ["a3"], [] as [&str; 0], false).with_parent("parent"),
        ]);
        let names = vec!["child".to_string()];
        let effective = EffectiveClass::flatten(names.iter(), &catalogue).unwrap();

        assert!(effective.is_allowed("a1"));
        assert!(effective.is_allowed("a2"));
        assert!(effective.is_allowed("a3"));
        assert!(effective.is_mandatory("a2"));
    }

    #[test]
    fn allow_arbitrary_wins_over_allowed_set() {
        let catalogue = known(vec![
            AttributesClass::new("strict", ["a1"], [] as [&str; 0], false),
            AttributesClass::new("open", [] as [&str; 0], [] as [&str; 0], true),
        ]);
        let names = vec!["strict".to_string(), "open".to_string()];
        let effective = EffectiveClass::flatten(names.iter(), &catalogue).unwrap();
        assert!(effective.is_allowed("whatever"));
    }

    #[test]
    fn unknown_class_and_cycles_are_rejected() {
        let names = vec!["ghost".to_string()];
        assert_eq!(
            EffectiveClass::flatten(names.iter(), &BTreeMap::new()),
            Err(ClassError::UnknownClass("ghost".to_string()))
        );

        let catalogue = known(vec![
            AttributesClass::new("a", [] as [&str; 0], [] as [&str; 0], false).with_parent("b"),
            AttributesClass::new("b", [] as [&str; 0], [] as [&str; 0], false).with_parent("a"),
        ]);
        let names = vec!["a".to_string()];
        assert!(matches!(
            EffectiveClass::flatten(names.iter(), &catalogue),
            Err(ClassError::CyclicInheritance(_))
        ));
    }

    #[test]
    fn restriction_detection() {
        let catalogue = known(vec![AttributesClass::new("ac1", ["a2"], ["a1"], false)]);
        let names = vec!["ac1".to_string()];
        let old = EffectiveClass::flatten(names.iter(), &catalogue).unwrap();

        let widened = known(vec![AttributesClass::new("ac1", ["a2", "a3"], ["a1"], false)]);
        let new = EffectiveClass::flatten(names.iter(), &widened).unwrap();
        assert!(!old.is_restricted_by(&new));

        let narrowed = known(vec![AttributesClass::new("ac1", [] as [&str; 0], ["a1"], false)]);
        let new = EffectiveClass::flatten(names.iter(), &narrowed).unwrap();
        assert!(old.is_restricted_by(&new));

        let more_mandatory = known(vec![AttributesClass::new("ac1", ["a2"], ["a1", "a2"], false)]);
        let new = EffectiveClass::flatten(names.iter(), &more_mandatory).unwrap();
        assert!(old.is_restricted_by(&new));
    }
}
