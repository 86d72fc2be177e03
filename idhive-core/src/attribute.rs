// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

use crate::path::GroupPath;

/// An attribute of an entity within one group: a named, ordered list of
/// values scoped to a group path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub group: GroupPath,
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new(
        name: impl Into<String>,
        group: GroupPath,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            group,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Where a resolved attribute value came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Directly assigned to the entity.
    Direct,

    /// Produced by an attribute statement of the given group.
    Statement { group: GroupPath },
}

/// An effective attribute: the resolved value set for one
/// (entity, group, attribute type) triple. Never persisted; recomputed on
/// every resolution request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeExt {
    pub attribute: Attribute,
    pub provenance: Provenance,
}

impl AttributeExt {
    pub fn direct(attribute: Attribute) -> Self {
        Self {
            attribute,
            provenance: Provenance::Direct,
        }
    }

    pub fn from_statement(attribute: Attribute, group: GroupPath) -> Self {
        Self {
            attribute,
            provenance: Provenance::Statement { group },
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.provenance, Provenance::Direct)
    }

    pub fn name(&self) -> &str {
        &self.attribute.name
    }

    pub fn values(&self) -> &[String] {
        &self.attribute.values
    }

    /// Group which contributed this attribute: the attribute's own group
    /// for direct assignments, the statement's group otherwise.
    pub fn source_group(&self) -> &GroupPath {
        match &self.provenance {
            Provenance::Direct => &self.attribute.group,
            Provenance::Statement { group } => group,
        }
    }
}
