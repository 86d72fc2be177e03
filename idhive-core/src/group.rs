// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::path::GroupPath;
use crate::statement::AttributeStatement;

/// A node of the hierarchical group namespace.
///
/// The statement list is ordered and order is significant: statements are
/// evaluated in list order, and conflict resolution among statements
/// targeting the same attribute within one group depends on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub path: GroupPath,

    pub description: String,

    pub statements: Vec<AttributeStatement>,

    /// Attribute classes applied group-wide: every member's attribute set
    /// in this group is validated against these in addition to the classes
    /// assigned to the member itself.
    pub attribute_classes: BTreeSet<String>,
}

impl Group {
    pub fn new(path: GroupPath) -> Self {
        Self {
            path,
            description: String::new(),
            statements: Vec::new(),
            attribute_classes: BTreeSet::new(),
        }
    }

    pub fn with_statements(mut self, statements: Vec<AttributeStatement>) -> Self {
        self.statements = statements;
        self
    }

    pub fn name(&self) -> &str {
        self.path.segments().last().unwrap_or("/")
    }
}
