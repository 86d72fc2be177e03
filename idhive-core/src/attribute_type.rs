// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("value '{0}' is not a valid integer")]
    NotAnInteger(String),

    #[error("value '{0}' is not a valid boolean")]
    NotABoolean(String),
}

/// Syntax of an attribute type's values. Values are carried as strings;
/// the syntax defines which strings are admissible and their canonical form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValueSyntax {
    #[default]
    Text,
    Integer,
    Boolean,
}

impl AttributeValueSyntax {
    /// Validate a raw value and return its canonical string form.
    pub fn convert(&self, raw: &str) -> Result<String, ValueError> {
        match self {
            AttributeValueSyntax::Text => Ok(raw.to_string()),
            AttributeValueSyntax::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|value| value.to_string())
                .map_err(|_| ValueError::NotAnInteger(raw.to_string())),
            AttributeValueSyntax::Boolean => match raw.trim() {
                "true" => Ok("true".to_string()),
                "false" => Ok("false".to_string()),
                _ => Err(ValueError::NotABoolean(raw.to_string())),
            },
        }
    }
}

/// Definition of an attribute type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeType {
    pub name: String,

    pub syntax: AttributeValueSyntax,

    /// Minimum number of values an instance must carry.
    pub min_elements: usize,

    /// Maximum number of values an instance may carry; `None` means
    /// unbounded. Statement `merge` conflict resolution only appends to
    /// unbounded types.
    pub max_elements: Option<usize>,

    /// Instances of this type are managed internally and cannot be the
    /// target of an attribute statement.
    pub instance_immutable: bool,
}

impl AttributeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            syntax: AttributeValueSyntax::Text,
            min_elements: 0,
            max_elements: Some(1),
            instance_immutable: false,
        }
    }

    pub fn with_syntax(mut self, syntax: AttributeValueSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_bounds(mut self, min_elements: usize, max_elements: Option<usize>) -> Self {
        self.min_elements = min_elements;
        self.max_elements = max_elements;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.instance_immutable = true;
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_elements.is_none()
    }
}

/// Immutable registry of attribute type definitions.
///
/// Built once from the type store plus the set of system-reserved type
/// names (credential requirements, authorization roles and the like), and
/// passed to the resolver and validators at construction time.
#[derive(Clone, Debug, Default)]
pub struct AttributeTypeRegistry {
    types: BTreeMap<String, AttributeType>,
    reserved: BTreeSet<String>,
}

impl AttributeTypeRegistry {
    pub fn new(
        types: impl IntoIterator<Item = AttributeType>,
        reserved: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            types: types
                .into_iter()
                .map(|attribute_type| (attribute_type.name.clone(), attribute_type))
                .collect(),
            reserved: reserved.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// True when instances of the type must not be produced by statements:
    /// either the type is flagged immutable or its name is system-reserved.
    pub fn is_statement_target_forbidden(&self, name: &str) -> bool {
        self.reserved.contains(name)
            || self
                .types
                .get(name)
                .is_some_and(|attribute_type| attribute_type.instance_immutable)
    }
}
