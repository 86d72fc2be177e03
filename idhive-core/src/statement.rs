// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attribute::Attribute;
use crate::attribute_type::AttributeTypeRegistry;
use crate::path::GroupPath;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatementError {
    #[error("statement condition must not be empty")]
    MissingCondition,

    #[error("dynamic statement must carry both a target type and an expression")]
    MissingExpression,

    #[error("fixed attribute's group must equal the statement's group")]
    FixedAttributeForeignGroup,

    #[error("extra attributes group must differ from the statement's group")]
    ExtraGroupIsOwnGroup,

    #[error("statement targets unknown attribute type '{0}'")]
    UnknownAttributeType(String),

    #[error("attribute type '{0}' cannot be the target of a statement")]
    ForbiddenAttributeType(String),
}

/// How a statement-produced value interacts with an already-present value
/// of the same attribute name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Keep the existing value, drop the statement's.
    Skip,

    /// Replace the existing value list with the statement's.
    Overwrite,

    /// Append the statement's values after the existing ones. Only applied
    /// when the target attribute type is unbounded.
    Merge,
}

/// The value a statement assigns: either a fixed attribute or a dynamic
/// expression producing values for a named attribute type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementAssignment {
    Fixed(Attribute),
    Dynamic {
        attribute_type: String,
        expression: String,
    },
}

/// A conditional rule attached to a group, computing an attribute for the
/// group's members.
///
/// The condition (and a dynamic value expression, if any) is evaluated
/// against a context exposing the entity's identities, its attributes
/// resolved so far along the group path, and, when `extra_attributes_group`
/// is set, the fully resolved effective attributes of that other group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    pub condition: String,

    /// Group whose resolved attributes are exposed to the condition and
    /// value expression as `eattr`/`eattrs`. May name an ancestor, a
    /// descendant or an unrelated group, but never the owning group itself.
    pub extra_attributes_group: Option<GroupPath>,

    pub conflict_resolution: ConflictResolution,

    pub assignment: StatementAssignment,
}

impl AttributeStatement {
    /// Statement assigning a fixed attribute to everybody in the group.
    pub fn fixed_everybody(attribute: Attribute) -> Self {
        Self {
            condition: "true".to_string(),
            extra_attributes_group: None,
            conflict_resolution: ConflictResolution::Skip,
            assignment: StatementAssignment::Fixed(attribute),
        }
    }

    pub fn fixed(
        condition: impl Into<String>,
        extra_attributes_group: Option<GroupPath>,
        conflict_resolution: ConflictResolution,
        attribute: Attribute,
    ) -> Self {
        Self {
            condition: condition.into(),
            extra_attributes_group,
            conflict_resolution,
            assignment: StatementAssignment::Fixed(attribute),
        }
    }

    pub fn dynamic(
        condition: impl Into<String>,
        extra_attributes_group: Option<GroupPath>,
        conflict_resolution: ConflictResolution,
        attribute_type: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            condition: condition.into(),
            extra_attributes_group,
            conflict_resolution,
            assignment: StatementAssignment::Dynamic {
                attribute_type: attribute_type.into(),
                expression: expression.into(),
            },
        }
    }

    /// Name of the assigned attribute, regardless of fixed or dynamic mode.
    pub fn assigned_attribute_name(&self) -> &str {
        match &self.assignment {
            StatementAssignment::Fixed(attribute) => &attribute.name,
            StatementAssignment::Dynamic { attribute_type, .. } => attribute_type,
        }
    }

    /// Structural write-time validation against the owning group and the
    /// attribute type registry. Condition syntax is checked separately by
    /// the expression evaluator.
    pub fn validate(
        &self,
        owning_group: &GroupPath,
        registry: &AttributeTypeRegistry,
    ) -> Result<(), StatementError> {
        if self.condition.trim().is_empty() {
            return Err(StatementError::MissingCondition);
        }

        match &self.assignment {
            StatementAssignment::Fixed(attribute) => {
                if &attribute.group != owning_group {
                    return Err(StatementError::FixedAttributeForeignGroup);
                }
            }
            StatementAssignment::Dynamic {
                attribute_type,
                expression,
            } => {
                if attribute_type.trim().is_empty() || expression.trim().is_empty() {
                    return Err(StatementError::MissingExpression);
                }
            }
        }

        let target = self.assigned_attribute_name();
        if !registry.contains(target) {
            return Err(StatementError::UnknownAttributeType(target.to_string()));
        }
        if registry.is_statement_target_forbidden(target) {
            return Err(StatementError::ForbiddenAttributeType(target.to_string()));
        }

        if let Some(extra) = &self.extra_attributes_group {
            if extra == owning_group {
                return Err(StatementError::ExtraGroupIsOwnGroup);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::attribute::Attribute;
    use crate::attribute_type::{AttributeType, AttributeTypeRegistry};
    use crate::path::GroupPath;

    use super::{AttributeStatement, ConflictResolution, StatementError};

    fn registry() -> AttributeTypeRegistry {
        AttributeTypeRegistry::new(
            [
                AttributeType::new("a1"),
                AttributeType::new("sys:credential").immutable(),
            ],
            ["sys:role".to_string()],
        )
    }

    fn group_a() -> GroupPath {
        GroupPath::parse("/A").unwrap()
    }

    #[test]
    fn valid_fixed_statement() {
        let statement = AttributeStatement::fixed_everybody(Attribute::new(
            "a1",
            group_a(),
            ["v1"],
        ));
        assert!(statement.validate(&group_a(), &registry()).is_ok());
    }

    #[test]
    fn fixed_attribute_must_belong_to_owning_group() {
        let statement = AttributeStatement::fixed_everybody(Attribute::new(
            "a1",
            GroupPath::parse("/A/D").unwrap(),
            ["v1"],
        ));
        assert_eq!(
            statement.validate(&group_a(), &registry()),
            Err(StatementError::FixedAttributeForeignGroup)
        );
    }

    #[test]
    fn dynamic_statement_requires_expression() {
        let statement =
            AttributeStatement::dynamic("true", None, ConflictResolution::Skip, "a1", " ");
        assert_eq!(
            statement.validate(&group_a(), &registry()),
            Err(StatementError::MissingExpression)
        );
    }

    #[test]
    fn forbidden_targets_are_rejected() {
        let immutable = AttributeStatement::fixed_everybody(Attribute::new(
            "sys:credential",
            group_a(),
            ["foo"],
        ));
        assert_eq!(
            immutable.validate(&group_a(), &registry()),
            Err(StatementError::ForbiddenAttributeType(
                "sys:credential".to_string()
            ))
        );

        let unknown =
            AttributeStatement::dynamic("true", None, ConflictResolution::Skip, "nope", "'x'");
        assert_eq!(
            unknown.validate(&group_a(), &registry()),
            Err(StatementError::UnknownAttributeType("nope".to_string()))
        );
    }

    #[test]
    fn extra_group_must_differ_from_owning_group() {
        let statement = AttributeStatement::fixed(
            "true",
            Some(group_a()),
            ConflictResolution::Skip,
            Attribute::new("a1", group_a(), ["v1"]),
        );
        assert_eq!(
            statement.validate(&group_a(), &registry()),
            Err(StatementError::ExtraGroupIsOwnGroup)
        );
    }

    #[test]
    fn statement_serde_round_trip() {
        let statement = AttributeStatement::dynamic(
            "attr['a1'] != null",
            Some(GroupPath::parse("/A/B").unwrap()),
            ConflictResolution::Merge,
            "a1",
            "attrs['a1']",
        );
        let json = serde_json::to_string(&statement).unwrap();
        let back: AttributeStatement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, statement);
    }
}
