// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;

use thiserror::Error;

use idhive_core::{EntityId, GroupPath};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("syntax error in expression '{expression}': {reason}")]
    Syntax { expression: String, reason: String },

    #[error("evaluation of expression '{expression}' failed: {reason}")]
    Evaluation { expression: String, reason: String },
}

/// Data visible to a statement's condition and value expression.
///
/// `attr`/`attrs` expose the attributes visible so far on the walk from the
/// root to the current group (direct assignments plus attributes computed
/// by earlier statements): `attr` maps a name to its first value, `attrs`
/// to all values. `eattr`/`eattrs` expose the resolved attributes of the
/// statement's extra group the same way, and are `None` when the statement
/// has no extra group configured. Cyclic or otherwise unresolvable extra
/// references yield empty maps.
#[derive(Debug)]
pub struct StatementContext<'a> {
    pub entity_id: EntityId,

    /// Path of the group whose statement is being evaluated.
    pub group_name: &'a GroupPath,

    /// Chain of groups from the root to the current group.
    pub groups: &'a [GroupPath],

    /// The entity's identities, values grouped by identity type.
    pub ids_by_type: &'a BTreeMap<String, Vec<String>>,

    pub attr: BTreeMap<String, String>,
    pub attrs: BTreeMap<String, Vec<String>>,

    pub eattr: Option<BTreeMap<String, String>>,
    pub eattrs: Option<BTreeMap<String, Vec<String>>>,
}

/// Evaluates statement conditions and dynamic value expressions.
///
/// The engine treats the expression language as an external collaborator:
/// any sandboxed interpreter can be plugged in as long as it honors the
/// [`StatementContext`] contract. A small deterministic implementation for
/// tests lives in the `test_utils` module.
pub trait ExpressionEvaluator {
    /// Check an expression for syntactic validity, without evaluating it.
    /// Statements with invalid expressions are rejected at write time.
    fn validate(&self, expression: &str) -> Result<(), ExpressionError>;

    /// Evaluate a boolean condition against the context.
    fn evaluate_condition(
        &self,
        expression: &str,
        context: &StatementContext<'_>,
    ) -> Result<bool, ExpressionError>;

    /// Evaluate a value expression against the context. `Ok(None)` means
    /// the expression produced no value and the statement contributes
    /// nothing.
    fn evaluate_value(
        &self,
        expression: &str,
        context: &StatementContext<'_>,
    ) -> Result<Option<Vec<String>>, ExpressionError>;
}
