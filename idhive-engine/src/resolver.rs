// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, trace, warn};

use idhive_core::{
    Attribute, AttributeExt, AttributeStatement, AttributeType, AttributeTypeRegistry,
    ConflictResolution, EffectiveClass, Group, GroupPath, StatementAssignment,
};
use idhive_store::{GroupStore, StoreError};

use crate::context::ResolutionContext;
use crate::evaluator::{ExpressionEvaluator, StatementContext};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown group {0}")]
    UnknownGroup(GroupPath),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Copy, Debug)]
pub struct ResolverConfig {
    /// Bound on nested extra-group resolution. A chain of statements where
    /// each pulls in yet another group's context stops contributing once
    /// the bound is reached. Setting this to the maximum group path depth
    /// of the deployment is sufficient for any non-pathological tree.
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_depth: 32 }
    }
}

type AttributeMap = BTreeMap<String, AttributeExt>;

/// Per-call resolution state: memoized effective sets of fully resolved
/// groups, and the set of groups whose statements are being evaluated right
/// now. The latter is what terminates cyclic extra-group references.
#[derive(Debug, Default)]
struct Pass {
    resolved: BTreeMap<GroupPath, AttributeMap>,
    in_progress: BTreeSet<GroupPath>,
}

/// Computes the effective attributes of an entity in a group.
///
/// The resolver walks the group path from the root to the target group. At
/// every step it seeds the accumulated attribute map with the entity's
/// direct assignments in that group, then evaluates the group's statements
/// in list order, applying each statement's conflict resolution against the
/// map. Attributes computed in an ancestor group are visible to descendant
/// groups as ordinary attributes.
///
/// The resolver holds no locks and never mutates the store: it is a pure
/// function of a consistent store snapshot and a [`ResolutionContext`].
#[derive(Debug)]
pub struct StatementResolver<'a, E> {
    evaluator: &'a E,
    registry: &'a AttributeTypeRegistry,
    config: ResolverConfig,
}

impl<'a, E> StatementResolver<'a, E>
where
    E: ExpressionEvaluator,
{
    pub fn new(evaluator: &'a E, registry: &'a AttributeTypeRegistry) -> Self {
        Self {
            evaluator,
            registry,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolve the effective attributes of the context's entity in
    /// `target`.
    ///
    /// `queried_attribute` filters the returned map to one attribute name;
    /// the walk itself always computes the full map so that statements see
    /// the same inputs regardless of the query. With `include_inherited`
    /// the result carries everything visible at the target (the union of
    /// contributions along the path); without it only entries contributed
    /// by the target group itself remain.
    pub fn resolve_attributes<S>(
        &self,
        store: &S,
        context: &ResolutionContext,
        target: &GroupPath,
        queried_attribute: Option<&str>,
        include_inherited: bool,
    ) -> Result<AttributeMap, ResolveError>
    where
        S: GroupStore,
    {
        if store.get_group(target)?.is_none() {
            return Err(ResolveError::UnknownGroup(target.clone()));
        }

        let mut pass = Pass::default();
        let resolved = self
            .walk_rooted(store, context, target, &mut pass, self.config.max_depth)?
            // The top-level walk starts with an empty in-progress set, so
            // it cannot be cut short by the cycle guard.
            .unwrap_or_default();

        let mut result = resolved;
        if !include_inherited {
            result.retain(|_, attribute| attribute.source_group() == target);
        }
        if let Some(name) = queried_attribute {
            result.retain(|key, _| key == name);
        }

        debug!(
            entity = %context.entity_id,
            group = %target,
            attributes = result.len(),
            "resolved effective attributes"
        );
        Ok(result)
    }

    /// Walk the full path from the root to `target`, reusing memoized
    /// results for already-resolved groups. Returns `None` when the walk
    /// would re-enter a group whose statements are currently being
    /// evaluated.
    fn walk_rooted<S>(
        &self,
        store: &S,
        context: &ResolutionContext,
        target: &GroupPath,
        pass: &mut Pass,
        depth: usize,
    ) -> Result<Option<AttributeMap>, ResolveError>
    where
        S: GroupStore,
    {
        let mut current = AttributeMap::new();
        for segment in target.ancestors() {
            if let Some(memo) = pass.resolved.get(&segment) {
                current = memo.clone();
                continue;
            }
            if pass.in_progress.contains(&segment) {
                return Ok(None);
            }
            current = self.process_segment(store, context, &segment, current, pass, depth)?;
            pass.resolved.insert(segment, current.clone());
        }
        Ok(Some(current))
    }

    /// Resolve a group lying strictly below `base` without touching the
    /// (possibly still in-progress) groups from the root down to `base`.
    /// The walk starts from an empty map: a descendant group only
    /// contributes what is resolvable independently of its ancestors.
    fn walk_subtree<S>(
        &self,
        store: &S,
        context: &ResolutionContext,
        base: &GroupPath,
        target: &GroupPath,
        pass: &mut Pass,
        depth: usize,
    ) -> Result<Option<AttributeMap>, ResolveError>
    where
        S: GroupStore,
    {
        let mut current = AttributeMap::new();
        for segment in target.ancestors() {
            if &segment == base || segment.is_ancestor_of(base) {
                continue;
            }
            if pass.in_progress.contains(&segment) {
                return Ok(None);
            }
            current = self.process_segment(store, context, &segment, current, pass, depth)?;
        }
        Ok(Some(current))
    }

    /// Seed the accumulated map with the segment's direct assignments, then
    /// evaluate its statements in list order.
    fn process_segment<S>(
        &self,
        store: &S,
        context: &ResolutionContext,
        segment: &GroupPath,
        mut current: AttributeMap,
        pass: &mut Pass,
        depth: usize,
    ) -> Result<AttributeMap, ResolveError>
    where
        S: GroupStore,
    {
        if let Some(direct) = context.direct_by_group.get(segment) {
            for (name, attribute) in direct {
                current.insert(name.clone(), attribute.clone());
            }
        }

        let Some(group) = store.get_group(segment)? else {
            return Ok(current);
        };
        if group.statements.is_empty() {
            return Ok(current);
        }

        let effective_class = self.effective_class(context, &group);

        pass.in_progress.insert(segment.clone());
        for statement in &group.statements {
            self.process_statement(
                store,
                context,
                &group,
                statement,
                &effective_class,
                &mut current,
                pass,
                depth,
            )?;
        }
        pass.in_progress.remove(segment);

        Ok(current)
    }

    fn process_statement<S>(
        &self,
        store: &S,
        context: &ResolutionContext,
        group: &Group,
        statement: &AttributeStatement,
        effective_class: &EffectiveClass,
        current: &mut AttributeMap,
        pass: &mut Pass,
        depth: usize,
    ) -> Result<(), ResolveError>
    where
        S: GroupStore,
    {
        let assigned = statement.assigned_attribute_name();

        let Some(attribute_type) = self.registry.get(assigned) else {
            // The target type was removed after the statement was written;
            // the consistency sweep will drop the statement.
            trace!(group = %group.path, attribute = assigned, "statement targets a removed attribute type, skipping");
            return Ok(());
        };

        if !effective_class.is_allowed(assigned) {
            trace!(group = %group.path, attribute = assigned, "statement target not allowed by attribute classes, skipping");
            return Ok(());
        }

        let extra = match &statement.extra_attributes_group {
            Some(extra_group) => Some(self.extra_context(
                store,
                context,
                &group.path,
                extra_group,
                pass,
                depth,
            )?),
            None => None,
        };

        let chain = group.path.ancestors();
        let statement_context = build_statement_context(context, &group.path, &chain, current, extra);

        let condition = match self
            .evaluator
            .evaluate_condition(&statement.condition, &statement_context)
        {
            Ok(value) => value,
            Err(error) => {
                warn!(group = %group.path, condition = %statement.condition, %error, "condition evaluation failed, skipping statement");
                false
            }
        };
        if !condition {
            trace!(group = %group.path, condition = %statement.condition, "condition is false");
            return Ok(());
        }

        let produced = match &statement.assignment {
            StatementAssignment::Fixed(attribute) => Some(attribute.values.clone()),
            StatementAssignment::Dynamic { expression, .. } => {
                match self.evaluator.evaluate_value(expression, &statement_context) {
                    Ok(Some(raw_values)) => convert_values(raw_values, attribute_type),
                    Ok(None) => {
                        debug!(group = %group.path, expression = %expression, "value expression produced no value");
                        None
                    }
                    Err(error) => {
                        warn!(group = %group.path, expression = %expression, %error, "value evaluation failed, skipping statement");
                        None
                    }
                }
            }
        };
        let Some(values) = produced else {
            return Ok(());
        };

        apply_resolution(
            current,
            assigned,
            values,
            &group.path,
            statement.conflict_resolution,
            attribute_type,
        );
        Ok(())
    }

    /// The resolved attribute map of a statement's extra group.
    ///
    /// Unresolvable references (the entity is no member of the group, the
    /// group is gone, the depth bound is hit or resolution would re-enter a
    /// group currently being evaluated, a reference cycle) yield an empty
    /// map, so such statements simply contribute nothing.
    fn extra_context<S>(
        &self,
        store: &S,
        context: &ResolutionContext,
        current_group: &GroupPath,
        extra_group: &GroupPath,
        pass: &mut Pass,
        depth: usize,
    ) -> Result<AttributeMap, ResolveError>
    where
        S: GroupStore,
    {
        if let Some(resolved) = pass.resolved.get(extra_group) {
            return Ok(resolved.clone());
        }
        if !context.member_groups.contains(extra_group) {
            trace!(group = %extra_group, "entity is not a member of the extra group");
            return Ok(AttributeMap::new());
        }
        if store.get_group(extra_group)?.is_none() {
            trace!(group = %extra_group, "extra group no longer exists");
            return Ok(AttributeMap::new());
        }
        if depth == 0 {
            warn!(group = %extra_group, "extra group recursion depth exhausted");
            return Ok(AttributeMap::new());
        }
        if pass.in_progress.contains(extra_group) {
            debug!(group = %extra_group, "cyclic extra group reference, providing empty context");
            return Ok(AttributeMap::new());
        }

        let resolved = if extra_group.is_descendant_of(current_group) {
            self.walk_subtree(store, context, current_group, extra_group, pass, depth - 1)?
        } else {
            self.walk_rooted(store, context, extra_group, pass, depth - 1)?
        };
        Ok(resolved.unwrap_or_default())
    }

    fn effective_class(&self, context: &ResolutionContext, group: &Group) -> EffectiveClass {
        let mut names = context.entity_classes(&group.path);
        names.extend(group.attribute_classes.iter().cloned());
        match EffectiveClass::flatten(names.iter(), &context.known_classes) {
            Ok(effective) => effective,
            Err(error) => {
                warn!(group = %group.path, %error, "dangling attribute class reference, ignoring class constraints");
                EffectiveClass::unconstrained()
            }
        }
    }
}

fn build_statement_context<'c>(
    context: &'c ResolutionContext,
    group: &'c GroupPath,
    chain: &'c [GroupPath],
    current: &AttributeMap,
    extra: Option<AttributeMap>,
) -> StatementContext<'c> {
    let (attr, attrs) = attribute_views(current);
    let (eattr, eattrs) = match extra {
        Some(map) => {
            let (eattr, eattrs) = attribute_views(&map);
            (Some(eattr), Some(eattrs))
        }
        None => (None, None),
    };

    StatementContext {
        entity_id: context.entity_id,
        group_name: group,
        groups: chain,
        ids_by_type: &context.ids_by_type,
        attr,
        attrs,
        eattr,
        eattrs,
    }
}

/// First-value and all-values views of an attribute map, as exposed to
/// expressions.
fn attribute_views(
    attributes: &AttributeMap,
) -> (BTreeMap<String, String>, BTreeMap<String, Vec<String>>) {
    let mut first = BTreeMap::new();
    let mut all = BTreeMap::new();
    for (name, attribute) in attributes {
        let values = attribute.values();
        first.insert(
            name.clone(),
            values.first().cloned().unwrap_or_default(),
        );
        all.insert(name.clone(), values.to_vec());
    }
    (first, all)
}

fn convert_values(raw_values: Vec<String>, attribute_type: &AttributeType) -> Option<Vec<String>> {
    let mut converted = Vec::with_capacity(raw_values.len());
    for value in raw_values {
        match attribute_type.syntax.convert(&value) {
            Ok(value) => converted.push(value),
            Err(error) => {
                debug!(attribute = %attribute_type.name, %error, "cannot convert expression value, skipping statement");
                return None;
            }
        }
    }
    Some(converted)
}

/// Apply a statement-produced value against the accumulated map, honoring
/// the statement's conflict resolution.
fn apply_resolution(
    current: &mut AttributeMap,
    name: &str,
    values: Vec<String>,
    group: &GroupPath,
    resolution: ConflictResolution,
    attribute_type: &AttributeType,
) {
    let produced = AttributeExt::from_statement(
        Attribute::new(name, group.clone(), values.clone()),
        group.clone(),
    );

    match current.get_mut(name) {
        None => {
            current.insert(name.to_string(), produced);
        }
        Some(existing) => match resolution {
            ConflictResolution::Skip => {
                trace!(attribute = name, "conflict, keeping the existing value");
            }
            ConflictResolution::Overwrite => {
                trace!(attribute = name, "conflict, overwriting the existing value");
                *existing = produced;
            }
            ConflictResolution::Merge => {
                if attribute_type.is_unbounded() {
                    trace!(attribute = name, "conflict, merging values");
                    existing.attribute.values.extend(values);
                } else {
                    trace!(
                        attribute = name,
                        "merge skipped, attribute type has a value limit"
                    );
                }
            }
        },
    }
}
