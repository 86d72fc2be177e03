// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consistency maintenance of stored statements.
//!
//! Removing an attribute type or a group succeeds even while statements
//! still reference it; such statements are simply dead. This sweep finds
//! and removes them. It can run on demand or periodically, concurrently
//! with resolution reads: readers observe pre- or post-sweep state, both
//! of which are valid.

use std::collections::BTreeSet;

use tracing::{debug, info};

use idhive_core::GroupPath;
use idhive_store::{AttributeTypeStore, GroupStore, StoreError};

/// Remove statements referencing attribute types or extra groups that no
/// longer exist. Returns the number of groups whose statement list was
/// modified; a repeated sweep without intervening changes returns 0.
pub fn sweep<S>(store: &mut S) -> Result<usize, StoreError>
where
    S: GroupStore + AttributeTypeStore,
{
    let known_types: BTreeSet<String> = store
        .all_attribute_types()?
        .into_iter()
        .map(|attribute_type| attribute_type.name)
        .collect();
    let known_groups: BTreeSet<GroupPath> = store
        .all_groups()?
        .into_iter()
        .map(|group| group.path)
        .collect();

    let mut modified = 0;
    for mut group in store.all_groups()? {
        let before = group.statements.len();
        group.statements.retain(|statement| {
            let target_exists = known_types.contains(statement.assigned_attribute_name());
            let extra_exists = statement
                .extra_attributes_group
                .as_ref()
                .is_none_or(|extra| known_groups.contains(extra));
            target_exists && extra_exists
        });

        let removed = before - group.statements.len();
        if removed > 0 {
            debug!(group = %group.path, removed, "dropping orphaned statements");
            store.update_group(group)?;
            modified += 1;
        }
    }

    if modified > 0 {
        info!(groups = modified, "statement sweep modified groups");
    }
    Ok(modified)
}
