use std::collections::BTreeSet;

use super::types::{ChangeSet, Document, Fields};

/// Computes the field level diff between two snapshots of the same
/// document. Values are compared structurally, so nested objects and
/// arrays are equal when their contents are. A field missing from one
/// side is recorded with `None` on that side. Returns an empty ChangeSet
/// when nothing differs, which callers treat as a no-op.
pub fn compute_diff(old: &Document, new: &Document) -> ChangeSet {
    compute_field_diff(&old.fields, &new.fields)
}

pub fn compute_field_diff(old: &Fields, new: &Fields) -> ChangeSet {
    let mut changes = ChangeSet::new();

    let all_keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in all_keys {
        let old_value = old.get(key);
        let new_value = new.get(key);
        if old_value != new_value {
            changes.insert(key.clone(), old_value.cloned(), new_value.cloned());
        }
    }

    changes
}
