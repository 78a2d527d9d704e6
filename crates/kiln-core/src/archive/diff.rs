use super::reader::Archive;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedMember {
    pub path: String,
    pub before: String,
    pub after: String,
}

/// Member-level differences between two archives. Paths are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<ChangedMember>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Compare the member tables of `a` and `b` by logical path and digest.
pub fn diff(a: &Archive, b: &Archive) -> DiffReport {
    let before = digests(a);
    let after = digests(b);

    let before_paths: BTreeSet<&String> = before.keys().collect();
    let after_paths: BTreeSet<&String> = after.keys().collect();

    let added = after_paths
        .difference(&before_paths)
        .map(|p| p.to_string())
        .collect();
    let removed = before_paths
        .difference(&after_paths)
        .map(|p| p.to_string())
        .collect();
    let changed = before_paths
        .intersection(&after_paths)
        .filter_map(|path| {
            let (old, new) = (&before[*path], &after[*path]);
            (old != new).then(|| ChangedMember {
                path: path.to_string(),
                before: old.clone(),
                after: new.clone(),
            })
        })
        .collect();

    DiffReport {
        added,
        removed,
        changed,
    }
}

fn digests(archive: &Archive) -> BTreeMap<String, String> {
    archive
        .members()
        .into_iter()
        .map(|m| (m.path, m.sha256))
        .collect()
}
