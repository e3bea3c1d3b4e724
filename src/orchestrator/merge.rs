//! Evidence merge across views

use super::{ViewKind, ViewResult};
use serde::Serialize;
use std::collections::HashMap;

/// A commit cited once, with every view that supports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedEvidence {
    pub commit_sha: String,
    pub supported_by: Vec<ViewKind>,
}

/// Deduplicate evidence by SHA
///
/// Order is first citation: views in the order given, and each view's
/// evidence in that view's own order.
pub fn merge_evidence<'a>(results: impl IntoIterator<Item = &'a ViewResult>) -> Vec<MergedEvidence> {
    let mut merged: Vec<MergedEvidence> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for result in results {
        let kind = result.kind();
        for sha in result.evidence() {
            match index.get(sha) {
                Some(&i) => {
                    let entry = &mut merged[i];
                    if !entry.supported_by.contains(&kind) {
                        entry.supported_by.push(kind);
                    }
                }
                None => {
                    index.insert(sha.clone(), merged.len());
                    merged.push(MergedEvidence {
                        commit_sha: sha.clone(),
                        supported_by: vec![kind],
                    });
                }
            }
        }
    }

    merged
}
