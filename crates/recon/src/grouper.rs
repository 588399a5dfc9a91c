//! Duplicate grouping: record validation and connected components of the
//! pairwise duplicate relation.

use std::collections::HashSet;

use crate::model::{DuplicateGroup, ExcludedRecord, PatientRecord};
use crate::similarity::is_duplicate;

/// Split `records` into those eligible for grouping and those excluded,
/// with a reason. Input order is preserved on both sides.
pub fn validate_records(records: Vec<PatientRecord>) -> (Vec<PatientRecord>, Vec<ExcludedRecord>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut excluded = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for record in records {
        let reason = if record.id.trim().is_empty() {
            Some("missing patient id")
        } else if record.pg_company_id.trim().is_empty() {
            Some("missing PG company id")
        } else if record.first_name.trim().is_empty() {
            Some("missing first name")
        } else if record.last_name.trim().is_empty() {
            Some("missing last name")
        } else if seen.contains(&record.id) {
            Some("duplicate patient id")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                log::warn!("excluding patient '{}': {}", record.id, reason);
                excluded.push(ExcludedRecord {
                    patient_id: record.id,
                    reason: reason.to_string(),
                });
            }
            None => {
                seen.insert(record.id.clone());
                valid.push(record);
            }
        }
    }

    (valid, excluded)
}

/// Connected components of `is_duplicate` over `records`, singletons dropped.
///
/// Members keep input order; groups are ordered by the input position of
/// their first member and indexed from 0 in that order.
pub fn group_duplicates(records: &[PatientRecord], threshold: u8) -> Vec<DuplicateGroup> {
    let mut sets = DisjointSet::new(records.len());

    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            if is_duplicate(&records[i], &records[j], threshold) {
                sets.union(i, j);
            }
        }
    }

    // Roots are always the smallest index in their set, so walking in input
    // order visits groups in first-member order.
    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut slot_for_root: Vec<Option<usize>> = vec![None; records.len()];
    for i in 0..records.len() {
        let root = sets.find(i);
        match slot_for_root[root] {
            Some(slot) => components[slot].push(i),
            None => {
                slot_for_root[root] = Some(components.len());
                components.push(vec![i]);
            }
        }
    }

    components
        .into_iter()
        .filter(|c| c.len() > 1)
        .enumerate()
        .map(|(index, members)| DuplicateGroup {
            index,
            members: members.into_iter().map(|i| records[i].clone()).collect(),
        })
        .collect()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}
