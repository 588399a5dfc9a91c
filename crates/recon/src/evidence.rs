use crate::model::MergeOutcome;

/// Run-level totals derived from per-group outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub groups_processed: usize,
    pub records_deleted: usize,
    pub orders_moved: usize,
    pub notes_moved: usize,
    pub error_count: usize,
    pub warning_count: usize,
}

/// Compute summary counts from group outcomes.
pub fn compute_tally(outcomes: &[MergeOutcome]) -> Tally {
    outcomes.iter().fold(Tally::default(), |mut t, o| {
        t.groups_processed += 1;
        t.records_deleted += o.deleted_ids.len();
        t.orders_moved += o.orders_moved;
        t.notes_moved += o.notes_moved;
        t.error_count += o.errors.len();
        t.warning_count += o.warnings.len();
        t
    })
}
