//! Child-record migration and retirement of non-primary records.
//!
//! For each non-primary: move its orders (except CCNote-typed rows), then
//! its CC notes, onto the primary; delete it only when every fetch and
//! every update for it succeeded. Failures are collected, never raised.

use crate::collab::{CallError, Registry};
use crate::model::{ChildRecord, GroupIssue, Stage};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub orders_moved: usize,
    pub notes_moved: usize,
    /// Deleted, or in a plan, would be deleted.
    pub deleted_ids: Vec<String>,
    pub retained_ids: Vec<String>,
    pub errors: Vec<GroupIssue>,
}

/// Which child collection is being moved.
#[derive(Debug, Clone, Copy)]
enum ChildKind {
    Order,
    Note,
}

impl ChildKind {
    fn fetch_stage(self) -> Stage {
        match self {
            Self::Order => Stage::FetchOrders,
            Self::Note => Stage::FetchNotes,
        }
    }

    fn move_stage(self) -> Stage {
        match self {
            Self::Order => Stage::MoveOrder,
            Self::Note => Stage::MoveNote,
        }
    }

    fn fetch(self, registry: &dyn Registry, patient_id: &str) -> Result<Vec<ChildRecord>, CallError> {
        match self {
            Self::Order => registry.fetch_orders(patient_id),
            Self::Note => registry.fetch_notes(patient_id),
        }
    }

    fn update(self, registry: &dyn Registry, record: &ChildRecord) -> Result<(), CallError> {
        match self {
            Self::Order => registry.update_order(record),
            Self::Note => registry.update_note(record),
        }
    }

    /// CCNote-typed order rows are left where they are.
    fn migrates(self, record: &ChildRecord) -> bool {
        match self {
            Self::Order => !record.is_cc_note(),
            Self::Note => true,
        }
    }
}

/// Execute the merge against the registry.
pub fn migrate(
    primary_id: &str,
    non_primary_ids: &[String],
    registry: &dyn Registry,
    retry: &RetryPolicy,
) -> MigrationReport {
    let mut report = MigrationReport::default();

    for source_id in non_primary_ids {
        let errors_before = report.errors.len();

        report.orders_moved +=
            move_children(ChildKind::Order, source_id, primary_id, registry, retry, &mut report.errors);
        report.notes_moved +=
            move_children(ChildKind::Note, source_id, primary_id, registry, retry, &mut report.errors);

        if report.errors.len() > errors_before {
            log::warn!("patient {source_id}: migration incomplete, record left in place");
            report.retained_ids.push(source_id.clone());
            continue;
        }

        match retry.run("delete patient", || registry.delete_patient(source_id)) {
            Ok(()) => {
                log::info!("patient {source_id}: deleted, merged into {primary_id}");
                report.deleted_ids.push(source_id.clone());
            }
            Err(e) => {
                log::error!("patient {source_id}: delete failed: {e}");
                report
                    .errors
                    .push(GroupIssue::new(Stage::DeletePatient, source_id, e.to_string()));
                report.retained_ids.push(source_id.clone());
            }
        }
    }

    report
}

/// Dry run: count what [`migrate`] would move and delete. Reads only.
pub fn plan(non_primary_ids: &[String], registry: &dyn Registry, retry: &RetryPolicy) -> MigrationReport {
    let mut report = MigrationReport::default();

    for source_id in non_primary_ids {
        let mut complete = true;
        for kind in [ChildKind::Order, ChildKind::Note] {
            match retry.run("fetch children", || kind.fetch(registry, source_id)) {
                Ok(children) => {
                    let count = children.iter().filter(|c| kind.migrates(c)).count();
                    match kind {
                        ChildKind::Order => report.orders_moved += count,
                        ChildKind::Note => report.notes_moved += count,
                    }
                }
                Err(e) => {
                    complete = false;
                    report
                        .errors
                        .push(GroupIssue::new(kind.fetch_stage(), source_id, e.to_string()));
                }
            }
        }

        if complete {
            report.deleted_ids.push(source_id.clone());
        } else {
            report.retained_ids.push(source_id.clone());
        }
    }

    report
}

/// Move one kind of child record from `source_id` to `primary_id`.
/// Returns how many moved; failures are appended to `errors`.
fn move_children(
    kind: ChildKind,
    source_id: &str,
    primary_id: &str,
    registry: &dyn Registry,
    retry: &RetryPolicy,
    errors: &mut Vec<GroupIssue>,
) -> usize {
    let children = match retry.run("fetch children", || kind.fetch(registry, source_id)) {
        Ok(children) => children,
        Err(e) => {
            log::error!("patient {source_id}: {} failed: {e}", kind.fetch_stage());
            errors.push(GroupIssue::new(kind.fetch_stage(), source_id, e.to_string()));
            return 0;
        }
    };

    let mut moved = 0;
    for child in children.iter().filter(|c| kind.migrates(c)) {
        let updated = child.reassigned_to(primary_id);
        match retry.run("update child", || kind.update(registry, &updated)) {
            Ok(()) => {
                log::debug!("{:?} {} moved {} -> {}", kind, child.id, source_id, primary_id);
                moved += 1;
            }
            Err(e) => {
                log::error!("{:?} {} move failed: {e}", kind, child.id);
                errors.push(
                    GroupIssue::new(kind.move_stage(), source_id, e.to_string()).for_record(&child.id),
                );
            }
        }
    }
    moved
}
