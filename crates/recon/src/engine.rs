use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::collab::Collaborators;
use crate::config::ReconOptions;
use crate::error::ReconError;
use crate::evidence::compute_tally;
use crate::grouper::{group_duplicates, validate_records};
use crate::migrate::{migrate, plan};
use crate::model::{
    ChildRecord, DuplicateGroup, GroupIssue, MemberScore, MergeDecision, MergeOutcome,
    NotificationRecord, NotifyKind, PatientRecord, RunMeta, RunSummary, Stage,
};
use crate::resolver::resolve;
use crate::selector::{select, Candidate};

/// Run-level cancellation. Stops scheduling new groups; a group already
/// started runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reconcile every duplicate group in one PG.
pub fn reconcile(
    collab: &Collaborators<'_>,
    pg_company_id: &str,
    options: &ReconOptions,
) -> Result<RunSummary, ReconError> {
    reconcile_with_cancel(collab, pg_company_id, options, &CancelFlag::new())
}

/// [`reconcile`] with an external cancel flag.
pub fn reconcile_with_cancel(
    collab: &Collaborators<'_>,
    pg_company_id: &str,
    options: &ReconOptions,
    cancel: &CancelFlag,
) -> Result<RunSummary, ReconError> {
    let started_at = chrono::Utc::now().to_rfc3339();
    let records = load_patients(collab, pg_company_id, options)?;
    let total_records = records.len();

    let (valid, excluded) = validate_records(records);
    let groups = group_duplicates(&valid, options.similarity_threshold);
    log::info!(
        "PG {}: {} records, {} excluded, {} duplicate groups{}",
        pg_company_id,
        total_records,
        excluded.len(),
        groups.len(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let outcomes = run_groups(collab, &groups, options, cancel);
    let cancelled = outcomes.len() < groups.len();
    if cancelled {
        log::warn!("run cancelled after {} of {} groups", outcomes.len(), groups.len());
    }

    let tally = compute_tally(&outcomes);
    Ok(RunSummary {
        meta: RunMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        },
        pg_company_id: pg_company_id.to_string(),
        total_records,
        excluded,
        groups_found: groups.len(),
        groups_processed: tally.groups_processed,
        records_deleted: tally.records_deleted,
        orders_moved: tally.orders_moved,
        notes_moved: tally.notes_moved,
        error_count: tally.error_count,
        warning_count: tally.warning_count,
        dry_run: options.dry_run,
        cancelled,
        outcomes,
    })
}

/// Reconcile only the duplicate group containing `target_patient_id`.
///
/// `Ok(None)` when the target has no duplicates.
pub fn reconcile_single(
    collab: &Collaborators<'_>,
    pg_company_id: &str,
    target_patient_id: &str,
    options: &ReconOptions,
) -> Result<Option<MergeOutcome>, ReconError> {
    let records = load_patients(collab, pg_company_id, options)?;
    if !records.iter().any(|r| r.id == target_patient_id) {
        return Err(ReconError::TargetNotFound {
            pg_company_id: pg_company_id.to_string(),
            patient_id: target_patient_id.to_string(),
        });
    }

    let (valid, excluded) = validate_records(records);
    if excluded.iter().any(|e| e.patient_id == target_patient_id) {
        log::warn!("patient {target_patient_id} failed validation; nothing to merge");
        return Ok(None);
    }

    let group = group_duplicates(&valid, options.similarity_threshold)
        .into_iter()
        .find(|g| g.contains(target_patient_id));

    match group {
        Some(group) => Ok(Some(process_group(collab, &group, options))),
        None => {
            log::info!("patient {target_patient_id} has no duplicates");
            Ok(None)
        }
    }
}

fn load_patients(
    collab: &Collaborators<'_>,
    pg_company_id: &str,
    options: &ReconOptions,
) -> Result<Vec<PatientRecord>, ReconError> {
    options.validate()?;
    if pg_company_id.trim().is_empty() {
        return Err(ReconError::InvalidOptions("PG company id is empty".into()));
    }
    options
        .retry
        .run("fetch patients", || collab.registry.fetch_patients(pg_company_id))
        .map_err(|e| ReconError::from_fetch_patients(pg_company_id, e))
}

/// Process groups on up to `max_parallel_groups` scoped workers.
/// Outcomes come back in group order; cancelled groups are absent.
fn run_groups(
    collab: &Collaborators<'_>,
    groups: &[DuplicateGroup],
    options: &ReconOptions,
    cancel: &CancelFlag,
) -> Vec<MergeOutcome> {
    let workers = options.max_parallel_groups.clamp(1, groups.len().max(1));

    if workers == 1 {
        let mut outcomes = Vec::with_capacity(groups.len());
        for group in groups {
            if cancel.is_cancelled() {
                break;
            }
            outcomes.push(process_group(collab, group, options));
        }
        return outcomes;
    }

    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<MergeOutcome>>> = Mutex::new(vec![None; groups.len()]);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if cancel.is_cancelled() {
                    break;
                }
                let i = next.fetch_add(1, Ordering::SeqCst);
                let Some(group) = groups.get(i) else {
                    break;
                };
                let outcome = process_group(collab, group, options);
                slots.lock()[i] = Some(outcome);
            });
        }
    });

    slots.into_inner().into_iter().flatten().collect()
}

/// Drive one group through resolution, selection, migration and
/// notification. Never fails; problems land in the outcome.
pub fn process_group(
    collab: &Collaborators<'_>,
    group: &DuplicateGroup,
    options: &ReconOptions,
) -> MergeOutcome {
    let mut warnings = Vec::new();

    let orders: Vec<Vec<ChildRecord>> = group
        .members
        .iter()
        .map(|m| {
            options
                .retry
                .run("fetch orders", || collab.registry.fetch_orders(&m.id))
                .unwrap_or_else(|e| {
                    log::warn!("patient {}: cannot load orders: {e}", m.id);
                    warnings.push(GroupIssue::new(Stage::LoadOrders, &m.id, e.to_string()));
                    Vec::new()
                })
        })
        .collect();

    let resolution = resolve(&group.members, &orders, collab, &options.retry);
    warnings.extend(resolution.warnings);

    let members: Vec<MemberScore> = group
        .members
        .iter()
        .enumerate()
        .map(|(i, m)| MemberScore {
            patient_id: m.id.clone(),
            order_count: orders[i].len(),
            completeness: m.completeness(),
            verification_score: resolution.scores[i],
            extracted: resolution.extracted[i].clone(),
        })
        .collect();

    let candidates: Vec<Candidate<'_>> = group
        .members
        .iter()
        .zip(&members)
        .map(|(record, score)| Candidate { record, score })
        .collect();
    let (primary_id, non_primary_ids) = select(&candidates).unwrap_or_default();

    log::info!(
        "group {}: primary {} ({}), merging {:?}",
        group.index,
        primary_id,
        resolution.method,
        non_primary_ids
    );

    let report = if options.dry_run {
        plan(&non_primary_ids, collab.registry, &options.retry)
    } else {
        migrate(&primary_id, &non_primary_ids, collab.registry, &options.retry)
    };

    let mut notifications = Vec::new();
    if options.enable_notifications && !options.dry_run {
        let targets = report
            .deleted_ids
            .iter()
            .map(|id| (id.as_str(), NotifyKind::Deleted))
            .chain(std::iter::once((primary_id.as_str(), NotifyKind::Kept)));
        for (patient_id, kind) in targets {
            let ok = match options.retry.run("notify", || collab.notifier.notify(patient_id, kind)) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("patient {patient_id}: {kind} notification failed: {e}");
                    warnings.push(GroupIssue::new(Stage::Notify, patient_id, e.to_string()));
                    false
                }
            };
            notifications.push(NotificationRecord {
                patient_id: patient_id.to_string(),
                kind,
                ok,
            });
        }
    }

    MergeOutcome {
        group_index: group.index,
        member_ids: group.member_ids(),
        decision: MergeDecision {
            primary_id,
            non_primary_ids,
            method: resolution.method,
        },
        members,
        orders_moved: report.orders_moved,
        notes_moved: report.notes_moved,
        deleted_ids: report.deleted_ids,
        retained_ids: report.retained_ids,
        notifications,
        warnings,
        errors: report.errors,
        dry_run: options.dry_run,
    }
}
