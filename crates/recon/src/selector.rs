use std::cmp::Ordering;

use crate::model::{MemberScore, PatientRecord};

/// Ranking inputs for one member.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub record: &'a PatientRecord,
    pub score: &'a MemberScore,
}

/// Best-first comparison. Total: ends on the patient id.
///
/// 1. verification score (unscored below 0)
/// 2. order count
/// 3. completeness
/// 4. creation timestamp, oldest first, missing last
/// 5. id ascending
pub fn rank(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    let verification = |c: &Candidate<'_>| c.score.verification_score.map_or(-1, i16::from);

    verification(b)
        .cmp(&verification(a))
        .then_with(|| b.score.order_count.cmp(&a.score.order_count))
        .then_with(|| b.score.completeness.cmp(&a.score.completeness))
        .then_with(|| match (a.record.created_on, b.record.created_on) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.record.id.cmp(&b.record.id))
}

/// Order members best-first and split off the primary.
///
/// Returns `(primary_id, non_primary_ids)`, non-primaries in rank order.
/// `None` only for an empty slice.
pub fn select(candidates: &[Candidate<'_>]) -> Option<(String, Vec<String>)> {
    let mut ranked: Vec<&Candidate<'_>> = candidates.iter().collect();
    ranked.sort_by(|a, b| rank(a, b));

    let (first, rest) = ranked.split_first()?;
    Some((
        first.record.id.clone(),
        rest.iter().map(|c| c.record.id.clone()).collect(),
    ))
}
