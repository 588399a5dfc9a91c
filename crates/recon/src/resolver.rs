//! Conflict resolution via document verification.
//!
//! When group members disagree on DOB or MRN, each member's 485 form (or the
//! closest stand-in) is fetched, its text extracted, and identity candidates
//! pulled out of it. A member scores one point per identity field on its
//! record that agrees with those candidates.
//!
//! Nothing here fails outward: every problem is a score of 0 plus a warning.

use std::collections::HashSet;

use crate::collab::Collaborators;
use crate::model::{
    ChildRecord, DocumentRef, GroupIssue, IdentityCandidates, PatientRecord, ResolutionMethod,
    Stage,
};
use crate::retry::RetryPolicy;
use crate::similarity::text_equal;

/// Document-name keywords, most specific first.
pub const PRIMARY_KEYWORDS: &[&str] = &[
    "485",
    "plan",
    "cert",
    "poc",
    "care plan",
    "physician",
    "recert",
    "home health",
    "medical",
    "intake",
    "assessment",
];

/// Tried only when no order matches a primary keyword.
pub const FALLBACK_KEYWORDS: &[&str] = &[
    "home",
    "health",
    "patient",
    "evaluation",
    "order",
    "note",
    "communication",
];

#[derive(Debug, Clone)]
pub struct Resolution {
    pub method: ResolutionMethod,
    /// Parallel to the group's members. `None` = unscored.
    pub scores: Vec<Option<u8>>,
    pub extracted: Vec<Option<IdentityCandidates>>,
    pub warnings: Vec<GroupIssue>,
}

impl Resolution {
    fn unscored(method: ResolutionMethod, len: usize, warnings: Vec<GroupIssue>) -> Self {
        Self {
            method,
            scores: vec![None; len],
            extracted: vec![None; len],
            warnings,
        }
    }
}

/// Two or more distinct non-null DOB values, or MRN values, among members.
pub fn has_conflict(members: &[PatientRecord]) -> bool {
    let dobs: HashSet<_> = members.iter().filter_map(|m| m.dob).collect();
    let mrns: HashSet<String> = members
        .iter()
        .filter_map(|m| m.mrn.as_deref())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| m.to_ascii_uppercase())
        .collect();
    dobs.len() > 1 || mrns.len() > 1
}

/// Pick the verification document among a member's orders.
///
/// Keyword order wins over order position: every order is checked against
/// "485" before any is checked against "plan", and so on.
pub fn find_verification_document(orders: &[ChildRecord]) -> Option<&DocumentRef> {
    let named: Vec<(String, &DocumentRef)> = orders
        .iter()
        .filter_map(|o| o.document.as_ref())
        .filter(|d| !d.name.trim().is_empty())
        .map(|d| (d.name.to_lowercase(), d))
        .collect();

    for keywords in [PRIMARY_KEYWORDS, FALLBACK_KEYWORDS] {
        for keyword in keywords {
            if let Some((_, doc)) = named.iter().find(|(name, _)| name.contains(keyword)) {
                return Some(*doc);
            }
        }
    }
    None
}

/// Number of identity fields (DOB, MRN) on `record` that agree with the
/// extracted candidates: 0, 1 or 2.
pub fn score_member(record: &PatientRecord, candidates: &IdentityCandidates) -> u8 {
    let mut score = 0;
    if text_equal(record.mrn.as_deref(), candidates.mrn.as_deref()) {
        score += 1;
    }
    if matches!((record.dob, candidates.dob), (Some(a), Some(b)) if a == b) {
        score += 1;
    }
    score
}

/// Resolve a group. `orders[i]` are the already-loaded orders of `members[i]`.
pub fn resolve(
    members: &[PatientRecord],
    orders: &[Vec<ChildRecord>],
    collab: &Collaborators<'_>,
    retry: &RetryPolicy,
) -> Resolution {
    if !has_conflict(members) {
        return Resolution::unscored(ResolutionMethod::Exact, members.len(), Vec::new());
    }

    let mut scores = vec![None; members.len()];
    let mut extracted = vec![None; members.len()];
    let mut warnings = Vec::new();
    let mut verified = 0;

    for (i, member) in members.iter().enumerate() {
        let member_orders = orders.get(i).map(Vec::as_slice).unwrap_or(&[]);
        if member_orders.is_empty() {
            log::debug!("patient {}: no orders, left unscored", member.id);
            continue;
        }

        match verify_member(member, member_orders, collab, retry) {
            Ok(candidates) => {
                let score = score_member(member, &candidates);
                log::info!("patient {}: verification score {}", member.id, score);
                scores[i] = Some(score);
                extracted[i] = Some(candidates);
                verified += 1;
            }
            Err(issue) => {
                log::warn!("{issue}");
                scores[i] = Some(0);
                warnings.push(issue);
            }
        }
    }

    if verified == 0 {
        log::warn!("no member could be verified; falling back to non-verification ranking");
        return Resolution::unscored(ResolutionMethod::Unresolved, members.len(), warnings);
    }

    Resolution {
        method: ResolutionMethod::VerifiedByDocument,
        scores,
        extracted,
        warnings,
    }
}

fn verify_member(
    member: &PatientRecord,
    orders: &[ChildRecord],
    collab: &Collaborators<'_>,
    retry: &RetryPolicy,
) -> Result<IdentityCandidates, GroupIssue> {
    let issue = |msg: String| GroupIssue::new(Stage::Verification, &member.id, msg);

    let document = find_verification_document(orders)
        .ok_or_else(|| issue("no verification document among orders".into()))?;

    let raw = retry
        .run("fetch document", || collab.documents.fetch_document(document))
        .map_err(|e| issue(format!("fetch '{}': {e}", document.name)))?;

    let text = collab.text.extract_text(&raw);
    if text.trim().is_empty() {
        return Err(issue(format!("no text extracted from '{}'", document.name)));
    }

    let candidates = retry
        .run("extract identity", || collab.identity.extract_identity_candidates(&text))
        .map_err(|e| issue(format!("identity extraction from '{}': {e}", document.name)))?;

    if candidates.is_empty() {
        return Err(issue(format!("no identity candidates in '{}'", document.name)));
    }
    Ok(candidates)
}
