//! Name similarity and exact identity-field predicates.

use crate::model::PatientRecord;

/// Identity fields compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Dob,
    Mrn,
    CompanyId,
}

/// Lower-case and collapse runs of whitespace to one space.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Part score a shortened first name is lifted to (Jon, Jonathan).
pub const ABBREVIATION_SCORE: u8 = 90;

/// Shortest first name treated as an abbreviation of a longer one.
const MIN_ABBREVIATION_LEN: usize = 3;

/// Similarity of two names on a 0–100 scale.
///
/// The first token is the first name and the remaining tokens the last
/// name. Single-token names are compared whole. An empty name scores 0
/// against anything. See [`name_score`] for how the parts combine.
pub fn match_score(a: &str, b: &str) -> u8 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    match (a.split_once(' '), b.split_once(' ')) {
        (Some((first_a, last_a)), Some((first_b, last_b))) => {
            part_similarity(first_a, last_a, first_b, last_b)
        }
        _ => edit_ratio(&a, &b),
    }
}

/// Name score between two records, from their first and last name fields.
///
/// Each part is scored on its own by normalized edit distance and the name
/// scores as its weaker part, so a matching last name never carries an
/// unrelated first name. The same is tried with one side's parts
/// interchanged and the better pairing wins. A record missing either part
/// scores 0.
pub fn name_score(a: &PatientRecord, b: &PatientRecord) -> u8 {
    let first_a = normalize_name(&a.first_name);
    let last_a = normalize_name(&a.last_name);
    let first_b = normalize_name(&b.first_name);
    let last_b = normalize_name(&b.last_name);
    if [&first_a, &last_a, &first_b, &last_b].iter().any(|p| p.is_empty()) {
        return 0;
    }
    part_similarity(&first_a, &last_a, &first_b, &last_b)
}

/// Expects normalized, non-empty parts. Symmetric in (a, b).
fn part_similarity(first_a: &str, last_a: &str, first_b: &str, last_b: &str) -> u8 {
    let direct = first_name_ratio(first_a, first_b).min(edit_ratio(last_a, last_b));
    let interchanged = edit_ratio(first_a, last_b).min(edit_ratio(last_a, first_b));
    direct.max(interchanged)
}

fn first_name_ratio(a: &str, b: &str) -> u8 {
    let ratio = edit_ratio(a, b);
    if is_abbreviation(a, b) {
        ratio.max(ABBREVIATION_SCORE)
    } else {
        ratio
    }
}

/// Normalized Levenshtein similarity as a percentage.
fn edit_ratio(a: &str, b: &str) -> u8 {
    to_percent(strsim::normalized_levenshtein(a, b))
}

/// True when the shorter name keeps the longer one's initial and its
/// letters appear in order in it: jon/john, john/jonathan, dan/daniel.
fn is_abbreviation(a: &str, b: &str) -> bool {
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    let (short, long) = match len_a.cmp(&len_b) {
        std::cmp::Ordering::Less => (a, b),
        std::cmp::Ordering::Greater => (b, a),
        std::cmp::Ordering::Equal => return false,
    };
    if short.chars().count() < MIN_ABBREVIATION_LEN || short.chars().next() != long.chars().next() {
        return false;
    }
    let mut rest = long.chars();
    short.chars().all(|c| rest.any(|l| l == c))
}

fn to_percent(similarity: f64) -> u8 {
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Inclusive threshold check.
pub fn name_matches(score: u8, threshold: u8) -> bool {
    score >= threshold
}

/// Exact comparison of one identity field. A missing value never matches,
/// not even another missing value.
pub fn fields_equal(a: &PatientRecord, b: &PatientRecord, field: IdentityField) -> bool {
    match field {
        IdentityField::Dob => matches!((a.dob, b.dob), (Some(x), Some(y)) if x == y),
        IdentityField::Mrn => text_equal(a.mrn.as_deref(), b.mrn.as_deref()),
        IdentityField::CompanyId => text_equal(a.company_id.as_deref(), b.company_id.as_deref()),
    }
}

/// Trimmed, ASCII case-insensitive equality of two optional identifiers.
pub fn text_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.map(str::trim), b.map(str::trim)) {
        (Some(x), Some(y)) if !x.is_empty() && !y.is_empty() => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// True when at least one exact identity field agrees.
pub fn shares_identity_field(a: &PatientRecord, b: &PatientRecord) -> bool {
    [IdentityField::Dob, IdentityField::Mrn, IdentityField::CompanyId]
        .iter()
        .any(|f| fields_equal(a, b, *f))
}

/// Pairwise duplicate predicate used by the grouper.
pub fn is_duplicate(a: &PatientRecord, b: &PatientRecord, threshold: u8) -> bool {
    a.pg_company_id == b.pg_company_id
        && name_matches(name_score(a, b), threshold)
        && shares_identity_field(a, b)
}
