// Property-based tests for grouping and selection.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;

use chrono::NaiveDate;
use proptest::prelude::*;
use regmerge_recon::grouper::group_duplicates;
use regmerge_recon::model::{MemberScore, PatientRecord};
use regmerge_recon::selector::{select, Candidate};
use regmerge_recon::similarity::{is_duplicate, match_score};

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Small alphabets so that near-duplicates actually occur.
fn arb_first() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("John".to_string()),
        Just("Jon".to_string()),
        Just("Jonathan".to_string()),
        Just("Mary".to_string()),
        Just("Smith".to_string()),
        r"[A-Za-z]{1,8}",
    ]
}

fn arb_last() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Smith".to_string()),
        Just("Smyth".to_string()),
        Just("Jones".to_string()),
        Just("John".to_string()),
        r"[A-Za-z]{1,8}",
    ]
}

fn arb_record() -> impl Strategy<Value = PatientRecord> {
    (
        arb_first(),
        arb_last(),
        proptest::option::of(0u32..3),
        proptest::option::of(prop_oneof![Just("M1"), Just("m1 "), Just("M2"), Just("")]),
        proptest::option::of(prop_oneof![Just("C1"), Just("C2")]),
        prop_oneof![3 => Just("pg-1"), 1 => Just("pg-2")],
    )
        .prop_map(|(first, last, dob, mrn, company, pg)| PatientRecord {
            id: String::new(),
            first_name: first,
            last_name: last,
            dob: dob.and_then(|d| NaiveDate::from_ymd_opt(1950, 1, 1 + d)),
            mrn: mrn.map(str::to_string),
            company_id: company.map(str::to_string),
            pg_company_id: pg.to_string(),
            created_on: None,
        })
}

fn arb_records() -> impl Strategy<Value = Vec<PatientRecord>> {
    proptest::collection::vec(arb_record(), 0..12).prop_map(|mut records| {
        for (i, r) in records.iter_mut().enumerate() {
            r.id = format!("p{i:02}");
        }
        records
    })
}

fn arb_score() -> impl Strategy<Value = (Option<u8>, usize, u8, Option<u32>)> {
    (
        proptest::option::of(0u8..3),
        0usize..4,
        0u8..4,
        proptest::option::of(0u32..5),
    )
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn duplicate_relation_is_symmetric(a in arb_record(), b in arb_record(), threshold in 0u8..=100) {
        prop_assert_eq!(is_duplicate(&a, &b, threshold), is_duplicate(&b, &a, threshold));
    }

    #[test]
    fn match_score_is_symmetric_and_bounded(a in r"[a-zA-Z ]{0,20}", b in r"[a-zA-Z ]{0,20}") {
        let ab = match_score(&a, &b);
        prop_assert_eq!(ab, match_score(&b, &a));
        prop_assert!(ab <= 100);
    }

    #[test]
    fn groups_are_disjoint_and_non_singleton(records in arb_records(), threshold in 50u8..=100) {
        let groups = group_duplicates(&records, threshold);
        let mut seen = HashSet::new();
        for group in &groups {
            prop_assert!(group.members.len() >= 2);
            let pg = &group.members[0].pg_company_id;
            for member in &group.members {
                prop_assert!(seen.insert(member.id.clone()), "{} in two groups", member.id);
                prop_assert_eq!(&member.pg_company_id, pg);
            }
        }
    }

    #[test]
    fn ungrouped_records_match_nobody(records in arb_records(), threshold in 50u8..=100) {
        let groups = group_duplicates(&records, threshold);
        let grouped: HashSet<&str> = groups
            .iter()
            .flat_map(|g| g.members.iter().map(|m| m.id.as_str()))
            .collect();
        for a in records.iter().filter(|r| !grouped.contains(r.id.as_str())) {
            for b in records.iter().filter(|r| r.id != a.id) {
                prop_assert!(!is_duplicate(a, b, threshold));
            }
        }
        // every grouped member is linked to at least one other member
        for group in &groups {
            for a in &group.members {
                prop_assert!(group.members.iter().any(|b| b.id != a.id && is_duplicate(a, b, threshold)));
            }
        }
    }

    #[test]
    fn grouping_is_deterministic(records in arb_records()) {
        let first: Vec<Vec<String>> = group_duplicates(&records, 85).iter().map(|g| g.member_ids()).collect();
        let second: Vec<Vec<String>> = group_duplicates(&records, 85).iter().map(|g| g.member_ids()).collect();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn selection_ignores_input_order(
        scores in proptest::collection::vec(arb_score(), 1..6),
        rotate in 0usize..6,
    ) {
        let records: Vec<PatientRecord> = scores
            .iter()
            .enumerate()
            .map(|(i, (_, _, _, created))| PatientRecord {
                id: format!("p{i}"),
                first_name: "John".into(),
                last_name: "Smith".into(),
                dob: None,
                mrn: None,
                company_id: None,
                pg_company_id: "pg-1".into(),
                created_on: created
                    .and_then(|d| NaiveDate::from_ymd_opt(2020, 1, 1 + d))
                    .and_then(|d| d.and_hms_opt(0, 0, 0)),
            })
            .collect();
        let member_scores: Vec<MemberScore> = scores
            .iter()
            .enumerate()
            .map(|(i, (verification, orders, completeness, _))| MemberScore {
                patient_id: format!("p{i}"),
                order_count: *orders,
                completeness: *completeness,
                verification_score: *verification,
                extracted: None,
            })
            .collect();

        let mut candidates: Vec<Candidate<'_>> = records
            .iter()
            .zip(&member_scores)
            .map(|(record, score)| Candidate { record, score })
            .collect();
        let (primary, rest) = select(&candidates).unwrap();

        let shift = rotate % candidates.len();
        candidates.rotate_left(shift);
        candidates.reverse();
        let (primary2, rest2) = select(&candidates).unwrap();

        prop_assert_eq!(&primary, &primary2);
        prop_assert_eq!(&rest, &rest2);
        prop_assert_eq!(rest.len() + 1, records.len());
        prop_assert!(!rest.contains(&primary));
    }
}
