use std::collections::HashMap;

use cascade_ids::cascade::{Cascade, ClassifierNode, Scorer, Topology, MAX_LEVELS};
use cascade_ids::provider::{FeatureProvider, MemoryProvider};
use cascade_ids::{Connection, Error, LabelSet, NORMAL};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Test cascade
//
//   normal ─┬─ dos ───┬─ neptune
//           │         └─ smurf
//           ├─ probe ─┬─ portsweep
//           │         └─ satan
//           └─ r2l
//
// Each node reads its score straight from the `s_<name>` attribute.
// ---------------------------------------------------------------------------

const CATEGORIES: [&str; 3] = ["dos", "probe", "r2l"];
const LEAVES: [&str; 4] = ["neptune", "smurf", "portsweep", "satan"];
const THRESHOLD: f64 = 0.5;

struct Passthrough;

impl Scorer for Passthrough {
    fn kind(&self) -> &'static str {
        "passthrough"
    }

    fn score(&self, features: &[f64]) -> Result<f64, Error> {
        Ok(features[0])
    }
}

fn score_field(name: &str) -> String {
    format!("s_{}", name)
}

fn children_of(name: &str) -> &'static [&'static str] {
    match name {
        "normal" => &CATEGORIES,
        "dos" => &["neptune", "smurf"],
        "probe" => &["portsweep", "satan"],
        _ => &[],
    }
}

fn build_cascade() -> Cascade {
    let names = std::iter::once(NORMAL)
        .chain(CATEGORIES)
        .chain(LEAVES);
    let nodes = names
        .map(|name| {
            ClassifierNode::new(name, vec![score_field(name)], THRESHOLD, Box::new(Passthrough))
                .unwrap()
        })
        .collect();

    let mut topology = HashMap::new();
    for parent in ["normal", "dos", "probe"] {
        let children = children_of(parent).iter().map(|s| s.to_string()).collect();
        topology.insert(parent.to_string(), children);
    }

    Cascade::new(nodes, Topology::new(NORMAL, topology).unwrap()).unwrap()
}

fn all_names() -> Vec<&'static str> {
    std::iter::once(NORMAL).chain(CATEGORIES).chain(LEAVES).collect()
}

// ---------------------------------------------------------------------------
// Proptest strategies
// ---------------------------------------------------------------------------

/// Scores biased towards both sides of the threshold, including the edges.
fn score_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(THRESHOLD),
        Just(1.0),
        0.0f64..THRESHOLD,
        THRESHOLD..=1.0f64,
    ]
}

fn connection_strategy() -> impl Strategy<Value = Connection> {
    let names = all_names();
    (
        proptest::collection::vec(score_strategy(), names.len()),
        proptest::collection::vec(any::<bool>(), names.len()),
    )
        .prop_map(move |(scores, flags)| {
            let mut conn = Connection::new(7);
            for ((name, score), flag) in names.iter().zip(scores).zip(flags) {
                conn = conn
                    .with(&score_field(name), score)
                    .with(name, if flag { 1.0 } else { 0.0 });
            }
            conn
        })
}

/// Straightforward re-statement of the traversal, used as the oracle.
fn expected(conn: &Connection) -> (LabelSet, u8, usize) {
    let score = |name: &str| conn.get(&score_field(name)).unwrap();

    if score(NORMAL) >= THRESHOLD {
        return (LabelSet::normal(), 1, 1);
    }

    let fired: Vec<&str> = CATEGORIES
        .iter()
        .copied()
        .filter(|c| score(c) >= THRESHOLD)
        .collect();
    let leaves: Vec<&str> = fired.iter().flat_map(|c| children_of(c).iter().copied()).collect();
    if leaves.is_empty() {
        return (LabelSet::normal(), 2, 1 + CATEGORIES.len());
    }

    let mut predicted: LabelSet = leaves
        .iter()
        .copied()
        .filter(|leaf| score(leaf) >= THRESHOLD)
        .collect();
    if predicted.is_empty() {
        predicted = LabelSet::normal();
    }
    (predicted, 3, 1 + CATEGORIES.len() + leaves.len())
}

// ---------------------------------------------------------------------------
// Property: the cascade agrees with the traversal oracle
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn evaluation_matches_oracle(conn in connection_strategy()) {
        let cascade = build_cascade();
        let trace = cascade.evaluate(&conn).unwrap();
        let (predicted, layers, visited) = expected(&conn);

        prop_assert_eq!(&trace.predicted, &predicted);
        prop_assert_eq!(trace.layers, layers);
        prop_assert_eq!(trace.scores.len(), visited);
    }
}

// ---------------------------------------------------------------------------
// Property: structural guarantees of every trace
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn trace_invariants(conn in connection_strategy()) {
        let cascade = build_cascade();
        let trace = cascade.evaluate(&conn).unwrap();

        // Prediction is never empty, and is either normal or leaf labels.
        prop_assert!(!trace.predicted.is_empty());
        if !trace.predicted.contains(NORMAL) {
            prop_assert!(trace.predicted.iter().all(|l| LEAVES.contains(&l)));
        } else {
            prop_assert_eq!(trace.predicted.len(), 1);
        }

        prop_assert!((1..=MAX_LEVELS as u8).contains(&trace.layers));
        prop_assert!(trace.elapsed_secs >= 0.0);

        // The root is always scored first, and no node is scored twice.
        prop_assert_eq!(trace.scores[0].0.as_str(), NORMAL);
        let mut seen = LabelSet::new();
        for (name, score) in &trace.scores {
            prop_assert!(seen.insert(name));
            prop_assert!((0.0..=1.0).contains(score));
        }
    }
}

// ---------------------------------------------------------------------------
// Property: every fetched connection yields exactly one record line
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn one_record_per_connection(conns in proptest::collection::vec(connection_strategy(), 0..20)) {
        let conns: Vec<Connection> = conns
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.id = i as i64;
                c
            })
            .collect();
        let provider = MemoryProvider::new(conns.clone());
        let cascade = build_cascade();

        let fetched = provider.fetch(&cascade.required_fields(), None).unwrap();
        let mut out = Vec::new();
        let written = cascade.evaluate_all(&fetched, &mut out).unwrap();

        prop_assert_eq!(written, conns.len());
        prop_assert_eq!(String::from_utf8(out).unwrap().lines().count(), conns.len());
    }
}

// ---------------------------------------------------------------------------
// Unit: boundary behavior
// ---------------------------------------------------------------------------

#[test]
fn threshold_is_inclusive() {
    let cascade = build_cascade();
    let mut conn = Connection::new(1);
    for name in all_names() {
        conn = conn.with(&score_field(name), 0.0).with(name, 0.0);
    }
    // Root at exactly the threshold counts as "looks normal".
    let conn = conn.with(&score_field(NORMAL), THRESHOLD);

    let trace = cascade.evaluate(&conn).unwrap();
    assert_eq!(trace.layers, 1);
    assert_eq!(trace.predicted, LabelSet::normal());
}

#[test]
fn out_of_range_score_aborts() {
    let cascade = build_cascade();
    let mut conn = Connection::new(1);
    for name in all_names() {
        conn = conn.with(&score_field(name), 0.0).with(name, 0.0);
    }
    let conn = conn.with(&score_field("dos"), 1.5);

    match cascade.evaluate(&conn) {
        Err(Error::ScoreOutOfRange { node, .. }) => assert_eq!(node, "dos"),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn missing_feature_aborts() {
    let cascade = build_cascade();
    let conn = Connection::new(1).with(&score_field(NORMAL), 0.0);

    assert!(matches!(
        cascade.evaluate(&conn),
        Err(Error::MissingFeature { .. })
    ));
}
