//! Property tests for the scheduler's fairness and the tree's lifecycle
//! guarantees.

use std::collections::HashMap;

use proptest::prelude::*;

use h2_priority::{Error, Priority, PriorityTree};

/// Distinct stream ids with arbitrary weights.
fn streams() -> impl Strategy<Value = Vec<(u32, u16)>> {
    proptest::collection::btree_map(1u32..500, 1u16..=256, 1..8)
        .prop_map(|streams| streams.into_iter().collect())
}

/// Distinct stream ids with power-of-two weights, for which virtual finish
/// times realign exactly once per service lap.
fn pow2_streams() -> impl Strategy<Value = Vec<(u32, u16)>> {
    proptest::collection::btree_map(1u32..500, 0u32..=8, 2..6).prop_map(|streams| {
        streams
            .into_iter()
            .map(|(id, shift)| (id, 1u16 << shift))
            .collect()
    })
}

fn populate(streams: &[(u32, u16)]) -> PriorityTree {
    let mut tree = PriorityTree::default();
    for &(id, weight) in streams {
        tree.insert_stream(
            id,
            Priority {
                weight,
                ..Priority::default()
            },
        )
        .unwrap();
        tree.unblock(id).unwrap();
    }
    tree
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Long-run service counts are proportional to weights: over L laps a
    // stream of weight w is served L*w times, give or take one lap of
    // finish-time deviation.
    #[test]
    fn service_counts_track_weights(streams in streams()) {
        let mut tree = populate(&streams);
        let period: usize = streams.iter().map(|&(_, w)| usize::from(w)).sum();
        let laps = 20;

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for _ in 0..laps * period {
            *counts.entry(tree.next_stream().unwrap()).or_default() += 1;
        }

        for &(id, weight) in &streams {
            let served = counts.get(&id).copied().unwrap_or(0);
            let expected = laps * usize::from(weight);
            prop_assert!(
                served.abs_diff(expected) <= usize::from(weight) + 2,
                "stream {} of weight {} served {} times, expected about {}",
                id, weight, served, expected,
            );
        }
    }

    // Every active stream is served at least once within two laps, however
    // light its weight.
    #[test]
    fn no_active_stream_starves(streams in streams()) {
        let mut tree = populate(&streams);
        let period: usize = streams.iter().map(|&(_, w)| usize::from(w)).sum();

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for _ in 0..2 * period {
            *counts.entry(tree.next_stream().unwrap()).or_default() += 1;
        }
        for &(id, _) in &streams {
            prop_assert!(counts.contains_key(&id), "stream {} was never served", id);
        }
    }

    // With power-of-two weights the schedule is exactly periodic: after one
    // settling lap, each lap of sum-of-weights yields repeats identically.
    #[test]
    fn power_of_two_schedules_repeat_each_lap(streams in pow2_streams()) {
        let mut tree = populate(&streams);
        let period: usize = streams.iter().map(|&(_, w)| usize::from(w)).sum();

        for _ in 0..period {
            tree.next_stream().unwrap();
        }
        let pattern: Vec<u32> = (0..period).map(|_| tree.next_stream().unwrap()).collect();
        for _ in 0..5 {
            for &expected in &pattern {
                prop_assert_eq!(tree.next_stream().unwrap(), expected);
            }
        }
    }

    // Inserting then removing a set of streams leaves an empty, deadlocked
    // tree with nothing retained.
    #[test]
    fn insert_then_remove_leaves_nothing_behind(streams in streams()) {
        let mut tree = PriorityTree::default();
        for &(id, weight) in &streams {
            tree.insert_stream(
                id,
                Priority { weight, ..Priority::default() },
            ).unwrap();
        }
        prop_assert_eq!(tree.stream_count(), streams.len());

        for &(id, _) in &streams {
            tree.remove_stream(id).unwrap();
        }
        prop_assert_eq!(tree.stream_count(), 0);
        prop_assert_eq!(tree.next_stream(), Err(Error::Deadlock));
        for &(id, _) in &streams {
            prop_assert!(!tree.contains(id));
        }
    }

    // Blocking and unblocking a stream returns the schedule to serving it;
    // the pair of calls never wedges a stream out of the rotation.
    #[test]
    fn block_unblock_round_trip_restores_service(streams in streams()) {
        let mut tree = populate(&streams);
        let period: usize = streams.iter().map(|&(_, w)| usize::from(w)).sum();
        let &(probe, _) = &streams[0];

        tree.block(probe).unwrap();
        tree.unblock(probe).unwrap();

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for _ in 0..2 * period {
            *counts.entry(tree.next_stream().unwrap()).or_default() += 1;
        }
        prop_assert!(counts.contains_key(&probe), "stream {} was never served", probe);
    }
}
