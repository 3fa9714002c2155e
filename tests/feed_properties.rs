use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use simsom::metrics::kendall_tau;
use simsom::newsfeed::tally;
use simsom::{AgentFeed, MessageId};

fn arb_batch() -> impl Strategy<Value = Vec<(MessageId, u32)>> {
    prop::collection::vec((1u64..20, 1u32..4), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_merge_respects_capacity_and_ages(
        capacity in 1usize..8,
        batches in prop::collection::vec(arb_batch(), 1..20),
    ) {
        let mut feed = AgentFeed::default();
        for batch in batches {
            let incoming = tally(&batch);
            let before: HashMap<MessageId, u32> = feed
                .ids()
                .iter()
                .copied()
                .zip(feed.ages().iter().copied())
                .collect();
            let fresh: HashSet<MessageId> = incoming.iter().map(|(id, _)| *id).collect();

            feed.merge(&incoming, capacity);

            prop_assert!(feed.len() <= capacity);
            let unique: HashSet<_> = feed.ids().iter().collect();
            prop_assert_eq!(unique.len(), feed.len());
            prop_assert_eq!(feed.shares().len(), feed.len());
            prop_assert_eq!(feed.ages().len(), feed.len());
            prop_assert_eq!(feed.copies().len(), feed.len());
            prop_assert!(feed.copies().iter().all(|&c| c >= 1 && c as usize <= capacity));

            for (slot, &id) in feed.ids().iter().enumerate() {
                let age = feed.ages()[slot];
                if fresh.contains(&id) {
                    prop_assert_eq!(age, 0);
                } else {
                    let old = before.get(&id).copied();
                    prop_assert_eq!(Some(age), old.map(|a| a + 1));
                }
            }
        }
    }

    #[test]
    fn prop_tally_conserves_copies(batch in arb_batch()) {
        let tallied = tally(&batch);
        let total_in: u64 = batch.iter().map(|(_, c)| u64::from(*c)).sum();
        let total_out: u64 = tallied.iter().map(|(_, c)| u64::from(*c)).sum();
        prop_assert_eq!(total_in, total_out);
        let unique: HashSet<_> = tallied.iter().map(|(id, _)| id).collect();
        prop_assert_eq!(unique.len(), tallied.len());
    }

    #[test]
    fn prop_kendall_tau_is_bounded(perm in Just((0..30).collect::<Vec<u32>>()).prop_shuffle()) {
        let x: Vec<f64> = (0..perm.len()).map(|i| i as f64).collect();
        let y: Vec<f64> = perm.iter().map(|&v| f64::from(v)).collect();
        let (tau, p) = kendall_tau(&x, &y);
        prop_assert!((-1.0..=1.0).contains(&tau));
        prop_assert!((0.0..=1.0).contains(&p));
        // Symmetric in its arguments.
        let (tau_rev, _) = kendall_tau(&y, &x);
        prop_assert!((tau - tau_rev).abs() < 1e-12);
    }
}
