// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Post-Run Metrics
//
// Diversity, discriminative power and exposure computed from the final
// feeds, the message table and the popularity ledger.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use statrs::function::erf::erfc;

use crate::graph::AgentGraph;
use crate::newsfeed::NewsfeedStore;
use crate::popularity::PopularityLedger;
use crate::simulation::SimulationEngine;
use crate::types::{AgentIdx, EnginePhase, MessageId, MessageTable};

// ─── Result types ────────────────────────────────────────────────────────────

/// Kendall tau-b between quality rank and human-share rank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiscriminativePower {
    pub tau: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExposureReport {
    pub total_views: u64,
    pub low_quality_views: u64,
    /// `low_quality_views / total_views`, 0 without views.
    pub fraction: f64,
}

/// A message joined with its popularity entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub agent_id: String,
    pub is_by_bot: bool,
    pub quality: f64,
    pub appeal: f64,
    pub human_shares: u64,
    pub bot_shares: u64,
    pub spread_via_agents: Vec<String>,
    pub seen_by_agents: Vec<String>,
    pub infeed_of_agents: Vec<String>,
    pub quality_rank: usize,
    pub share_rank: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Measurements {
    pub quality: f64,
    pub diversity: f64,
    pub discriminative_power: DiscriminativePower,
    pub exposure: ExposureReport,
    pub steps: u64,
    pub phase: EnginePhase,
    pub quality_timestep: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_messages: Option<Vec<MessageRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_feeds: Option<BTreeMap<String, Vec<MessageId>>>,
}

// ─── Diversity ───────────────────────────────────────────────────────────────

/// `Σ p ln p` over message frequencies in human feeds, in `[-ln N, 0]`.
///
/// Every slot counts once, so a message held by k human feeds has weight k.
pub fn diversity(feeds: &NewsfeedStore, graph: &AgentGraph) -> f64 {
    let mut counts: HashMap<MessageId, u64> = HashMap::new();
    let mut total = 0u64;
    for &human in graph.human_indices() {
        for &id in feeds.get(human).ids() {
            *counts.entry(id).or_insert(0) += 1;
            total += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / total as f64;
            p * p.ln()
        })
        .sum()
}

// ─── Discriminative power ────────────────────────────────────────────────────

/// Quality rank and share rank for every message, in table (id) order.
///
/// Quality ties keep id order; share ties keep quality order.
fn rankings(messages: &MessageTable, ledger: &PopularityLedger) -> (Vec<usize>, Vec<usize>) {
    let table: Vec<_> = messages.iter().collect();
    let shares: Vec<u64> = table
        .iter()
        .map(|m| ledger.entry(m.id).map_or(0, |e| e.human_shares))
        .collect();

    let mut by_quality: Vec<usize> = (0..table.len()).collect();
    by_quality.sort_by(|&a, &b| table[a].quality.total_cmp(&table[b].quality));

    let mut quality_rank = vec![0; table.len()];
    for (rank, &i) in by_quality.iter().enumerate() {
        quality_rank[i] = rank;
    }

    let mut by_share = by_quality;
    by_share.sort_by_key(|&i| shares[i]);

    let mut share_rank = vec![0; table.len()];
    for (rank, &i) in by_share.iter().enumerate() {
        share_rank[i] = rank;
    }

    (quality_rank, share_rank)
}

pub fn discriminative_power(messages: &MessageTable, ledger: &PopularityLedger) -> DiscriminativePower {
    let (quality_rank, share_rank) = rankings(messages, ledger);
    let x: Vec<f64> = quality_rank.iter().map(|&r| r as f64).collect();
    let y: Vec<f64> = share_rank.iter().map(|&r| r as f64).collect();
    let (tau, p_value) = kendall_tau(&x, &y);
    DiscriminativePower { tau, p_value }
}

/// Kendall tau-b with the asymptotic two-sided p-value.
///
/// O(n log n): sort by (x, y), then count discordant pairs as merge-sort
/// inversions of y. Returns `(NaN, NaN)` for fewer than two points or a
/// constant input.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> (f64, f64) {
    let n = x.len().min(y.len());
    if n < 2 {
        return (f64::NAN, f64::NAN);
    }

    let mut perm: Vec<usize> = (0..n).collect();
    perm.sort_by(|&a, &b| x[a].total_cmp(&x[b]).then(y[a].total_cmp(&y[b])));
    let xs: Vec<f64> = perm.iter().map(|&i| x[i]).collect();
    let mut ys: Vec<f64> = perm.iter().map(|&i| y[i]).collect();

    let joint_ties = count_joint_ties(&xs, &ys);
    let x_ties = TieCounts::of_sorted(&xs);
    let discordant = count_inversions(&mut ys) as f64;
    let y_ties = TieCounts::of_sorted(&ys);

    let nf = n as f64;
    let total = nf * (nf - 1.0) / 2.0;
    if x_ties.pairs == total || y_ties.pairs == total {
        return (f64::NAN, f64::NAN);
    }

    let con_minus_dis = total - x_ties.pairs - y_ties.pairs + joint_ties - 2.0 * discordant;
    let tau = (con_minus_dis / (total - x_ties.pairs).sqrt() / (total - y_ties.pairs).sqrt())
        .clamp(-1.0, 1.0);

    let m = nf * (nf - 1.0);
    let mut var = (m * (2.0 * nf + 5.0) - x_ties.v1 - y_ties.v1) / 18.0
        + (2.0 * x_ties.pairs * y_ties.pairs) / m;
    if n > 2 {
        var += x_ties.v0 * y_ties.v0 / (9.0 * m * (nf - 2.0));
    }
    let z = con_minus_dis / var.sqrt();
    let p_value = erfc(z.abs() / std::f64::consts::SQRT_2);

    (tau, p_value)
}

struct TieCounts {
    /// Σ t(t-1)/2
    pairs: f64,
    /// Σ t(t-1)(t-2)
    v0: f64,
    /// Σ t(t-1)(2t+5)
    v1: f64,
}

impl TieCounts {
    fn of_sorted(values: &[f64]) -> Self {
        let mut counts = Self { pairs: 0.0, v0: 0.0, v1: 0.0 };
        let mut start = 0;
        while start < values.len() {
            let mut end = start + 1;
            while end < values.len() && values[end] == values[start] {
                end += 1;
            }
            let t = (end - start) as f64;
            counts.pairs += t * (t - 1.0) / 2.0;
            counts.v0 += t * (t - 1.0) * (t - 2.0);
            counts.v1 += t * (t - 1.0) * (2.0 * t + 5.0);
            start = end;
        }
        counts
    }
}

/// Pairs tied in both coordinates. Input is sorted by (x, y).
fn count_joint_ties(xs: &[f64], ys: &[f64]) -> f64 {
    let mut ties = 0.0;
    let mut run = 1.0;
    for i in 1..xs.len() {
        if xs[i] == xs[i - 1] && ys[i] == ys[i - 1] {
            run += 1.0;
        } else {
            ties += run * (run - 1.0) / 2.0;
            run = 1.0;
        }
    }
    ties + run * (run - 1.0) / 2.0
}

/// Sorts `v` and returns the number of strictly inverted pairs.
fn count_inversions(v: &mut [f64]) -> u64 {
    let n = v.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut inversions = count_inversions(&mut v[..mid]) + count_inversions(&mut v[mid..]);

    let mut merged = Vec::with_capacity(n);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < n {
        if v[j] < v[i] {
            merged.push(v[j]);
            inversions += (mid - i) as u64;
            j += 1;
        } else {
            merged.push(v[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&v[i..mid]);
    merged.extend_from_slice(&v[j..n]);
    v.copy_from_slice(&merged);
    inversions
}

// ─── Exposure ────────────────────────────────────────────────────────────────

/// Views of messages with `quality <= threshold` against all views.
pub fn exposure(messages: &MessageTable, ledger: &PopularityLedger, threshold: f64) -> ExposureReport {
    let (total_views, low_quality_views) = ledger.views_where(|id| {
        messages
            .get(id)
            .is_some_and(|m| m.quality <= threshold)
    });
    ExposureReport {
        total_views,
        low_quality_views,
        fraction: if total_views > 0 {
            low_quality_views as f64 / total_views as f64
        } else {
            0.0
        },
    }
}

// ─── Message records ─────────────────────────────────────────────────────────

pub fn message_records(
    messages: &MessageTable,
    ledger: &PopularityLedger,
    graph: &AgentGraph,
) -> Vec<MessageRecord> {
    let (quality_rank, share_rank) = rankings(messages, ledger);
    let uids = |agents: &[AgentIdx]| -> Vec<String> {
        agents.iter().map(|&a| graph.uid(a).to_string()).collect()
    };

    messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let entry = ledger.entry(m.id);
            MessageRecord {
                id: m.id,
                agent_id: entry
                    .as_ref()
                    .map(|e| graph.uid(e.origin_agent).to_string())
                    .unwrap_or_default(),
                is_by_bot: m.is_by_bot,
                quality: m.quality,
                appeal: m.appeal,
                human_shares: entry.as_ref().map_or(0, |e| e.human_shares),
                bot_shares: entry.as_ref().map_or(0, |e| e.bot_shares),
                spread_via_agents: entry.as_ref().map_or_else(Vec::new, |e| uids(&e.spread_via_agents[..])),
                seen_by_agents: entry.as_ref().map_or_else(Vec::new, |e| uids(&e.seen_by_agents[..])),
                infeed_of_agents: entry.as_ref().map_or_else(Vec::new, |e| uids(&e.infeed_of_agents[..])),
                quality_rank: quality_rank[i],
                share_rank: share_rank[i],
            }
        })
        .collect()
}

// ─── Collection ──────────────────────────────────────────────────────────────

pub fn collect(engine: &SimulationEngine) -> Measurements {
    let state = engine.state();
    let save = engine.config().save_message_info;

    let all_feeds = save.then(|| {
        engine
            .feeds()
            .iter()
            .map(|(agent, feed)| (engine.graph().uid(agent).to_string(), feed.ids().to_vec()))
            .collect()
    });

    Measurements {
        quality: state.quality,
        diversity: diversity(engine.feeds(), engine.graph()),
        discriminative_power: discriminative_power(engine.messages(), engine.ledger()),
        exposure: exposure(engine.messages(), engine.ledger(), 0.0),
        steps: state.time_step,
        phase: engine.phase(),
        quality_timestep: engine.history().quality_trace(),
        all_messages: save.then(|| message_records(engine.messages(), engine.ledger(), engine.graph())),
        all_feeds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AgentSpec, FollowEdge};
    use crate::types::Message;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn table(qualities: &[f64]) -> MessageTable {
        let mut t = MessageTable::new();
        for (i, &q) in qualities.iter().enumerate() {
            t.push(Message {
                id: i as MessageId + 1,
                is_by_bot: q == 0.0,
                quality: q,
                appeal: 0.5,
            })
            .unwrap();
        }
        t
    }

    fn three_humans() -> AgentGraph {
        AgentGraph::new(
            vec![AgentSpec::human("h1"), AgentSpec::human("h2"), AgentSpec::human("h3")],
            vec![FollowEdge::new("h1", "h2")],
        )
        .unwrap()
    }

    #[test]
    fn test_kendall_perfect_agreement_and_reversal() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let (tau, _) = kendall_tau(&x, &x);
        assert!(close(tau, 1.0));
        let rev = [5.0, 4.0, 3.0, 2.0, 1.0];
        let (tau, _) = kendall_tau(&x, &rev);
        assert!(close(tau, -1.0));
    }

    #[test]
    fn test_kendall_with_ties_matches_reference_values() {
        let (tau, p) = kendall_tau(&[12.0, 2.0, 1.0, 12.0, 2.0], &[1.0, 4.0, 7.0, 1.0, 0.0]);
        assert!((tau - -0.4714045207910317).abs() < 1e-12, "tau {}", tau);
        assert!((p - 0.2827454599327748).abs() < 1e-9, "p {}", p);
    }

    #[test]
    fn test_kendall_single_swap() {
        let (tau, p) = kendall_tau(&[1.0, 2.0, 3.0, 4.0, 5.0], &[1.0, 2.0, 3.0, 5.0, 4.0]);
        assert!((tau - 0.8).abs() < 1e-12);
        assert!((p - 0.05004352124870514).abs() < 1e-9);
    }

    #[test]
    fn test_kendall_degenerate_inputs() {
        assert!(kendall_tau(&[1.0], &[1.0]).0.is_nan());
        assert!(kendall_tau(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).0.is_nan());
        let (tau, p) = kendall_tau(&[0.0, 1.0], &[0.0, 1.0]);
        assert!(close(tau, 1.0));
        assert!((p - 0.31731050786291415).abs() < 1e-9);
    }

    #[test]
    fn test_inversion_count_sorts_input() {
        let mut v = [3.0, 1.0, 2.0, 2.0, 0.0];
        assert_eq!(count_inversions(&mut v), 7);
        assert_eq!(v, [0.0, 1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rankings_are_stable() {
        let messages = table(&[0.5, 0.0, 0.5, 0.9]);
        let ledger = PopularityLedger::new();
        for agent in 0..2 {
            ledger.record_share(1, agent, false, 1);
            ledger.record_share(2, agent, false, 1);
        }
        ledger.record_share(3, 0, false, 1);
        ledger.record_share(4, 0, false, 1);

        let (q, s) = rankings(&messages, &ledger);
        // quality order: m2, m1, m3, m4
        assert_eq!(q, vec![1, 0, 2, 3]);
        // shares: m1=2, m2=2, m3=1, m4=1; stable over quality order [m2, m1, m3, m4]
        // -> m3, m4, m2, m1
        assert_eq!(s, vec![3, 2, 0, 1]);
    }

    #[test]
    fn test_discriminative_power_needs_two_messages() {
        let messages = table(&[0.4]);
        let ledger = PopularityLedger::new();
        ledger.record_share(1, 0, false, 1);
        let power = discriminative_power(&messages, &ledger);
        assert!(power.tau.is_nan());
        assert!(power.p_value.is_nan());
    }

    #[test]
    fn test_diversity_bounds() {
        let graph = three_humans();
        let mut feeds = NewsfeedStore::new(3, 5);
        assert_eq!(diversity(&feeds, &graph), 0.0);

        // One message everywhere: fully concentrated.
        for agent in 0..3 {
            feeds.bulk_merge(agent, &[(1, 1)]);
        }
        assert!(close(diversity(&feeds, &graph), 0.0));

        // Three distinct messages, one slot each: -ln 3.
        let mut spread = NewsfeedStore::new(3, 5);
        for agent in 0..3 {
            spread.bulk_merge(agent, &[(agent as MessageId + 1, 1)]);
        }
        assert!(close(diversity(&spread, &graph), -(3.0f64).ln()));
    }

    #[test]
    fn test_diversity_ignores_bot_feeds() {
        let graph = AgentGraph::new(
            vec![AgentSpec::human("h"), AgentSpec::bot("b")],
            vec![FollowEdge::new("b", "h")],
        )
        .unwrap();
        let mut feeds = NewsfeedStore::new(2, 5);
        feeds.bulk_merge(0, &[(1, 1)]);
        feeds.bulk_merge(1, &[(2, 1), (3, 1)]);
        assert!(close(diversity(&feeds, &graph), 0.0));
    }

    #[test]
    fn test_exposure_counts_zero_quality_views() {
        let messages = table(&[0.0, 0.7]);
        let ledger = PopularityLedger::new();
        ledger.record_share(1, 0, true, 1);
        ledger.record_share(2, 1, false, 1);
        let mut store = NewsfeedStore::new(3, 5);
        store.bulk_merge(2, &[(1, 1), (2, 1)]);
        ledger.record_exposure(store.get(2), 2).unwrap();
        ledger.record_exposure(store.get(2), 2).unwrap();
        store.bulk_merge(1, &[(1, 1)]);
        ledger.record_exposure(store.get(1), 1).unwrap();

        let report = exposure(&messages, &ledger, 0.0);
        assert_eq!(report.total_views, 5);
        assert_eq!(report.low_quality_views, 3);
        assert!(close(report.fraction, 0.6));

        let empty = exposure(&messages, &PopularityLedger::new(), 0.0);
        assert_eq!(empty.fraction, 0.0);
    }

    #[test]
    fn test_message_records_join_uids() {
        let graph = three_humans();
        let messages = table(&[0.3, 0.6]);
        let ledger = PopularityLedger::new();
        ledger.record_share(1, 2, false, 1);
        ledger.record_share(1, 0, false, 1);
        ledger.record_share(2, 1, false, 1);

        let records = message_records(&messages, &ledger, &graph);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent_id, "h3");
        assert_eq!(records[0].spread_via_agents, vec!["h3", "h1"]);
        assert_eq!(records[0].human_shares, 2);
        assert_eq!(records[1].agent_id, "h2");
        assert_eq!(records[0].quality_rank, 0);
        assert_eq!(records[1].quality_rank, 1);
        // m2 has fewer shares, so it ranks first by shares.
        assert_eq!(records[1].share_rank, 0);
    }
}
