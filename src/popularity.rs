// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Popularity Ledger
//
// Per-message share and exposure bookkeeping. The engine applies updates in
// agent order after fan-out so entry sequences are reproducible, but the
// ledger is shareable: every entry sits behind its own mutex and the map
// lock is only taken for writing when a message is first shared.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::newsfeed::AgentFeed;
use crate::types::{AgentIdx, MessageId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityEntry {
    /// Agent that first shared (authored) the message.
    pub origin_agent: AgentIdx,
    pub human_shares: u64,
    /// Incremented by `theta` per bot share.
    pub bot_shares: u64,
    /// One element per share event, in arrival order.
    pub spread_via_agents: Vec<AgentIdx>,
    /// One element per activation of an agent holding the message.
    pub seen_by_agents: Vec<AgentIdx>,
    /// Like `seen_by_agents` but repeated per copy held in the feed.
    #[serde(default)]
    pub infeed_of_agents: Vec<AgentIdx>,
}

impl PopularityEntry {
    pub fn new(origin_agent: AgentIdx) -> Self {
        Self {
            origin_agent,
            human_shares: 0,
            bot_shares: 0,
            spread_via_agents: Vec::new(),
            seen_by_agents: Vec::new(),
            infeed_of_agents: Vec::new(),
        }
    }

    pub fn total_shares(&self) -> u64 {
        self.human_shares + self.bot_shares
    }
}

#[derive(Debug, Default)]
pub struct PopularityLedger {
    entries: RwLock<HashMap<MessageId, Mutex<PopularityEntry>>>,
}

impl PopularityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `agent` shared (or posted) `message`.
    ///
    /// The entry is created on first share with `agent` as its origin.
    pub fn record_share(&self, message: MessageId, agent: AgentIdx, is_bot: bool, theta: u32) {
        let apply = |entry: &mut PopularityEntry| {
            entry.spread_via_agents.push(agent);
            if is_bot {
                entry.bot_shares += u64::from(theta);
            } else {
                entry.human_shares += 1;
            }
        };

        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&message) {
                apply(&mut entry.lock());
                return;
            }
        }

        let mut entries = self.entries.write();
        let entry = entries
            .entry(message)
            .or_insert_with(|| Mutex::new(PopularityEntry::new(agent)));
        apply(entry.get_mut());
    }

    /// Record that `agent` was exposed to every message in its feed.
    pub fn record_exposure(&self, feed: &AgentFeed, agent: AgentIdx) -> Result<(), SimError> {
        let entries = self.entries.read();
        for (id, copies) in feed.ids().iter().zip(feed.copies()) {
            let entry = entries.get(id).ok_or(SimError::MissingPopularity(*id))?;
            let mut entry = entry.lock();
            entry.seen_by_agents.push(agent);
            entry
                .infeed_of_agents
                .extend(std::iter::repeat(agent).take(*copies as usize));
        }
        Ok(())
    }

    pub fn entry(&self, message: MessageId) -> Option<PopularityEntry> {
        self.entries.read().get(&message).map(|e| e.lock().clone())
    }

    pub fn contains(&self, message: MessageId) -> bool {
        self.entries.read().contains_key(&message)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clone every entry, sorted by message id.
    pub fn snapshot(&self) -> Vec<(MessageId, PopularityEntry)> {
        let entries = self.entries.read();
        let mut out: Vec<_> = entries.iter().map(|(id, e)| (*id, e.lock().clone())).collect();
        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }

    /// Total views (`seen_by_agents` lengths) over all messages.
    pub fn total_views(&self) -> u64 {
        self.views_where(|_| true).0
    }

    /// `(all views, views of messages matching pred)`.
    pub fn views_where(&self, pred: impl Fn(MessageId) -> bool) -> (u64, u64) {
        let entries = self.entries.read();
        entries.iter().fold((0, 0), |(all, matching), (id, entry)| {
            let views = entry.lock().seen_by_agents.len() as u64;
            if pred(*id) {
                (all + views, matching + views)
            } else {
                (all + views, matching)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_share_sets_origin() {
        let ledger = PopularityLedger::new();
        ledger.record_share(1, 4, false, 1);
        ledger.record_share(1, 9, false, 1);
        let entry = ledger.entry(1).unwrap();
        assert_eq!(entry.origin_agent, 4);
        assert_eq!(entry.human_shares, 2);
        assert_eq!(entry.spread_via_agents, vec![4, 9]);
    }

    #[test]
    fn test_bot_shares_count_theta_copies() {
        let ledger = PopularityLedger::new();
        ledger.record_share(3, 0, true, 4);
        ledger.record_share(3, 1, false, 4);
        let entry = ledger.entry(3).unwrap();
        assert_eq!(entry.bot_shares, 4);
        assert_eq!(entry.human_shares, 1);
        assert_eq!(entry.total_shares(), 5);
        assert_eq!(entry.spread_via_agents.len(), 2);
    }

    #[test]
    fn test_exposure_counts_views_and_copies() {
        let ledger = PopularityLedger::new();
        ledger.record_share(1, 0, false, 1);
        ledger.record_share(2, 0, true, 3);
        let mut feed = AgentFeed::default();
        feed.merge(&[(1, 1), (2, 3)], 10);

        ledger.record_exposure(&feed, 7).unwrap();
        let one = ledger.entry(1).unwrap();
        let two = ledger.entry(2).unwrap();
        assert_eq!(one.seen_by_agents, vec![7]);
        assert_eq!(one.infeed_of_agents, vec![7]);
        assert_eq!(two.seen_by_agents, vec![7]);
        assert_eq!(two.infeed_of_agents, vec![7, 7, 7]);
        assert_eq!(ledger.total_views(), 2);
        assert_eq!(ledger.views_where(|id| id == 2), (2, 1));
    }

    #[test]
    fn test_retouched_message_does_not_inflate_infeed() {
        let ledger = PopularityLedger::new();
        ledger.record_share(1, 0, false, 1);
        let mut feed = AgentFeed::default();
        for _ in 0..50 {
            feed.merge(&[(1, 1)], 1);
        }
        ledger.record_exposure(&feed, 3).unwrap();
        let entry = ledger.entry(1).unwrap();
        assert_eq!(entry.seen_by_agents, vec![3]);
        assert_eq!(entry.infeed_of_agents, vec![3]);
    }

    #[test]
    fn test_exposure_on_unknown_message_fails() {
        let ledger = PopularityLedger::new();
        let mut feed = AgentFeed::default();
        feed.merge(&[(5, 1)], 10);
        assert!(matches!(
            ledger.record_exposure(&feed, 0),
            Err(SimError::MissingPopularity(5))
        ));
    }

    #[test]
    fn test_concurrent_shares_are_not_lost() {
        let ledger = Arc::new(PopularityLedger::new());
        let handles: Vec<_> = (0..8u32)
            .map(|agent| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    for message in 1..=50 {
                        ledger.record_share(message, agent, false, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.len(), 50);
        for (_, entry) in ledger.snapshot() {
            assert_eq!(entry.human_shares, 8);
            assert_eq!(entry.spread_via_agents.len(), 8);
        }
    }

    #[test]
    fn test_entry_serde_roundtrip() {
        let entry = PopularityEntry {
            origin_agent: 3,
            human_shares: 5,
            bot_shares: 8,
            spread_via_agents: vec![3, 1, 2],
            seen_by_agents: vec![0, 0, 4],
            infeed_of_agents: vec![0, 0, 0, 4],
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: PopularityEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
