// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Newsfeed Store
//
// Bounded per-agent feeds stored as three parallel arrays. Index 0 holds the
// most recently touched message. Ages count merge events, not timesteps: a
// feed that receives nothing in a step does not age.

use std::collections::HashMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RankingWeights;
use crate::error::SimError;
use crate::types::{AgentIdx, MessageId, MessageTable};

// ─── AgentFeed ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFeed {
    ids: Vec<MessageId>,
    /// Cumulative copies merged into the slot; drives the popularity factor.
    shares: Vec<u32>,
    /// Copies the slot currently stands for, never more than the capacity.
    copies: Vec<u32>,
    ages: Vec<u32>,
}

/// Result of merging incoming messages into one feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeOutcome {
    /// Mean slot age before the merge; 0 for an empty feed.
    pub mean_age_before: f64,
    pub evicted: usize,
}

impl AgentFeed {
    pub fn ids(&self) -> &[MessageId] {
        &self.ids
    }

    pub fn shares(&self) -> &[u32] {
        &self.shares
    }

    pub fn copies(&self) -> &[u32] {
        &self.copies
    }

    pub fn ages(&self) -> &[u32] {
        &self.ages
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn mean_age(&self) -> f64 {
        if self.ages.is_empty() {
            return 0.0;
        }
        self.ages.iter().map(|&a| a as f64).sum::<f64>() / self.ages.len() as f64
    }

    /// Merge tallied `(message, copies)` pairs and evict down to `capacity`.
    ///
    /// Existing slots age by one. Incoming messages form the new front in
    /// tally order with age 0; a message already present keeps its share count
    /// plus the incoming copies. Overflow drops the oldest slots; among equal
    /// ages the more recent position survives. Held copies are capped at
    /// `capacity`, the most a feed of that size could show.
    pub fn merge(&mut self, incoming: &[(MessageId, u32)], capacity: usize) -> MergeOutcome {
        let mean_age_before = self.mean_age();
        if incoming.is_empty() {
            return MergeOutcome {
                mean_age_before,
                evicted: 0,
            };
        }

        let mut ids = Vec::with_capacity(self.ids.len() + incoming.len());
        let mut shares = Vec::with_capacity(ids.capacity());
        let mut held: Vec<u32> = Vec::with_capacity(ids.capacity());
        let mut ages = Vec::with_capacity(ids.capacity());
        let mut touched = vec![false; self.ids.len()];
        let existing: HashMap<MessageId, usize> =
            self.ids.iter().enumerate().map(|(slot, &id)| (id, slot)).collect();
        let mut front: HashMap<MessageId, usize> = HashMap::with_capacity(incoming.len());

        for &(id, copies) in incoming {
            if copies == 0 {
                continue;
            }
            // Repeated ids in `incoming` fold into the slot already placed up front.
            if let Some(&i) = front.get(&id) {
                shares[i] += copies;
                held[i] = bounded(held[i].saturating_add(copies), capacity);
                continue;
            }
            front.insert(id, ids.len());
            match existing.get(&id).copied() {
                Some(slot) => {
                    touched[slot] = true;
                    ids.push(id);
                    shares.push(self.shares[slot] + copies);
                    held.push(bounded(self.copies[slot].saturating_add(copies), capacity));
                    ages.push(0);
                }
                None => {
                    ids.push(id);
                    shares.push(copies);
                    held.push(bounded(copies, capacity));
                    ages.push(0);
                }
            }
        }

        for slot in 0..self.ids.len() {
            if !touched[slot] {
                ids.push(self.ids[slot]);
                shares.push(self.shares[slot]);
                held.push(self.copies[slot]);
                ages.push(self.ages[slot].saturating_add(1));
            }
        }

        let mut evicted = 0;
        if ids.len() > capacity {
            let mut order: Vec<usize> = (0..ids.len()).collect();
            order.sort_by_key(|&i| ages[i]);
            order.truncate(capacity);
            order.sort_unstable();
            evicted = ids.len() - capacity;
            ids = order.iter().map(|&i| ids[i]).collect();
            shares = order.iter().map(|&i| shares[i]).collect();
            held = order.iter().map(|&i| held[i]).collect();
            ages = order.iter().map(|&i| ages[i]).collect();
        }

        self.ids = ids;
        self.shares = shares;
        self.copies = held;
        self.ages = ages;

        MergeOutcome {
            mean_age_before,
            evicted,
        }
    }

    /// Selection probability of every slot under `weights`.
    ///
    /// Appeal, share count and `recency_decay^age` are each normalized to sum
    /// to 1 over the feed (uniform when a factor sums to 0) and then combined.
    pub fn ranking_scores(
        &self,
        messages: &MessageTable,
        weights: &RankingWeights,
    ) -> Result<Vec<f64>, SimError> {
        let appeal: Vec<f64> = self
            .ids
            .iter()
            .map(|&id| {
                messages
                    .get(id)
                    .map(|m| m.appeal)
                    .ok_or(SimError::UnknownMessage(id))
            })
            .collect::<Result<_, _>>()?;
        let popularity: Vec<f64> = self.shares.iter().map(|&s| s as f64).collect();
        let recency: Vec<f64> = self
            .ages
            .iter()
            .map(|&a| weights.recency_decay.powi(a as i32))
            .collect();

        let appeal = normalized(&appeal);
        let popularity = normalized(&popularity);
        let recency = normalized(&recency);
        let w_recency = weights.recency();

        Ok((0..self.ids.len())
            .map(|i| {
                weights.engagement * appeal[i]
                    + weights.popularity * popularity[i]
                    + w_recency * recency[i]
            })
            .collect())
    }
}

fn bounded(copies: u32, capacity: usize) -> u32 {
    copies.min(u32::try_from(capacity).unwrap_or(u32::MAX))
}

fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![1.0 / values.len() as f64; values.len()]
    }
}

// ─── NewsfeedStore ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewsfeedStore {
    feeds: Vec<AgentFeed>,
    capacity: usize,
}

impl NewsfeedStore {
    pub fn new(n_agents: usize, capacity: usize) -> Self {
        Self {
            feeds: vec![AgentFeed::default(); n_agents],
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Feed of `agent`; an agent outside the store has an empty feed.
    pub fn get(&self, agent: AgentIdx) -> &AgentFeed {
        static EMPTY: AgentFeed = AgentFeed {
            ids: Vec::new(),
            shares: Vec::new(),
            copies: Vec::new(),
            ages: Vec::new(),
        };
        self.feeds.get(agent as usize).unwrap_or(&EMPTY)
    }

    /// Pick a message from `agent`'s feed for resharing.
    ///
    /// Returns `None` for an empty feed; callers fall back to posting.
    pub fn rank_for_reshare<R: Rng>(
        &self,
        agent: AgentIdx,
        messages: &MessageTable,
        weights: &RankingWeights,
        rng: &mut R,
    ) -> Result<Option<(MessageId, Vec<f64>)>, SimError> {
        let feed = self.get(agent);
        if feed.is_empty() {
            return Ok(None);
        }
        let scores = feed.ranking_scores(messages, weights)?;
        let pick = match WeightedIndex::new(&scores) {
            Ok(dist) => dist.sample(rng),
            // Only reachable with NaN scores; fall back to a uniform draw.
            Err(_) => rng.gen_range(0..feed.len()),
        };
        Ok(Some((feed.ids[pick], scores)))
    }

    /// Merge tallied messages into `agent`'s feed. Single writer only.
    pub fn bulk_merge(&mut self, agent: AgentIdx, incoming: &[(MessageId, u32)]) -> MergeOutcome {
        let capacity = self.capacity;
        match self.feeds.get_mut(agent as usize) {
            Some(feed) => feed.merge(incoming, capacity),
            None => MergeOutcome {
                mean_age_before: 0.0,
                evicted: 0,
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentIdx, &AgentFeed)> {
        self.feeds
            .iter()
            .enumerate()
            .map(|(i, f)| (i as AgentIdx, f))
    }

    pub fn total_slots(&self) -> usize {
        self.feeds.iter().map(AgentFeed::len).sum()
    }
}

/// Fold repeated message ids into `(id, copies)` pairs in first-seen order.
pub fn tally(incoming: &[(MessageId, u32)]) -> Vec<(MessageId, u32)> {
    let mut out: Vec<(MessageId, u32)> = Vec::with_capacity(incoming.len());
    let mut slot: HashMap<MessageId, usize> = HashMap::with_capacity(incoming.len());
    for &(id, copies) in incoming {
        match slot.get(&id) {
            Some(&i) => out[i].1 += copies,
            None => {
                slot.insert(id, out.len());
                out.push((id, copies));
            }
        }
    }
    out
}
