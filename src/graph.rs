// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Agent Graph
//
// Arena of agents with index-based follower lists. Edges point from
// follower to followee; messages travel the other way.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::types::AgentIdx;

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub uid: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl AgentSpec {
    pub fn human(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), is_bot: false }
    }

    pub fn bot(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), is_bot: true }
    }
}

/// `follower` sees what `followee` shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower: String,
    pub followee: String,
}

impl FollowEdge {
    pub fn new(follower: impl Into<String>, followee: impl Into<String>) -> Self {
        Self {
            follower: follower.into(),
            followee: followee.into(),
        }
    }
}

/// Serializable description of a graph built elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub follows: Vec<FollowEdge>,
}

impl GraphSpec {
    pub fn into_graph(self) -> Result<AgentGraph, GraphError> {
        AgentGraph::new(self.agents, self.follows)
    }
}

// ---------------------------------------------------------------------------
// Agent arena
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agent {
    pub uid: String,
    pub is_bot: bool,
    /// Agents whose feeds receive this agent's posts, sorted.
    pub followers: Vec<AgentIdx>,
}

#[derive(Debug, Clone)]
pub struct AgentGraph {
    agents: Vec<Agent>,
    index: HashMap<String, AgentIdx>,
    humans: Vec<AgentIdx>,
}

impl AgentGraph {
    pub fn new(agents: Vec<AgentSpec>, follows: Vec<FollowEdge>) -> Result<Self, GraphError> {
        if agents.is_empty() {
            return Err(GraphError::Empty);
        }
        if agents.len() > AgentIdx::MAX as usize {
            return Err(GraphError::TooLarge { max: AgentIdx::MAX as usize });
        }

        let mut index = HashMap::with_capacity(agents.len());
        let mut arena = Vec::with_capacity(agents.len());
        for (i, spec) in agents.into_iter().enumerate() {
            if index.insert(spec.uid.clone(), i as AgentIdx).is_some() {
                return Err(GraphError::DuplicateAgent(spec.uid));
            }
            arena.push(Agent {
                uid: spec.uid,
                is_bot: spec.is_bot,
                followers: Vec::new(),
            });
        }

        for edge in follows {
            let follower = *index
                .get(&edge.follower)
                .ok_or_else(|| GraphError::UnknownAgent(edge.follower.clone()))?;
            let followee = *index
                .get(&edge.followee)
                .ok_or_else(|| GraphError::UnknownAgent(edge.followee.clone()))?;
            if follower == followee {
                return Err(GraphError::SelfFollow(edge.follower));
            }
            arena[followee as usize].followers.push(follower);
        }

        for agent in arena.iter_mut() {
            agent.followers.sort_unstable();
            agent.followers.dedup();
        }

        let humans = arena
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.is_bot)
            .map(|(i, _)| i as AgentIdx)
            .collect();

        Ok(Self {
            agents: arena,
            index,
            humans,
        })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agent(&self, idx: AgentIdx) -> Option<&Agent> {
        self.agents.get(idx as usize)
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn followers(&self, idx: AgentIdx) -> &[AgentIdx] {
        self.agents
            .get(idx as usize)
            .map_or(&[][..], |a| a.followers.as_slice())
    }

    pub fn index_of(&self, uid: &str) -> Option<AgentIdx> {
        self.index.get(uid).copied()
    }

    pub fn uid(&self, idx: AgentIdx) -> &str {
        self.agents.get(idx as usize).map_or("", |a| a.uid.as_str())
    }

    pub fn is_bot(&self, idx: AgentIdx) -> bool {
        self.agents.get(idx as usize).is_some_and(|a| a.is_bot)
    }

    pub fn human_indices(&self) -> &[AgentIdx] {
        &self.humans
    }

    pub fn bot_count(&self) -> usize {
        self.agents.len() - self.humans.len()
    }

    /// Mean number of followers per agent.
    pub fn mean_in_degree(&self) -> f64 {
        let edges: usize = self.agents.iter().map(|a| a.followers.len()).sum();
        edges as f64 / self.agents.len() as f64
    }
}
