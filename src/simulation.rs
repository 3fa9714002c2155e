// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Simulation Core
//
// One timestep = parallel fan-out of agent actions, single-threaded
// aggregation of their outcomes, then the quality update. Fan-out only
// reads; ids, ledger updates and feed merges happen in agent order.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::graph::AgentGraph;
use crate::message::{MessageDraft, MessageFactory, MessageParams};
use crate::metrics::{self, Measurements};
use crate::newsfeed::{self, AgentFeed, NewsfeedStore};
use crate::popularity::PopularityLedger;
use crate::time_series::{TimeSeries, TimestepSnapshot};
use crate::types::*;

/// Mixes the time step into the per-agent seed.
const STEP_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

// ─── SimulationEngine struct ─────────────────────────────────────────────────

pub struct SimulationEngine {
    pub(crate) config: SimConfig,
    pub(crate) graph: AgentGraph,
    pub(crate) factory: MessageFactory,
    pub(crate) feeds: NewsfeedStore,
    pub(crate) ledger: PopularityLedger,
    pub(crate) messages: MessageTable,
    pub(crate) state: SystemState,
    pub(crate) phase: EnginePhase,

    pool: rayon::ThreadPool,
    /// Agent visiting order, reshuffled each step when enabled.
    order: Vec<AgentIdx>,
    rng: ChaCha8Rng,

    pub(crate) history: TimeSeries,
    reshares: Vec<ReshareEvent>,
    views: ViewTally,
}

/// What one agent decided during fan-out.
#[derive(Debug, Clone, Copy)]
enum Shared {
    Reshare(MessageId),
    /// New message, issued an id during aggregation.
    Post(MessageDraft),
}

#[derive(Debug, Clone, Copy)]
struct AgentOutcome {
    agent: AgentIdx,
    shared: Shared,
}

/// Read-only view shared by every agent action of a timestep.
struct ActionContext<'a> {
    graph: &'a AgentGraph,
    feeds: &'a NewsfeedStore,
    messages: &'a MessageTable,
    config: &'a SimConfig,
    params: MessageParams,
    time_step: u64,
}

/// Running exposure totals, so per-step snapshots need no ledger scan.
#[derive(Debug, Clone, Copy, Default)]
struct ViewTally {
    total: u64,
    low_quality: u64,
}

impl ViewTally {
    fn record(&mut self, feed: &AgentFeed, messages: &MessageTable) {
        for &id in feed.ids() {
            self.total += 1;
            if messages.get(id).is_some_and(|m| m.quality <= 0.0) {
                self.low_quality += 1;
            }
        }
    }

    fn fraction(&self) -> f64 {
        if self.total > 0 {
            self.low_quality as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

/// Human feed statistics used by the quality estimate.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FeedCensus {
    pub quality_sum: f64,
    pub human_slots: usize,
    pub unique_human_messages: usize,
}

impl FeedCensus {
    pub fn mean_quality(&self) -> f64 {
        if self.human_slots > 0 {
            self.quality_sum / self.human_slots as f64
        } else {
            0.0
        }
    }
}

impl SimulationEngine {
    pub fn new(graph: AgentGraph, config: SimConfig) -> Result<Self> {
        config.validate_or_err()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("simsom-agent-{}", i))
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?;

        let n = graph.len();
        tracing::info!(
            agents = n,
            humans = graph.human_indices().len(),
            bots = graph.bot_count(),
            mean_followers = graph.mean_in_degree(),
            workers = config.workers,
            "simulation engine ready"
        );
        tracing::info!(
            mu = config.mu,
            alpha = config.alpha,
            phi = config.phi,
            theta = config.theta,
            epsilon = config.epsilon,
            rho = config.rho,
            "parameters"
        );

        Ok(Self {
            feeds: NewsfeedStore::new(n, config.alpha),
            order: (0..n as AgentIdx).collect(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            factory: MessageFactory::new(),
            ledger: PopularityLedger::new(),
            messages: MessageTable::new(),
            state: SystemState::default(),
            phase: EnginePhase::Running,
            history: TimeSeries::new(),
            reshares: Vec::new(),
            views: ViewTally::default(),
            pool,
            graph,
            config,
        })
    }

    /// Run until a terminal phase is reached, then collect measurements.
    pub fn run(&mut self) -> Result<Measurements> {
        while !self.phase.is_terminal() {
            self.step()?;
        }
        if self.phase == EnginePhase::Aborted {
            return Err(SimError::Aborted(self.state.time_step));
        }
        tracing::info!(
            steps = self.state.time_step,
            quality = self.state.quality,
            phase = ?self.phase,
            messages = self.messages.len(),
            "simulation finished"
        );
        Ok(metrics::collect(self))
    }

    /// Execute one timestep.
    pub fn step(&mut self) -> Result<StepResult> {
        match self.phase {
            EnginePhase::Running => {}
            EnginePhase::Aborted => return Err(SimError::Aborted(self.state.time_step)),
            _ => return Err(SimError::Finished),
        }
        match self.advance() {
            Ok(result) => Ok(result),
            Err(e) => {
                self.phase = EnginePhase::Aborted;
                tracing::error!(time_step = self.state.time_step, error = %e, "timestep failed");
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<StepResult> {
        self.state.time_step += 1;
        let time_step = self.state.time_step;

        if self.config.shuffle_agents {
            self.order.shuffle(&mut self.rng);
        }

        // 1. Fan-out: every agent acts on the feeds left by the previous step
        let outcomes = self.fan_out(time_step)?;

        // 2. Exposure, against the feeds the agents acted on
        for outcome in &outcomes {
            let feed = self.feeds.get(outcome.agent);
            self.ledger.record_exposure(feed, outcome.agent)?;
            self.views.record(feed, &self.messages);
        }

        // 3. Shares: new messages get ids in agent order
        let requests = self.apply_shares(&outcomes)?;

        // 4. Fan-in: group requests per follower feed and merge
        let mean_feed_age = self.aggregate(&requests, time_step)?;

        // 5. Quality update
        let census = self.census();
        let measured = census.mean_quality();
        self.update_quality(measured);

        // 6. Stop rule
        let converged = self.config.stop.checks_convergence()
            && self.state.quality_diff <= self.config.epsilon;
        let capped = self
            .config
            .stop
            .max_steps()
            .is_some_and(|max| time_step >= max);
        self.phase = if converged {
            EnginePhase::Converged
        } else if capped {
            EnginePhase::StepLimitReached
        } else {
            EnginePhase::Running
        };

        let snapshot = TimestepSnapshot {
            time_step,
            quality: self.state.quality,
            quality_diff: self.state.quality_diff,
            measured_quality: measured,
            mean_feed_age,
            human_slots: census.human_slots,
            unique_human_messages: census.unique_human_messages,
            total_slots: self.feeds.total_slots(),
            messages_created: self.factory.created(),
            low_quality_exposure: self.views.fraction(),
        };

        tracing::debug!(
            time_step,
            quality = self.state.quality,
            diff = self.state.quality_diff,
            human_slots = census.human_slots,
            all_slots = snapshot.total_slots,
            unique_human = census.unique_human_messages,
            created = snapshot.messages_created,
            "timestep complete"
        );

        if self.config.track_timesteps {
            self.history.record(snapshot.clone());
        }

        Ok(StepResult {
            state: self.state,
            phase: self.phase,
            snapshot,
        })
    }

    fn fan_out(&self, time_step: u64) -> Result<Vec<AgentOutcome>> {
        let ctx = ActionContext {
            graph: &self.graph,
            feeds: &self.feeds,
            messages: &self.messages,
            config: &self.config,
            params: MessageParams {
                phi: self.config.phi,
                appeal_exponent: self.config.appeal_exponent,
                quality_lambda: self.config.quality_lambda,
            },
            time_step,
        };
        let order = &self.order;
        self.pool.install(|| {
            order
                .par_iter()
                .map(|&agent| agent_action(&ctx, agent))
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Issue ids, record shares and build one request per follower, all in
    /// outcome order.
    fn apply_shares(&mut self, outcomes: &[AgentOutcome]) -> Result<Vec<FeedRequest>> {
        let theta = self.config.theta;
        let mut requests = Vec::new();
        for outcome in outcomes {
            let agent = outcome.agent;
            let is_bot = self.graph.is_bot(agent);
            let message = match outcome.shared {
                Shared::Reshare(id) => id,
                Shared::Post(draft) => {
                    let m = self.factory.issue(draft);
                    self.messages.push(m)?;
                    m.id
                }
            };

            self.ledger.record_share(message, agent, is_bot, theta);

            let copies = if is_bot { theta } else { 1 };
            requests.extend(self.graph.followers(agent).iter().map(|&follower| FeedRequest {
                target: follower,
                source: agent,
                message,
                copies,
            }));
        }
        Ok(requests)
    }

    /// Merge all requests into their target feeds. Returns the mean
    /// pre-merge age across the feeds that were touched.
    fn aggregate(&mut self, requests: &[FeedRequest], time_step: u64) -> Result<f64> {
        let mut incoming: Vec<Vec<(MessageId, u32)>> = vec![Vec::new(); self.graph.len()];
        for request in requests {
            if self.messages.get(request.message).is_none() {
                return Err(SimError::UnknownMessage(request.message));
            }
            incoming[request.target as usize].push((request.message, request.copies));
            if self.config.track_cascades {
                self.reshares.push(ReshareEvent {
                    message_id: request.message,
                    time_step,
                    source: self.graph.uid(request.source).to_string(),
                    target: self.graph.uid(request.target).to_string(),
                });
            }
        }

        let mut age_sum = 0.0;
        let mut merged = 0usize;
        for (target, requests) in incoming.iter().enumerate() {
            if requests.is_empty() {
                continue;
            }
            let tallied = newsfeed::tally(requests);
            let outcome = self.feeds.bulk_merge(target as AgentIdx, &tallied);
            age_sum += outcome.mean_age_before;
            merged += 1;
            tracing::trace!(
                feed = target,
                incoming = requests.len(),
                evicted = outcome.evicted,
                "feed merged"
            );
        }

        Ok(if merged > 0 { age_sum / merged as f64 } else { 0.0 })
    }

    fn update_quality(&mut self, measured: f64) {
        let old = self.state.quality;
        let new = self.config.rho * old + (1.0 - self.config.rho) * measured;
        self.state.quality_diff = if old > 0.0 { (new - old).abs() / old } else { 0.0 };
        self.state.quality = new;
    }

    pub(crate) fn census(&self) -> FeedCensus {
        let mut census = FeedCensus::default();
        let mut unique = HashSet::new();
        for &human in self.graph.human_indices() {
            for &id in self.feeds.get(human).ids() {
                if let Some(message) = self.messages.get(id) {
                    census.quality_sum += message.quality;
                }
                census.human_slots += 1;
                unique.insert(id);
            }
        }
        census.unique_human_messages = unique.len();
        census
    }

    /// Mean quality over every slot of every human feed.
    pub fn measure_average_quality(&self) -> f64 {
        self.census().mean_quality()
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn graph(&self) -> &AgentGraph {
        &self.graph
    }

    pub fn feeds(&self) -> &NewsfeedStore {
        &self.feeds
    }

    pub fn ledger(&self) -> &PopularityLedger {
        &self.ledger
    }

    pub fn messages(&self) -> &MessageTable {
        &self.messages
    }

    pub fn history(&self) -> &TimeSeries {
        &self.history
    }

    /// Take the reshare edges recorded since the last call.
    pub fn drain_reshares(&mut self) -> Vec<ReshareEvent> {
        std::mem::take(&mut self.reshares)
    }
}

// ─── Agent action ────────────────────────────────────────────────────────────

/// Independent stream per (seed, step, agent), so results do not depend on
/// which worker ran the action.
fn agent_rng(seed: u64, time_step: u64, agent: AgentIdx) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ time_step.wrapping_mul(STEP_SEED_MIX));
    rng.set_stream(u64::from(agent));
    rng
}

fn agent_action(ctx: &ActionContext<'_>, agent: AgentIdx) -> Result<AgentOutcome> {
    let mut rng = agent_rng(ctx.config.seed, ctx.time_step, agent);
    let is_bot = ctx.graph.is_bot(agent);
    let feed = ctx.feeds.get(agent);

    let reshared = if !feed.is_empty() && rng.gen::<f64>() >= ctx.config.mu {
        ctx.feeds
            .rank_for_reshare(agent, ctx.messages, &ctx.config.ranking, &mut rng)?
            .map(|(id, _)| id)
    } else {
        None
    };

    let shared = match reshared {
        Some(id) => Shared::Reshare(id),
        None => Shared::Post(MessageDraft::sample(is_bot, &ctx.params, &mut rng)),
    };

    Ok(AgentOutcome { agent, shared })
}
