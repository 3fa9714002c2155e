// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite
//
// Agent-based model of information spread on a follower network with
// finite attention. Humans and bots post or reshare into their followers'
// feeds; the engine tracks the average quality of what humans see.

pub mod error;
pub mod types;
pub mod config;
pub mod graph;
pub mod message;
pub mod newsfeed;
pub mod popularity;
pub mod simulation;
pub mod metrics;
pub mod time_series;
pub mod replicates;

pub use config::{RankingWeights, SimConfig, StopRule};
pub use error::{ConfigError, GraphError, Result, SimError};
pub use graph::{AgentGraph, AgentSpec, FollowEdge, GraphSpec};
pub use message::{MessageDraft, MessageFactory, MessageParams};
pub use metrics::{DiscriminativePower, ExposureReport, Measurements, MessageRecord};
pub use newsfeed::{AgentFeed, NewsfeedStore};
pub use popularity::{PopularityEntry, PopularityLedger};
pub use replicates::{run_replicates, ReplicateReport, Stats};
pub use simulation::SimulationEngine;
pub use time_series::{TimeSeries, TimestepSnapshot};
pub use types::*;
