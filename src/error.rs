// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Error Types

use thiserror::Error;

use crate::types::MessageId;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Invalid simulation parameters, detected before any timestep runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("mu must be within [0, 1], got {0}")]
    InvalidMu(f64),

    #[error("phi must be within [0, 1], got {0}")]
    InvalidPhi(f64),

    #[error("feed capacity (alpha) must be at least 1")]
    ZeroCapacity,

    #[error("flooding multiplier (theta) must be at least 1")]
    ZeroTheta,

    #[error("epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),

    #[error("rho must be within [0, 1), got {0}")]
    InvalidRho(f64),

    #[error("appeal exponent must be positive and finite, got {0}")]
    InvalidAppealExponent(f64),

    #[error("quality lambda must be finite, got {0}")]
    InvalidQualityLambda(f64),

    #[error("ranking weights must be within [0, 1] and sum to at most 1 (engagement {engagement}, popularity {popularity})")]
    InvalidRankingWeights { engagement: f64, popularity: f64 },

    #[error("recency decay must be within (0, 1], got {0}")]
    InvalidRecencyDecay(f64),

    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("step limit must be at least 1")]
    ZeroStepLimit,

    #[error("Invalid config: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

/// Malformed agent graph handed to the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph has no agents")]
    Empty,

    #[error("duplicate agent uid: {0}")]
    DuplicateAgent(String),

    #[error("follow edge references unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent follows itself: {0}")]
    SelfFollow(String),

    #[error("graph exceeds {max} agents")]
    TooLarge { max: usize },
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Top-level error for the simulation engine.
///
/// Configuration and graph errors are fatal at construction. Failures during
/// a timestep abort the whole simulation: a partially aggregated step leaves
/// the feeds inconsistent, so nothing is retried.
#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("message {0} is not in the message table")]
    UnknownMessage(MessageId),

    #[error("message {0} has no popularity entry")]
    MissingPopularity(MessageId),

    #[error("message ids are not dense: expected {expected}, got {got}")]
    NonDenseMessageIds { expected: MessageId, got: MessageId },

    #[error("simulation aborted at time step {0}")]
    Aborted(u64),

    #[error("simulation already finished")]
    Finished,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
