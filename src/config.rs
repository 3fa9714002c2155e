// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Simulation Parameters

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MU: f64 = 0.5;
pub const DEFAULT_ALPHA: usize = 15;
pub const DEFAULT_PHI: f64 = 0.0;
pub const DEFAULT_THETA: u32 = 1;
pub const DEFAULT_EPSILON: f64 = 0.0001;
pub const DEFAULT_RHO: f64 = 0.8;
pub const DEFAULT_APPEAL_EXPONENT: f64 = 5.0;
pub const DEFAULT_QUALITY_LAMBDA: f64 = -5.0;
pub const DEFAULT_WORKERS: usize = 7;
pub const DEFAULT_RECENCY_DECAY: f64 = 0.5;

// ─── Ranking weights ─────────────────────────────────────────────────────────

/// Convex weights of the reshare ranking. The recency weight is implicit:
/// `1 - engagement - popularity`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingWeights {
    pub engagement: f64,
    pub popularity: f64,
    /// Per-merge decay of the recency factor, `recency_decay^age`.
    pub recency_decay: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            engagement: 1.0,
            popularity: 0.0,
            recency_decay: DEFAULT_RECENCY_DECAY,
        }
    }
}

impl RankingWeights {
    pub fn recency(&self) -> f64 {
        (1.0 - self.engagement - self.popularity).max(0.0)
    }
}

// ─── Stop rule ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum StopRule {
    /// Stop once `quality_diff <= epsilon`.
    #[default]
    Convergence,
    /// Run exactly `max_steps` timesteps.
    StepLimit { max_steps: u64 },
    /// Whichever of convergence or `max_steps` comes first.
    Either { max_steps: u64 },
}

impl StopRule {
    pub fn max_steps(&self) -> Option<u64> {
        match self {
            Self::Convergence => None,
            Self::StepLimit { max_steps } | Self::Either { max_steps } => Some(*max_steps),
        }
    }

    pub fn checks_convergence(&self) -> bool {
        !matches!(self, Self::StepLimit { .. })
    }
}

// ─── SimConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Probability that an agent posts a new message instead of resharing.
    pub mu: f64,
    /// Feed capacity.
    #[serde(alias = "sigma")]
    pub alpha: usize,
    /// Probability that a bot message gets maximal appeal.
    pub phi: f64,
    /// Copies a bot pushes into each follower feed.
    pub theta: u32,
    /// Convergence threshold on the relative quality change.
    pub epsilon: f64,
    /// Weight of the previous quality in the moving average.
    pub rho: f64,
    pub appeal_exponent: f64,
    /// Exponent of the bounded exponential quality law `f(x) ~ e^(-lambda x)`.
    pub quality_lambda: f64,
    pub ranking: RankingWeights,
    pub workers: usize,
    pub stop: StopRule,
    pub seed: u64,
    /// Randomize the agent order every timestep.
    pub shuffle_agents: bool,
    /// Keep a per-timestep snapshot history.
    pub track_timesteps: bool,
    /// Record reshare cascade edges during aggregation.
    pub track_cascades: bool,
    /// Include per-message records and final feeds in the measurements.
    pub save_message_info: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mu: DEFAULT_MU,
            alpha: DEFAULT_ALPHA,
            phi: DEFAULT_PHI,
            theta: DEFAULT_THETA,
            epsilon: DEFAULT_EPSILON,
            rho: DEFAULT_RHO,
            appeal_exponent: DEFAULT_APPEAL_EXPONENT,
            quality_lambda: DEFAULT_QUALITY_LAMBDA,
            ranking: RankingWeights::default(),
            workers: DEFAULT_WORKERS,
            stop: StopRule::default(),
            seed: 0,
            shuffle_agents: true,
            track_timesteps: true,
            track_cascades: false,
            save_message_info: true,
        }
    }
}

impl SimConfig {
    /// Parse a JSON object; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate_or_err()?;
        Ok(config)
    }

    /// Validate the configuration and return a list of errors.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if !in_unit_interval(self.mu) {
            errors.push(ConfigError::InvalidMu(self.mu));
        }
        if !in_unit_interval(self.phi) {
            errors.push(ConfigError::InvalidPhi(self.phi));
        }
        if self.alpha == 0 {
            errors.push(ConfigError::ZeroCapacity);
        }
        if self.theta == 0 {
            errors.push(ConfigError::ZeroTheta);
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            errors.push(ConfigError::InvalidEpsilon(self.epsilon));
        }
        if !(self.rho.is_finite() && (0.0..1.0).contains(&self.rho)) {
            errors.push(ConfigError::InvalidRho(self.rho));
        }
        if !(self.appeal_exponent.is_finite() && self.appeal_exponent > 0.0) {
            errors.push(ConfigError::InvalidAppealExponent(self.appeal_exponent));
        }
        if !self.quality_lambda.is_finite() {
            errors.push(ConfigError::InvalidQualityLambda(self.quality_lambda));
        }

        let RankingWeights {
            engagement,
            popularity,
            recency_decay,
        } = self.ranking;
        // Small slack so that weights like 0.7 + 0.3 are not rejected on rounding.
        if !in_unit_interval(engagement)
            || !in_unit_interval(popularity)
            || engagement + popularity > 1.0 + 1e-9
        {
            errors.push(ConfigError::InvalidRankingWeights {
                engagement,
                popularity,
            });
        }
        if !(recency_decay.is_finite() && recency_decay > 0.0 && recency_decay <= 1.0) {
            errors.push(ConfigError::InvalidRecencyDecay(recency_decay));
        }

        if self.workers == 0 {
            errors.push(ConfigError::ZeroWorkers);
        }
        if self.stop.max_steps() == Some(0) {
            errors.push(ConfigError::ZeroStepLimit);
        }

        errors
    }

    /// Validate and return Ok(()) if valid, or Err with the first error.
    pub fn validate_or_err(&self) -> Result<(), ConfigError> {
        match self.validate().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn in_unit_interval(x: f64) -> bool {
    x.is_finite() && (0.0..=1.0).contains(&x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.alpha, 15);
        assert_eq!(config.theta, 1);
        assert_eq!(config.stop, StopRule::Convergence);
    }

    #[test]
    fn test_validate_collects_every_error() {
        let config = SimConfig {
            mu: 1.5,
            alpha: 0,
            theta: 0,
            rho: 1.0,
            workers: 0,
            ..SimConfig::default()
        };
        let errors = config.validate();
        assert!(errors.contains(&ConfigError::InvalidMu(1.5)));
        assert!(errors.contains(&ConfigError::ZeroCapacity));
        assert!(errors.contains(&ConfigError::ZeroTheta));
        assert!(errors.contains(&ConfigError::InvalidRho(1.0)));
        assert!(errors.contains(&ConfigError::ZeroWorkers));
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_ranking_weights_must_be_convex() {
        let config = SimConfig {
            ranking: RankingWeights {
                engagement: 0.8,
                popularity: 0.4,
                recency_decay: 0.5,
            },
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate_or_err(),
            Err(ConfigError::InvalidRankingWeights { .. })
        ));

        let ok = SimConfig {
            ranking: RankingWeights {
                engagement: 0.7,
                popularity: 0.3,
                recency_decay: 0.5,
            },
            ..SimConfig::default()
        };
        assert!(ok.validate_or_err().is_ok());
        assert!(ok.ranking.recency() < 1e-9);
    }

    #[test]
    fn test_zero_step_limit_rejected() {
        let config = SimConfig {
            stop: StopRule::Either { max_steps: 0 },
            ..SimConfig::default()
        };
        assert_eq!(config.validate_or_err(), Err(ConfigError::ZeroStepLimit));
    }

    #[test]
    fn test_from_json_fills_defaults_and_accepts_sigma() {
        let config = SimConfig::from_json_str(
            r#"{"mu": 0.25, "sigma": 3, "stop": {"rule": "either", "max_steps": 50}}"#,
        )
        .unwrap();
        assert_eq!(config.mu, 0.25);
        assert_eq!(config.alpha, 3);
        assert_eq!(config.stop, StopRule::Either { max_steps: 50 });
        assert_eq!(config.rho, DEFAULT_RHO);
    }

    #[test]
    fn test_from_json_rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            SimConfig::from_json_str(r#"{"gamma": 0.1}"#),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(
            SimConfig::from_json_str(r#"{"alpha": 0}"#),
            Err(ConfigError::ZeroCapacity)
        );
    }

    #[test]
    fn test_stop_rule_accessors() {
        assert_eq!(StopRule::Convergence.max_steps(), None);
        assert!(StopRule::Convergence.checks_convergence());
        assert!(!StopRule::StepLimit { max_steps: 3 }.checks_convergence());
        assert!(StopRule::Either { max_steps: 3 }.checks_convergence());
    }
}
