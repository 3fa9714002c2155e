// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Replicate Runs
// N runs per configuration with seeds seed..seed+N, aggregated as mean ± 95% CI

use std::time::Instant;

use serde::Serialize;

use crate::config::SimConfig;
use crate::error::Result;
use crate::graph::AgentGraph;
use crate::simulation::SimulationEngine;
use crate::types::EnginePhase;

// ─── Statistical Summary ─────────────────────────────────────────────────────

/// Two-sided normal quantile for a 95% interval.
const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

/// Welford running mean and squared deviations.
#[derive(Debug, Clone, Copy)]
struct Running {
    n: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Running {
    fn new() -> Self {
        Self { n: 0, mean: 0.0, m2: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY }
    }

    fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    fn finish(self) -> Stats {
        if self.n == 0 {
            return Stats { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let std_dev = if self.n > 1 { (self.m2 / (self.n - 1) as f64).sqrt() } else { 0.0 };
        let half_width = Z_95 * std_dev / (self.n as f64).sqrt();
        Stats {
            mean: self.mean,
            std_dev,
            ci_lower: self.mean - half_width,
            ci_upper: self.mean + half_width,
            min: self.min,
            max: self.max,
            n: self.n,
        }
    }
}

/// Non-finite samples (an undefined tau, say) are skipped.
impl FromIterator<f64> for Stats {
    fn from_iter<I: IntoIterator<Item = f64>>(samples: I) -> Self {
        let mut running = Running::new();
        for x in samples.into_iter().filter(|x| x.is_finite()) {
            running.push(x);
        }
        running.finish()
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ReplicateRun {
    pub seed: u64,
    pub quality: f64,
    pub diversity: f64,
    pub tau: f64,
    pub p_value: f64,
    pub steps: u64,
    pub phase: EnginePhase,
    pub elapsed_ms: u64,
}

// ─── Aggregate Report ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ReplicateReport {
    pub n_runs: usize,
    pub converged: usize,
    pub quality: Stats,
    pub diversity: Stats,
    pub tau: Stats,
    pub steps: Stats,
    pub individual_runs: Vec<ReplicateRun>,
}

/// Run `runs` independent simulations on the same graph.
///
/// Message info is never retained between runs; only the headline numbers
/// are kept.
pub fn run_replicates(graph: &AgentGraph, config: &SimConfig, runs: usize) -> Result<ReplicateReport> {
    let mut results = Vec::with_capacity(runs);
    for i in 0..runs {
        let seed = config.seed.wrapping_add(i as u64);
        let run_config = SimConfig {
            seed,
            save_message_info: false,
            ..config.clone()
        };

        let start = Instant::now();
        let mut engine = SimulationEngine::new(graph.clone(), run_config)?;
        let m = engine.run()?;
        let run = ReplicateRun {
            seed,
            quality: m.quality,
            diversity: m.diversity,
            tau: m.discriminative_power.tau,
            p_value: m.discriminative_power.p_value,
            steps: m.steps,
            phase: m.phase,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            run = i + 1,
            of = runs,
            seed,
            quality = run.quality,
            diversity = run.diversity,
            tau = run.tau,
            steps = run.steps,
            "replicate complete"
        );
        results.push(run);
    }

    Ok(aggregate(results))
}

fn aggregate(results: Vec<ReplicateRun>) -> ReplicateReport {
    let column = |f: fn(&ReplicateRun) -> f64| results.iter().map(f).collect::<Stats>();

    ReplicateReport {
        n_runs: results.len(),
        converged: results.iter().filter(|r| r.phase == EnginePhase::Converged).count(),
        quality: column(|r| r.quality),
        diversity: column(|r| r.diversity),
        tau: column(|r| r.tau),
        steps: column(|r| r.steps as f64),
        individual_runs: results,
    }
}
