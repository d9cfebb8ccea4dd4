//! Ordering search: multi-restart simulated annealing with an exhaustive
//! single-swap refinement pass.
//!
//! The walk keeps a current ordering and tracks the best-ever ordering
//! separately: accepting a degradation moves the walk but never loses the
//! best. All randomness flows through an explicitly seeded [`ChaCha8Rng`],
//! so runs are reproducible and restart chains are isolated.

use crate::priority::{build_template, Evaluator, PriorityStep};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sim_core::EventConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Floor for the acceptance normalization divisor.
///
/// Damage scores can be astronomically large, so the Boltzmann test divides
/// delta by `temp * current_score`: temperature acts as a *relative*
/// threshold (0.30 starts by accepting ~30% degradations) instead of an
/// absolute one. The floor keeps the divisor positive near a zero score.
/// This couples the schedule to the score scale of the configuration; a
/// differently scaled economy needs the schedule recalibrated.
const SCORE_FLOOR: f64 = 1e6;

/// Longest slice the reversal operator may flip.
const MAX_REVERSAL_LEN: usize = 8;

/// Iterations between annealing progress lines.
const PROGRESS_EVERY: usize = 2000;

/// Errors from invalid search parameters.
#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    /// A tunable is outside its valid range.
    #[error("invalid search parameter {field}: {reason}")]
    InvalidParam {
        field: &'static str,
        reason: &'static str,
    },
}

/// Tunable knobs for the search pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Decision-tick interval used by the replay, in milliseconds.
    pub step_ms: f64,
    /// Annealing iterations per restart.
    pub iterations: usize,
    /// Independent annealing restarts.
    pub restarts: usize,
    /// Upper bound on refinement passes after annealing.
    pub hill_climb_passes: usize,
    /// Initial temperature of the geometric schedule.
    pub temp_start: f64,
    /// Final temperature of the geometric schedule.
    pub temp_end: f64,
    /// Master seed; each restart derives its own seed from it.
    pub seed: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            step_ms: 60_000.0,
            iterations: 20_000,
            restarts: 5,
            hill_climb_passes: 3,
            temp_start: 0.30,
            temp_end: 0.0001,
            seed: 42,
        }
    }
}

impl SearchParams {
    fn validate(&self) -> Result<(), SearchError> {
        if !(self.step_ms.is_finite() && self.step_ms > 0.0) {
            return Err(SearchError::InvalidParam {
                field: "step_ms",
                reason: "must be > 0",
            });
        }
        if self.iterations == 0 {
            return Err(SearchError::InvalidParam {
                field: "iterations",
                reason: "must be at least 1",
            });
        }
        if self.restarts == 0 {
            return Err(SearchError::InvalidParam {
                field: "restarts",
                reason: "must be at least 1",
            });
        }
        if !(self.temp_start.is_finite() && self.temp_start > 0.0) {
            return Err(SearchError::InvalidParam {
                field: "temp_start",
                reason: "must be > 0",
            });
        }
        if !(self.temp_end.is_finite() && self.temp_end > 0.0 && self.temp_end <= self.temp_start)
        {
            return Err(SearchError::InvalidParam {
                field: "temp_end",
                reason: "must be in (0, temp_start]",
            });
        }
        Ok(())
    }
}

/// Best ordering found by [`optimize`], with its score.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutcome {
    /// Best priority ordering across all restarts and refinement passes.
    pub ordering: Vec<PriorityStep>,
    /// Its total-damage score.
    pub score: f64,
}

/// Cooperative cancellation flag, checked at iteration boundaries.
///
/// Every candidate and the best-ever tracker are self-contained snapshots,
/// so stopping between iterations can never corrupt a search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the search stops at the next boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Derive one neighbor of an ordering.
///
/// Picks one of three operators: swap two distinct positions (p=0.50,
/// fine-grained), relocate one element (p=0.35, medium), or reverse a slice
/// of 2..=8 elements (p=0.15, block reordering). All three are pure
/// permutations, so per-item step counts are preserved by construction.
pub fn perturb(ordering: &[PriorityStep], rng: &mut impl Rng) -> Vec<PriorityStep> {
    let n = ordering.len();
    let mut neighbor = ordering.to_vec();
    if n < 2 {
        return neighbor;
    }
    let r: f64 = rng.gen();
    if r < 0.50 {
        let a = rng.gen_range(0..n);
        let mut b = rng.gen_range(0..n - 1);
        if b >= a {
            b += 1;
        }
        neighbor.swap(a, b);
    } else if r < 0.85 {
        let a = rng.gen_range(0..n);
        let b = rng.gen_range(0..n - 1);
        let step = neighbor.remove(a);
        neighbor.insert(b, step);
    } else {
        let a = rng.gen_range(0..n);
        let len = rng.gen_range(2..=n.min(MAX_REVERSAL_LEN));
        let end = (a + len).min(n);
        neighbor[a..end].reverse();
    }
    neighbor
}

fn anneal(
    evaluator: &Evaluator<'_>,
    template: &[PriorityStep],
    params: &SearchParams,
    rng: &mut ChaCha8Rng,
    cancel: &CancelToken,
) -> (Vec<PriorityStep>, f64) {
    let mut current = template.to_vec();
    current.shuffle(rng);
    let mut current_score = evaluator.evaluate(&current);
    let mut best = current.clone();
    let mut best_score = current_score;

    let exponent = 1.0 / params.iterations.saturating_sub(1).max(1) as f64;
    let cooling = (params.temp_end / params.temp_start).powf(exponent);
    let mut temp = params.temp_start;
    let mut accepted = 0usize;

    for i in 0..params.iterations {
        if cancel.is_cancelled() {
            break;
        }
        let candidate = perturb(&current, rng);
        let candidate_score = evaluator.evaluate(&candidate);
        let delta = candidate_score - current_score;
        let accept = delta > 0.0
            || rng.gen::<f64>() < (delta / (temp * current_score.max(SCORE_FLOOR))).exp();
        if accept {
            current = candidate;
            current_score = candidate_score;
            accepted += 1;
            if current_score > best_score {
                best = current.clone();
                best_score = current_score;
            }
        }
        temp *= cooling;
        if (i + 1) % PROGRESS_EVERY == 0 {
            debug!(
                iteration = i + 1,
                best = best_score,
                temp,
                accept_rate = accepted as f64 / (i + 1) as f64,
                "annealing progress"
            );
        }
    }
    (best, best_score)
}

/// One exhaustive refinement pass over every unordered position pair.
///
/// Evaluates all n(n-1)/2 single swaps and applies only the best improving
/// one. Returns the (possibly unchanged) ordering, its score, and whether
/// any swap improved it; `false` means the ordering is a local optimum
/// under single-swap moves.
pub fn hill_climb(
    evaluator: &Evaluator<'_>,
    ordering: &[PriorityStep],
    cancel: &CancelToken,
) -> (Vec<PriorityStep>, f64, bool) {
    let n = ordering.len();
    let base_score = evaluator.evaluate(ordering);
    let mut best_score = base_score;
    let mut best_swap = None;
    let mut scratch = ordering.to_vec();
    for i in 0..n {
        if cancel.is_cancelled() {
            break;
        }
        for j in (i + 1)..n {
            scratch.swap(i, j);
            let score = evaluator.evaluate(&scratch);
            scratch.swap(i, j);
            if score > best_score {
                best_score = score;
                best_swap = Some((i, j));
            }
        }
    }
    match best_swap {
        Some((i, j)) => {
            scratch.swap(i, j);
            (scratch, best_score, true)
        }
        None => (scratch, base_score, false),
    }
}

/// Full pipeline: multi-restart annealing, then exhaustive refinement.
///
/// Each restart anneals an independent chain from its own shuffle of the
/// template, seeded separately off the master seed; the globally best
/// ordering is then refined until converged or the pass cap is reached.
/// Cancellation is honored at restart, iteration and pass boundaries and
/// yields the best ordering found so far.
pub fn optimize(
    cfg: &EventConfig,
    params: &SearchParams,
    cancel: &CancelToken,
) -> Result<SearchOutcome, SearchError> {
    params.validate()?;
    let evaluator = Evaluator::new(cfg, params.step_ms);
    let template = build_template(cfg);
    let mut master = ChaCha8Rng::seed_from_u64(params.seed);

    let mut best = template.clone();
    let mut best_score = evaluator.evaluate(&best);
    for restart in 0..params.restarts {
        if cancel.is_cancelled() {
            break;
        }
        let mut chain_rng = ChaCha8Rng::seed_from_u64(master.gen());
        let (ordering, score) = anneal(&evaluator, &template, params, &mut chain_rng, cancel);
        let improved = score > best_score;
        info!(
            restart = restart + 1,
            restarts = params.restarts,
            score,
            improved,
            "annealing restart finished"
        );
        if improved {
            best = ordering;
            best_score = score;
        }
    }

    for pass in 0..params.hill_climb_passes {
        if cancel.is_cancelled() {
            break;
        }
        let (ordering, score, improved) = hill_climb(&evaluator, &best, cancel);
        best = ordering;
        best_score = score;
        if !improved {
            info!(pass = pass + 1, "refinement converged");
            break;
        }
        info!(pass = pass + 1, score, "refinement pass improved");
    }

    Ok(SearchOutcome {
        ordering: best,
        score: best_score,
    })
}
