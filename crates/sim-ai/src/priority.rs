//! Priority-list template construction and deterministic replay.
//!
//! An ordering is a permutation of every purchasable step in the event:
//! one entry per unlock or level-up across all units and boosts. Replay
//! walks the event clock in fixed decision ticks, buying at most one
//! affordable step per tick (always the one earliest in the ordering) and
//! scores the ordering by the damage dealt when time runs out.

use serde::{Deserialize, Serialize};
use sim_core::{BoostId, EventConfig, UnitId};
use sim_econ::{EconomyState, EventSim};
use std::collections::BTreeMap;
use thiserror::Error;

/// One purchasable step of an ordering.
///
/// A step names the item, not the level: the i-th occurrence of a key in
/// an ordering stands for that item's i-th purchase.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PriorityStep {
    /// Unlock or level up a unit.
    Unit(UnitId),
    /// Buy the next level of a boost.
    Boost(BoostId),
}

impl PriorityStep {
    fn label(&self) -> String {
        match self {
            PriorityStep::Unit(id) => format!("unit {}", id.0),
            PriorityStep::Boost(id) => format!("boost {}", id.0),
        }
    }
}

/// Errors from replaying a candidate ordering.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    /// The ordering names an item the template does not contain.
    #[error("ordering references {0}, which is not in the template")]
    UnknownStep(String),
    /// A per-item step count does not match the template.
    #[error("ordering has {actual} steps for {step}, expected {expected}")]
    StepCountMismatch {
        step: String,
        expected: usize,
        actual: usize,
    },
}

/// One purchase made during a replay.
#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseRecord {
    /// Event time of the purchase, in hours.
    pub elapsed_hours: f64,
    /// Human-readable action, e.g. "Upgrade Alpha → Lv2".
    pub description: String,
}

/// Outcome of a fully replayed run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Total damage dealt by event end.
    pub damage: f64,
    /// Chronological purchase log.
    pub log: Vec<PurchaseRecord>,
    /// State at event end.
    pub final_state: EconomyState,
}

/// Log label for a unit purchase that just reached `level`.
pub(crate) fn unit_purchase_label(name: &str, level: u32) -> String {
    if level <= 1 {
        format!("Unlock {name}")
    } else {
        format!("Upgrade {name} → Lv{level}")
    }
}

/// Every purchasable step of the event, in configuration order.
///
/// A default-unlocked unit contributes `max_level - 1` level-ups; a locked
/// unit contributes its unlock plus the level-ups, `max_level` steps in
/// total; a boost contributes `max_level` steps.
pub fn build_template(cfg: &EventConfig) -> Vec<PriorityStep> {
    let mut steps = Vec::new();
    for unit in &cfg.units {
        let count = if unit.unlocked_by_default {
            unit.max_level - 1
        } else {
            unit.max_level
        };
        for _ in 0..count {
            steps.push(PriorityStep::Unit(unit.id.clone()));
        }
    }
    for boost in &cfg.boosts {
        for _ in 0..boost.max_level {
            steps.push(PriorityStep::Boost(boost.id.clone()));
        }
    }
    steps
}

/// Replays orderings against fresh simulation runs.
///
/// The evaluator is a pure function of (ordering, step interval,
/// configuration): identical inputs always produce bit-identical scores.
pub struct Evaluator<'a> {
    cfg: &'a EventConfig,
    step_ms: f64,
    expected: BTreeMap<PriorityStep, usize>,
}

impl<'a> Evaluator<'a> {
    /// Bind an evaluator to a configuration and decision-tick interval.
    pub fn new(cfg: &'a EventConfig, step_ms: f64) -> Self {
        let mut expected: BTreeMap<PriorityStep, usize> = BTreeMap::new();
        for step in build_template(cfg) {
            *expected.entry(step).or_insert(0) += 1;
        }
        Self {
            cfg,
            step_ms,
            expected,
        }
    }

    /// The decision-tick interval this evaluator replays with.
    pub fn step_ms(&self) -> f64 {
        self.step_ms
    }

    /// Fitness of one ordering: total damage at event end.
    ///
    /// A malformed ordering scores negative infinity so the search can
    /// never select it, rather than aborting the whole run.
    pub fn evaluate(&self, ordering: &[PriorityStep]) -> f64 {
        let mut sim = EventSim::new(self.cfg);
        match self.replay(ordering, &mut sim, None) {
            Ok(damage) => damage,
            Err(_) => f64::NEG_INFINITY,
        }
    }

    /// Replay an ordering, also returning the purchase log and final state.
    pub fn replay_with_log(&self, ordering: &[PriorityStep]) -> Result<RunReport, EvalError> {
        let mut sim = EventSim::new(self.cfg);
        let mut log = Vec::new();
        let damage = self.replay(ordering, &mut sim, Some(&mut log))?;
        Ok(RunReport {
            damage,
            log,
            final_state: sim.state().clone(),
        })
    }

    fn check_counts(&self, ordering: &[PriorityStep]) -> Result<(), EvalError> {
        let mut counts: BTreeMap<&PriorityStep, usize> = BTreeMap::new();
        for step in ordering {
            *counts.entry(step).or_insert(0) += 1;
        }
        for step in counts.keys() {
            if !self.expected.contains_key(*step) {
                return Err(EvalError::UnknownStep(step.label()));
            }
        }
        for (step, expected) in &self.expected {
            let actual = counts.get(step).copied().unwrap_or(0);
            if actual != *expected {
                return Err(EvalError::StepCountMismatch {
                    step: step.label(),
                    expected: *expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn replay(
        &self,
        ordering: &[PriorityStep],
        sim: &mut EventSim<'_>,
        mut log: Option<&mut Vec<PurchaseRecord>>,
    ) -> Result<f64, EvalError> {
        self.check_counts(ordering)?;

        // positions[key] holds the ordering indices of that key's steps; the
        // consumed counter says how many of them have been bought already.
        let mut positions: BTreeMap<&PriorityStep, Vec<usize>> = BTreeMap::new();
        for (pos, step) in ordering.iter().enumerate() {
            positions.entry(step).or_default().push(pos);
        }
        let mut consumed: BTreeMap<&PriorityStep, usize> =
            positions.keys().map(|step| (*step, 0)).collect();
        let sentinel = ordering.len();

        while !sim.is_done() {
            let mut best_pos = sentinel;
            let mut best_step: Option<&PriorityStep> = None;
            for (step, slots) in &positions {
                let used = consumed[*step];
                if used >= slots.len() {
                    continue;
                }
                let pos = slots[used];
                if pos >= best_pos {
                    continue; // cannot beat the current pick
                }
                let cost = match step {
                    PriorityStep::Unit(id) => sim.unit_upgrade_cost(id),
                    PriorityStep::Boost(id) => sim.boost_upgrade_cost(id),
                };
                if sim.can_afford(cost) {
                    best_pos = pos;
                    best_step = Some(*step);
                }
            }

            // At most one purchase per decision tick, then the clock moves.
            if let Some(step) = best_step {
                let elapsed_hours = sim.elapsed_ms() / 3_600_000.0;
                let applied = match step {
                    PriorityStep::Unit(id) => sim.upgrade_unit(id),
                    PriorityStep::Boost(id) => sim.upgrade_boost(id),
                };
                if applied {
                    if let Some(log) = log.as_deref_mut() {
                        log.push(PurchaseRecord {
                            elapsed_hours,
                            description: self.describe_purchase(step, sim),
                        });
                    }
                    if let Some(used) = consumed.get_mut(step) {
                        *used += 1;
                    }
                }
            }
            sim.advance(self.step_ms);
        }
        Ok(sim.total_damage())
    }

    fn describe_purchase(&self, step: &PriorityStep, sim: &EventSim<'_>) -> String {
        match step {
            PriorityStep::Unit(id) => {
                let name = self.cfg.unit(id).map_or(id.0.as_str(), |u| u.name.as_str());
                let level = sim.state().units.get(id).map_or(0, |us| us.level);
                unit_purchase_label(name, level)
            }
            PriorityStep::Boost(id) => {
                let name = self
                    .cfg
                    .boost(id)
                    .map_or(id.0.as_str(), |b| b.name.as_str());
                let level = sim.state().boosts.get(id).copied().unwrap_or(0);
                format!("Buy {name} Lv{level}")
            }
        }
    }
}
