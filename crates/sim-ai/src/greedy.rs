//! Greedy marginal-value baseline: no search, no backtracking.
//!
//! At each decision tick every purchasable item is scored on an isolated
//! what-if copy of the economy, the single best one is bought, and the
//! clock advances. Serves as the comparison floor for the annealing search.

use crate::priority::{unit_purchase_label, PurchaseRecord, RunReport};
use crate::search::SearchError;
use sim_core::{BoostDef, EventConfig, UnitDef};
use sim_econ::EventSim;
use tracing::debug;

#[derive(Clone, Copy)]
enum Pick<'c> {
    Unit(&'c UnitDef),
    Boost(&'c BoostDef),
}

/// Marginal value of one hypothetical purchase: DPS gain times remaining
/// seconds, per unit of summed resource cost (1 if the cost sums to zero).
/// `None` when the item is not purchasable or not affordable.
fn purchase_value(sim: &EventSim<'_>, pick: Pick<'_>) -> Option<f64> {
    let cost = match pick {
        Pick::Unit(unit) => sim.unit_upgrade_cost(&unit.id),
        Pick::Boost(boost) => sim.boost_upgrade_cost(&boost.id),
    }?;
    if !sim.can_afford(Some(cost)) {
        return None;
    }
    let mut probe = sim.fork();
    let applied = match pick {
        Pick::Unit(unit) => probe.upgrade_unit(&unit.id),
        Pick::Boost(boost) => probe.upgrade_boost(&boost.id),
    };
    if !applied {
        return None;
    }
    let gain = probe.dps() - sim.dps();
    let total_cost: f64 = cost.values().sum();
    let divisor = if total_cost > 0.0 { total_cost } else { 1.0 };
    Some(gain * (sim.remaining_ms() / 1000.0) / divisor)
}

/// Run a whole event buying the single best marginal-value purchase at each
/// decision tick.
pub fn greedy_run(cfg: &EventConfig, step_ms: f64) -> Result<RunReport, SearchError> {
    if !(step_ms.is_finite() && step_ms > 0.0) {
        return Err(SearchError::InvalidParam {
            field: "step_ms",
            reason: "must be > 0",
        });
    }
    let mut sim = EventSim::new(cfg);
    let mut log = Vec::new();
    while !sim.is_done() {
        let mut best: Option<(f64, Pick<'_>)> = None;
        for unit in &cfg.units {
            if let Some(value) = purchase_value(&sim, Pick::Unit(unit)) {
                if best.map_or(true, |(top, _)| value > top) {
                    best = Some((value, Pick::Unit(unit)));
                }
            }
        }
        for boost in &cfg.boosts {
            if let Some(value) = purchase_value(&sim, Pick::Boost(boost)) {
                if best.map_or(true, |(top, _)| value > top) {
                    best = Some((value, Pick::Boost(boost)));
                }
            }
        }
        if let Some((_, pick)) = best {
            let elapsed_hours = sim.elapsed_ms() / 3_600_000.0;
            let description = match pick {
                Pick::Unit(unit) => {
                    sim.upgrade_unit(&unit.id);
                    let level = sim.state().units.get(&unit.id).map_or(0, |us| us.level);
                    unit_purchase_label(&unit.name, level)
                }
                Pick::Boost(boost) => {
                    sim.upgrade_boost(&boost.id);
                    let level = sim.state().boosts.get(&boost.id).copied().unwrap_or(0);
                    format!("Buy {} Lv{}", boost.name, level)
                }
            };
            debug!(%description, elapsed_hours, "greedy purchase");
            log.push(PurchaseRecord {
                elapsed_hours,
                description,
            });
        }
        sim.advance(step_ms);
    }
    Ok(RunReport {
        damage: sim.total_damage(),
        log,
        final_state: sim.state().clone(),
    })
}
