#![deny(warnings)]

//! Discrete-tick economy simulation for one event run.
//!
//! [`EventSim`] owns the mutable [`EconomyState`] for a single run and
//! borrows the immutable [`EventConfig`]. Time advances in arbitrary
//! millisecond deltas; each unit accumulates progress independently and may
//! fire several production ticks within one `advance` call. Failed
//! purchases are ordinary `false` returns with no state change, since that
//! is the dominant control path during replay rather than an error.

use serde::{Deserialize, Serialize};
use sim_core::{BoostId, BoostKind, Cost, EventConfig, ResourceId, UnitId};
use std::collections::BTreeMap;

/// Mutable progression state of one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    /// Whether the unit has been unlocked.
    pub unlocked: bool,
    /// Current level; 0 only while locked.
    pub level: u32,
    /// Milliseconds accumulated toward the next spawn.
    pub progress_ms: f64,
}

/// Full mutable state of one event run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomyState {
    /// Resource balances; never negative.
    pub resources: BTreeMap<ResourceId, f64>,
    /// Per-unit progression, keyed by unit id.
    pub units: BTreeMap<UnitId, UnitState>,
    /// Per-boost level, keyed by boost id.
    pub boosts: BTreeMap<BoostId, u32>,
    /// Elapsed event time in milliseconds.
    pub elapsed_ms: f64,
    /// Cumulative damage dealt; monotonically non-decreasing.
    pub total_damage: f64,
}

/// Simulation engine for one event run.
///
/// The configuration is shared read-only across any number of concurrent
/// engines; the state is exclusively owned, so runs never interfere.
pub struct EventSim<'a> {
    cfg: &'a EventConfig,
    state: EconomyState,
}

impl<'a> EventSim<'a> {
    /// Start a fresh run: zero balances, default-unlocked units at level 1.
    pub fn new(cfg: &'a EventConfig) -> Self {
        let resources = cfg.resources.iter().map(|r| (r.id.clone(), 0.0)).collect();
        let units = cfg
            .units
            .iter()
            .map(|u| {
                (
                    u.id.clone(),
                    UnitState {
                        unlocked: u.unlocked_by_default,
                        level: u32::from(u.unlocked_by_default),
                        progress_ms: 0.0,
                    },
                )
            })
            .collect();
        let boosts = cfg.boosts.iter().map(|b| (b.id.clone(), 0)).collect();
        Self {
            cfg,
            state: EconomyState {
                resources,
                units,
                boosts,
                elapsed_ms: 0.0,
                total_damage: 0.0,
            },
        }
    }

    /// What-if snapshot: clones the mutable state, shares the config.
    pub fn fork(&self) -> EventSim<'a> {
        EventSim {
            cfg: self.cfg,
            state: self.state.clone(),
        }
    }

    /// The configuration this run is bound to.
    pub fn config(&self) -> &'a EventConfig {
        self.cfg
    }

    /// Read access to the run state.
    pub fn state(&self) -> &EconomyState {
        &self.state
    }

    /// Elapsed event time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.state.elapsed_ms
    }

    /// Milliseconds left until the event ends.
    pub fn remaining_ms(&self) -> f64 {
        (self.cfg.duration_ms - self.state.elapsed_ms).max(0.0)
    }

    /// Cumulative damage dealt so far.
    pub fn total_damage(&self) -> f64 {
        self.state.total_damage
    }

    /// Whether the event duration has been reached.
    pub fn is_done(&self) -> bool {
        self.state.elapsed_ms >= self.cfg.duration_ms
    }

    /// Spawn-interval multiplier from an owned speed boost, 1.0 if none.
    ///
    /// Validation guarantees every speed bonus is < 1.0, so the returned
    /// multiplier is strictly positive.
    pub fn speed_multiplier(&self) -> f64 {
        for boost in &self.cfg.boosts {
            if boost.kind == BoostKind::Speed {
                if let Some(&level) = self.state.boosts.get(&boost.id) {
                    if level > 0 {
                        return 1.0 - boost.bonus_by_level[level as usize - 1];
                    }
                }
            }
        }
        1.0
    }

    /// Damage multiplier from an owned damage boost, 1.0 if none.
    pub fn damage_multiplier(&self) -> f64 {
        for boost in &self.cfg.boosts {
            if boost.kind == BoostKind::Damage {
                if let Some(&level) = self.state.boosts.get(&boost.id) {
                    if level > 0 {
                        return 1.0 + boost.bonus_by_level[level as usize - 1];
                    }
                }
            }
        }
        1.0
    }

    /// Flat per-spawn production bonus for one resource, 0.0 if none owned.
    pub fn production_bonus(&self, resource: &ResourceId) -> f64 {
        for boost in &self.cfg.boosts {
            if boost.kind == BoostKind::ProductionBonus
                && boost.resource.as_ref() == Some(resource)
            {
                if let Some(&level) = self.state.boosts.get(&boost.id) {
                    if level > 0 {
                        return boost.bonus_by_level[level as usize - 1];
                    }
                }
            }
        }
        0.0
    }

    /// Advance the clock by `delta_ms`, firing every due production tick.
    ///
    /// Each active unit accrues progress independently; a fast unit can fire
    /// many ticks within a single call. Elapsed time advances whether or not
    /// anything fired.
    pub fn advance(&mut self, delta_ms: f64) {
        let cfg = self.cfg;
        let speed = self.speed_multiplier();
        let damage_mult = self.damage_multiplier();
        let production_bonus: BTreeMap<&ResourceId, f64> = cfg
            .resources
            .iter()
            .map(|r| (&r.id, self.production_bonus(&r.id)))
            .collect();

        for unit in &cfg.units {
            let Some(us) = self.state.units.get_mut(&unit.id) else {
                continue;
            };
            if !us.unlocked || us.level == 0 {
                continue;
            }
            let interval = unit.spawn_time_ms * speed;
            us.progress_ms += delta_ms;
            let ticks = (us.progress_ms / interval).floor();
            if ticks < 1.0 {
                continue;
            }
            us.progress_ms -= ticks * interval;
            let idx = us.level as usize - 1;
            let production = unit.production_by_level[idx]
                + production_bonus.get(&unit.produces).copied().unwrap_or(0.0);
            let damage = unit.damage_by_level[idx] * damage_mult;
            if let Some(balance) = self.state.resources.get_mut(&unit.produces) {
                *balance += production * ticks;
            }
            self.state.total_damage += damage * ticks;
        }
        self.state.elapsed_ms += delta_ms;
    }

    /// Price of the next purchase for a unit, `None` if not purchasable.
    ///
    /// Locked units are priced by their unlock cost; units at max level have
    /// no price at all (distinct from a free, empty cost).
    pub fn unit_upgrade_cost(&self, id: &UnitId) -> Option<&Cost> {
        let unit = self.cfg.unit(id)?;
        let us = self.state.units.get(id)?;
        if !us.unlocked {
            return unit.unlock_cost.as_ref();
        }
        if us.level >= unit.max_level {
            return None;
        }
        unit.upgrade_costs.get(us.level as usize - 1)
    }

    /// Price of the next level of a boost, `None` if already at max.
    pub fn boost_upgrade_cost(&self, id: &BoostId) -> Option<&Cost> {
        let boost = self.cfg.boost(id)?;
        let level = *self.state.boosts.get(id)?;
        if level >= boost.max_level {
            return None;
        }
        boost.costs.get(level as usize)
    }

    /// Whether every resource in the cost is covered by current balances.
    ///
    /// `None` (not purchasable) is never affordable; an empty cost is free
    /// and always affordable.
    pub fn can_afford(&self, cost: Option<&Cost>) -> bool {
        match cost {
            None => false,
            Some(cost) => cost.iter().all(|(resource, amount)| {
                self.state.resources.get(resource).copied().unwrap_or(0.0) >= *amount
            }),
        }
    }

    fn spend(&mut self, cost: &Cost) {
        for (resource, amount) in cost {
            if let Some(balance) = self.state.resources.get_mut(resource) {
                *balance -= amount;
            }
        }
    }

    /// Buy the next step for a unit: unlock to level 1, or level up.
    ///
    /// Returns `false` with no state change when the unit is unknown, at max
    /// level, or the price is not covered.
    pub fn upgrade_unit(&mut self, id: &UnitId) -> bool {
        let cost = match self.unit_upgrade_cost(id) {
            Some(cost) if self.can_afford(Some(cost)) => cost.clone(),
            _ => return false,
        };
        self.spend(&cost);
        let Some(us) = self.state.units.get_mut(id) else {
            return false;
        };
        if us.unlocked {
            us.level += 1;
        } else {
            us.unlocked = true;
            us.level = 1;
        }
        true
    }

    /// Buy the next level of a boost; `false` with no change on failure.
    pub fn upgrade_boost(&mut self, id: &BoostId) -> bool {
        let cost = match self.boost_upgrade_cost(id) {
            Some(cost) if self.can_afford(Some(cost)) => cost.clone(),
            _ => return false,
        };
        self.spend(&cost);
        if let Some(level) = self.state.boosts.get_mut(id) {
            *level += 1;
        }
        true
    }

    /// Instantaneous damage per second across all active units.
    ///
    /// Heuristic signal only; the tick loop never consults it.
    pub fn dps(&self) -> f64 {
        let speed = self.speed_multiplier();
        let damage_mult = self.damage_multiplier();
        let mut total = 0.0;
        for unit in &self.cfg.units {
            let Some(us) = self.state.units.get(&unit.id) else {
                continue;
            };
            if !us.unlocked || us.level == 0 {
                continue;
            }
            let interval_s = unit.spawn_time_ms * speed / 1000.0;
            total += unit.damage_by_level[us.level as usize - 1] * damage_mult / interval_s;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_core::{validate_event, BoostDef, EventConfig, ResourceDef, UnitDef};

    fn rid(id: &str) -> ResourceId {
        ResourceId(id.to_string())
    }

    fn uid(id: &str) -> UnitId {
        UnitId(id.to_string())
    }

    fn bid(id: &str) -> BoostId {
        BoostId(id.to_string())
    }

    fn cost(pairs: &[(&str, f64)]) -> Cost {
        pairs.iter().map(|(r, amount)| (rid(r), *amount)).collect()
    }

    /// One default unit, one locked unit, one boost of each kind.
    fn event() -> EventConfig {
        let cfg = EventConfig {
            id: "test-event".to_string(),
            name: "Test Event".to_string(),
            duration_ms: 600_000.0,
            resources: vec![ResourceDef { id: rid("gems") }, ResourceDef { id: rid("ore") }],
            units: vec![
                UnitDef {
                    id: uid("alpha"),
                    name: "Alpha".to_string(),
                    unlocked_by_default: true,
                    produces: rid("gems"),
                    spawn_time_ms: 1000.0,
                    max_level: 3,
                    production_by_level: vec![1.0, 2.0, 3.0],
                    damage_by_level: vec![5.0, 10.0, 25.0],
                    unlock_cost: None,
                    upgrade_costs: vec![cost(&[("gems", 5.0)]), cost(&[("gems", 50.0)])],
                },
                UnitDef {
                    id: uid("beta"),
                    name: "Beta".to_string(),
                    unlocked_by_default: false,
                    produces: rid("ore"),
                    spawn_time_ms: 2000.0,
                    max_level: 2,
                    production_by_level: vec![1.0, 2.0],
                    damage_by_level: vec![50.0, 100.0],
                    unlock_cost: Some(cost(&[("gems", 25.0)])),
                    upgrade_costs: vec![cost(&[("ore", 10.0)])],
                },
            ],
            boosts: vec![
                BoostDef {
                    id: bid("gem-boost"),
                    name: "Gem Boost".to_string(),
                    kind: BoostKind::ProductionBonus,
                    resource: Some(rid("gems")),
                    max_level: 2,
                    bonus_by_level: vec![1.0, 2.0],
                    costs: vec![cost(&[("gems", 10.0)]), cost(&[("gems", 20.0)])],
                },
                BoostDef {
                    id: bid("haste"),
                    name: "Haste".to_string(),
                    kind: BoostKind::Speed,
                    resource: None,
                    max_level: 1,
                    bonus_by_level: vec![0.5],
                    costs: vec![cost(&[("gems", 10.0)])],
                },
                BoostDef {
                    id: bid("fury"),
                    name: "Fury".to_string(),
                    kind: BoostKind::Damage,
                    resource: None,
                    max_level: 1,
                    bonus_by_level: vec![1.0],
                    costs: vec![cost(&[("gems", 10.0)])],
                },
            ],
        };
        validate_event(&cfg).unwrap();
        cfg
    }

    #[test]
    fn fresh_state_matches_config() {
        let cfg = event();
        let sim = EventSim::new(&cfg);
        assert_eq!(sim.state().units[&uid("alpha")].level, 1);
        assert!(sim.state().units[&uid("alpha")].unlocked);
        assert_eq!(sim.state().units[&uid("beta")].level, 0);
        assert!(!sim.state().units[&uid("beta")].unlocked);
        assert_eq!(sim.state().resources[&rid("gems")], 0.0);
        assert_eq!(sim.total_damage(), 0.0);
    }

    #[test]
    fn multiple_ticks_fire_within_one_advance() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(5500.0);
        // Alpha spawns every 1000 ms: 5 ticks, 500 ms left in the accumulator.
        assert_eq!(sim.state().resources[&rid("gems")], 5.0);
        assert_eq!(sim.total_damage(), 25.0);
        assert_eq!(sim.state().units[&uid("alpha")].progress_ms, 500.0);
        assert_eq!(sim.elapsed_ms(), 5500.0);
    }

    #[test]
    fn sub_interval_advance_accumulates_without_firing() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(999.0);
        assert_eq!(sim.total_damage(), 0.0);
        assert_eq!(sim.state().units[&uid("alpha")].progress_ms, 999.0);
        sim.advance(1.0);
        assert_eq!(sim.total_damage(), 5.0);
        assert_eq!(sim.state().units[&uid("alpha")].progress_ms, 0.0);
    }

    #[test]
    fn zero_purchase_baseline_damage() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        while !sim.is_done() {
            sim.advance(30_000.0);
        }
        // floor(600_000 / 1000) spawns at 5 damage each, only Alpha active.
        assert_eq!(sim.total_damage(), 600.0 * 5.0);
    }

    #[test]
    fn locked_unit_neither_produces_nor_accumulates() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(10_000.0);
        assert_eq!(sim.state().resources[&rid("ore")], 0.0);
        assert_eq!(sim.state().units[&uid("beta")].progress_ms, 0.0);
    }

    #[test]
    fn unlock_then_level_up() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        assert_eq!(sim.unit_upgrade_cost(&uid("beta")), Some(&cost(&[("gems", 25.0)])));
        assert!(!sim.upgrade_unit(&uid("beta")));
        sim.advance(25_000.0); // 25 gems
        assert!(sim.upgrade_unit(&uid("beta")));
        let beta = &sim.state().units[&uid("beta")];
        assert!(beta.unlocked);
        assert_eq!(beta.level, 1);
        assert_eq!(sim.state().resources[&rid("gems")], 0.0);
        // Next price comes from the upgrade table, not the unlock cost.
        assert_eq!(sim.unit_upgrade_cost(&uid("beta")), Some(&cost(&[("ore", 10.0)])));
    }

    #[test]
    fn max_level_is_not_purchasable() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(60_000.0);
        assert!(sim.upgrade_unit(&uid("alpha")));
        assert!(sim.upgrade_unit(&uid("alpha")));
        assert_eq!(sim.state().units[&uid("alpha")].level, 3);
        assert_eq!(sim.unit_upgrade_cost(&uid("alpha")), None);
        assert!(!sim.can_afford(None));
        assert!(!sim.upgrade_unit(&uid("alpha")));
        assert_eq!(sim.state().units[&uid("alpha")].level, 3);
    }

    #[test]
    fn failed_upgrade_leaves_state_untouched() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(4000.0); // 4 gems, upgrade needs 5
        let before = sim.state().clone();
        assert!(!sim.upgrade_unit(&uid("alpha")));
        assert!(!sim.upgrade_boost(&bid("gem-boost")));
        assert_eq!(sim.state(), &before);
    }

    #[test]
    fn empty_cost_is_free_but_none_is_not() {
        let cfg = event();
        let sim = EventSim::new(&cfg);
        let free = Cost::new();
        assert!(sim.can_afford(Some(&free)));
        assert!(!sim.can_afford(None));
    }

    #[test]
    fn production_bonus_applies_per_spawn() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(10_000.0); // 10 gems
        assert!(sim.upgrade_boost(&bid("gem-boost")));
        assert_eq!(sim.state().resources[&rid("gems")], 0.0);
        sim.advance(5000.0);
        // 5 spawns at (1 production + 1 bonus) each.
        assert_eq!(sim.state().resources[&rid("gems")], 10.0);
    }

    #[test]
    fn speed_boost_halves_spawn_interval() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(10_000.0);
        assert!(sim.upgrade_boost(&bid("haste")));
        assert_eq!(sim.speed_multiplier(), 0.5);
        let before = sim.total_damage();
        sim.advance(1000.0);
        // 1000 ms at a 500 ms effective interval: two spawns.
        assert_eq!(sim.total_damage() - before, 10.0);
    }

    #[test]
    fn damage_boost_scales_damage_not_production() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(10_000.0);
        assert!(sim.upgrade_boost(&bid("fury")));
        assert_eq!(sim.damage_multiplier(), 2.0);
        let gems_before = sim.state().resources[&rid("gems")];
        let damage_before = sim.total_damage();
        sim.advance(1000.0);
        assert_eq!(sim.total_damage() - damage_before, 10.0);
        assert_eq!(sim.state().resources[&rid("gems")] - gems_before, 1.0);
    }

    #[test]
    fn boost_stops_at_max_level() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(60_000.0);
        assert!(sim.upgrade_boost(&bid("haste")));
        assert_eq!(sim.boost_upgrade_cost(&bid("haste")), None);
        assert!(!sim.upgrade_boost(&bid("haste")));
        assert_eq!(sim.state().boosts[&bid("haste")], 1);
    }

    #[test]
    fn dps_reflects_level_and_multipliers() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        assert_eq!(sim.dps(), 5.0); // 5 damage / 1 s
        sim.advance(20_000.0);
        assert!(sim.upgrade_unit(&uid("alpha"))); // level 2: 10 damage
        assert!(sim.upgrade_boost(&bid("fury"))); // x2 damage
        assert_eq!(sim.dps(), 20.0);
    }

    #[test]
    fn fork_isolates_state_and_shares_config() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(10_000.0);
        let mut probe = sim.fork();
        assert!(probe.upgrade_unit(&uid("alpha")));
        probe.advance(5000.0);
        assert_eq!(sim.state().units[&uid("alpha")].level, 1);
        assert_eq!(sim.elapsed_ms(), 10_000.0);
        assert!(std::ptr::eq(sim.config(), probe.config()));
    }

    #[test]
    fn state_serde_roundtrip() {
        let cfg = event();
        let mut sim = EventSim::new(&cfg);
        sim.advance(12_345.0);
        let s = serde_json::to_string(sim.state()).unwrap();
        let back: EconomyState = serde_json::from_str(&s).unwrap();
        assert_eq!(&back, sim.state());
    }

    proptest! {
        /// Arbitrary interleavings of purchases and advances never drive a
        /// balance negative and never push a level past its max.
        #[test]
        fn balances_stay_non_negative(ops in proptest::collection::vec(0u8..6, 1..60)) {
            let cfg = event();
            let mut sim = EventSim::new(&cfg);
            for op in ops {
                match op {
                    0 => sim.advance(1500.0),
                    1 => { sim.upgrade_unit(&uid("alpha")); }
                    2 => { sim.upgrade_unit(&uid("beta")); }
                    3 => { sim.upgrade_boost(&bid("gem-boost")); }
                    4 => { sim.upgrade_boost(&bid("haste")); }
                    _ => { sim.upgrade_boost(&bid("fury")); }
                }
                for (_, balance) in &sim.state().resources {
                    prop_assert!(*balance >= 0.0);
                }
                for (id, us) in &sim.state().units {
                    let max = cfg.unit(id).unwrap().max_level;
                    prop_assert!(us.level <= max);
                    prop_assert!(us.unlocked || us.level == 0);
                }
            }
        }

        /// Damage never decreases as time advances.
        #[test]
        fn damage_is_monotone(deltas in proptest::collection::vec(1.0f64..5000.0, 1..40)) {
            let cfg = event();
            let mut sim = EventSim::new(&cfg);
            let mut last = 0.0;
            for delta in deltas {
                sim.advance(delta);
                prop_assert!(sim.total_damage() >= last);
                last = sim.total_damage();
            }
        }
    }
}
