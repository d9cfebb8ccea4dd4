#![deny(warnings)]

//! Core domain models and invariants for the idle-event optimizer.
//!
//! This crate defines the serializable configuration of one event (the
//! resources, producing units and global boosts) together with validation
//! helpers that reject malformed configurations before any simulation runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Unique identifier for a resource, e.g. "sapphires".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

/// Unique identifier for a producing unit, e.g. "fiona".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

/// Unique identifier for a global boost, e.g. "champion-speed".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoostId(pub String);

/// A purchase price: resource id to required amount.
///
/// An empty map is a valid *free* cost; "not purchasable" is expressed as
/// the absence of a cost (`Option::None`) at the query layer, never as a
/// sentinel value inside the map.
pub type Cost = BTreeMap<ResourceId, f64>;

/// A resource that units produce and purchases consume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Resource identifier.
    pub id: ResourceId,
}

/// A producing, upgradable unit with discrete levels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitDef {
    /// Unit identifier.
    pub id: UnitId,
    /// Human-readable display name.
    pub name: String,
    /// Whether the unit starts the event unlocked at level 1.
    pub unlocked_by_default: bool,
    /// Resource credited on every spawn.
    pub produces: ResourceId,
    /// Base spawn interval in milliseconds, before speed boosts.
    pub spawn_time_ms: f64,
    /// Highest reachable level.
    pub max_level: u32,
    /// Resource amount produced per spawn, indexed by `level - 1`.
    pub production_by_level: Vec<f64>,
    /// Damage dealt per spawn, indexed by `level - 1`.
    pub damage_by_level: Vec<f64>,
    /// Price of the unlock purchase; present iff not unlocked by default.
    pub unlock_cost: Option<Cost>,
    /// Price of the level-up from level `i + 1`; length `max_level - 1`.
    pub upgrade_costs: Vec<Cost>,
}

/// What a boost modifies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoostKind {
    /// Flat bonus added to every spawn's production of one resource.
    ProductionBonus,
    /// Fractional reduction of every unit's spawn interval.
    Speed,
    /// Fractional increase of every unit's damage.
    Damage,
}

/// A global modifier purchasable to fixed levels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoostDef {
    /// Boost identifier.
    pub id: BoostId,
    /// Human-readable display name.
    pub name: String,
    /// What this boost modifies.
    pub kind: BoostKind,
    /// Target resource; required iff `kind` is `ProductionBonus`.
    pub resource: Option<ResourceId>,
    /// Highest reachable level.
    pub max_level: u32,
    /// Bonus granted at each level, indexed by `level - 1`.
    pub bonus_by_level: Vec<f64>,
    /// Price of the purchase from each level, indexed by current level.
    pub costs: Vec<Cost>,
}

/// One fixed-duration event: resources, units, boosts and the clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventConfig {
    /// Event identifier.
    pub id: String,
    /// Human-readable event name.
    pub name: String,
    /// Event duration in milliseconds.
    pub duration_ms: f64,
    /// Resources in play.
    pub resources: Vec<ResourceDef>,
    /// Units in configuration order; order is the template tie-break.
    pub units: Vec<UnitDef>,
    /// Boosts in configuration order.
    pub boosts: Vec<BoostDef>,
}

impl EventConfig {
    /// Look up a unit definition by id.
    pub fn unit(&self, id: &UnitId) -> Option<&UnitDef> {
        self.units.iter().find(|u| &u.id == id)
    }

    /// Look up a boost definition by id.
    pub fn boost(&self, id: &BoostId) -> Option<&BoostDef> {
        self.boosts.iter().find(|b| &b.id == id)
    }
}

/// Validation errors for event configurations.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The same id is defined twice.
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    /// A cost or production target references an undefined resource.
    #[error("{owner}: unknown resource \"{resource}\" in {field}")]
    UnknownResource {
        owner: String,
        resource: String,
        field: &'static str,
    },
    /// A per-level array does not match the declared max level.
    #[error("{owner}: {field} has length {actual}, expected {expected}")]
    BadArrayLength {
        owner: String,
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A numeric value is negative, NaN or infinite.
    #[error("{owner}: {field} must be finite and non-negative")]
    BadAmount { owner: String, field: &'static str },
    /// A value that must be strictly positive is not.
    #[error("{owner}: {field} must be > 0")]
    NonPositive { owner: String, field: &'static str },
    /// A locked unit has no unlock price.
    #[error("unit {0}: unlock_cost is required unless unlocked_by_default")]
    MissingUnlockCost(String),
    /// A default-unlocked unit carries an unlock price.
    #[error("unit {0}: unlock_cost must be absent when unlocked_by_default")]
    UnexpectedUnlockCost(String),
    /// A production-bonus boost does not name its target resource.
    #[error("boost {0}: production-bonus requires a target resource")]
    MissingBoostResource(String),
    /// A speed or damage boost names a resource.
    #[error("boost {0}: only production-bonus boosts may name a resource")]
    UnexpectedBoostResource(String),
    /// A speed bonus of 1.0 or more would zero out the spawn interval.
    #[error("boost {boost}: speed bonus {bonus} at level {level} leaves no positive spawn interval")]
    SpeedBonusOutOfRange {
        boost: String,
        level: usize,
        bonus: f64,
    },
}

fn check_amounts(
    owner: &str,
    field: &'static str,
    values: &[f64],
) -> Result<(), ValidationError> {
    for v in values {
        if !v.is_finite() || *v < 0.0 {
            return Err(ValidationError::BadAmount {
                owner: owner.to_string(),
                field,
            });
        }
    }
    Ok(())
}

fn check_cost(
    owner: &str,
    field: &'static str,
    cost: &Cost,
    resources: &BTreeSet<&ResourceId>,
) -> Result<(), ValidationError> {
    for (resource, amount) in cost {
        if !resources.contains(resource) {
            return Err(ValidationError::UnknownResource {
                owner: owner.to_string(),
                resource: resource.0.clone(),
                field,
            });
        }
        if !amount.is_finite() || *amount < 0.0 {
            return Err(ValidationError::BadAmount {
                owner: owner.to_string(),
                field,
            });
        }
    }
    Ok(())
}

/// Validate a unit definition against the known resource set.
pub fn validate_unit(
    unit: &UnitDef,
    resources: &BTreeSet<&ResourceId>,
) -> Result<(), ValidationError> {
    let owner = format!("unit {}", unit.id.0);
    if !unit.spawn_time_ms.is_finite() || unit.spawn_time_ms <= 0.0 {
        return Err(ValidationError::NonPositive {
            owner,
            field: "spawn_time_ms",
        });
    }
    if unit.max_level == 0 {
        return Err(ValidationError::NonPositive {
            owner,
            field: "max_level",
        });
    }
    let levels = unit.max_level as usize;
    if unit.production_by_level.len() != levels {
        return Err(ValidationError::BadArrayLength {
            owner,
            field: "production_by_level",
            expected: levels,
            actual: unit.production_by_level.len(),
        });
    }
    if unit.damage_by_level.len() != levels {
        return Err(ValidationError::BadArrayLength {
            owner,
            field: "damage_by_level",
            expected: levels,
            actual: unit.damage_by_level.len(),
        });
    }
    if unit.upgrade_costs.len() != levels - 1 {
        return Err(ValidationError::BadArrayLength {
            owner,
            field: "upgrade_costs",
            expected: levels - 1,
            actual: unit.upgrade_costs.len(),
        });
    }
    if !resources.contains(&unit.produces) {
        return Err(ValidationError::UnknownResource {
            owner,
            resource: unit.produces.0.clone(),
            field: "produces",
        });
    }
    check_amounts(&owner, "production_by_level", &unit.production_by_level)?;
    check_amounts(&owner, "damage_by_level", &unit.damage_by_level)?;
    match (&unit.unlock_cost, unit.unlocked_by_default) {
        (Some(_), true) => return Err(ValidationError::UnexpectedUnlockCost(unit.id.0.clone())),
        (None, false) => return Err(ValidationError::MissingUnlockCost(unit.id.0.clone())),
        (Some(cost), false) => check_cost(&owner, "unlock_cost", cost, resources)?,
        (None, true) => {}
    }
    for cost in &unit.upgrade_costs {
        check_cost(&owner, "upgrade_costs", cost, resources)?;
    }
    Ok(())
}

/// Validate a boost definition against the known resource set.
pub fn validate_boost(
    boost: &BoostDef,
    resources: &BTreeSet<&ResourceId>,
) -> Result<(), ValidationError> {
    let owner = format!("boost {}", boost.id.0);
    if boost.max_level == 0 {
        return Err(ValidationError::NonPositive {
            owner,
            field: "max_level",
        });
    }
    let levels = boost.max_level as usize;
    if boost.bonus_by_level.len() != levels {
        return Err(ValidationError::BadArrayLength {
            owner,
            field: "bonus_by_level",
            expected: levels,
            actual: boost.bonus_by_level.len(),
        });
    }
    if boost.costs.len() != levels {
        return Err(ValidationError::BadArrayLength {
            owner,
            field: "costs",
            expected: levels,
            actual: boost.costs.len(),
        });
    }
    match (&boost.kind, &boost.resource) {
        (BoostKind::ProductionBonus, None) => {
            return Err(ValidationError::MissingBoostResource(boost.id.0.clone()))
        }
        (BoostKind::ProductionBonus, Some(resource)) => {
            if !resources.contains(resource) {
                return Err(ValidationError::UnknownResource {
                    owner,
                    resource: resource.0.clone(),
                    field: "resource",
                });
            }
        }
        (_, Some(_)) => return Err(ValidationError::UnexpectedBoostResource(boost.id.0.clone())),
        (_, None) => {}
    }
    check_amounts(&owner, "bonus_by_level", &boost.bonus_by_level)?;
    if boost.kind == BoostKind::Speed {
        // A bonus of 1.0 would make every spawn instantaneous: infinite ticks.
        for (i, bonus) in boost.bonus_by_level.iter().enumerate() {
            if *bonus >= 1.0 {
                return Err(ValidationError::SpeedBonusOutOfRange {
                    boost: boost.id.0.clone(),
                    level: i + 1,
                    bonus: *bonus,
                });
            }
        }
    }
    for cost in &boost.costs {
        check_cost(&owner, "costs", cost, resources)?;
    }
    Ok(())
}

/// Validate a whole event, including cross-references into the resource list.
pub fn validate_event(cfg: &EventConfig) -> Result<(), ValidationError> {
    if !cfg.duration_ms.is_finite() || cfg.duration_ms <= 0.0 {
        return Err(ValidationError::NonPositive {
            owner: format!("event {}", cfg.id),
            field: "duration_ms",
        });
    }
    let mut resources: BTreeSet<&ResourceId> = BTreeSet::new();
    for r in &cfg.resources {
        if !resources.insert(&r.id) {
            return Err(ValidationError::DuplicateId(r.id.0.clone()));
        }
    }
    let mut unit_ids: BTreeSet<&UnitId> = BTreeSet::new();
    for unit in &cfg.units {
        if !unit_ids.insert(&unit.id) {
            return Err(ValidationError::DuplicateId(unit.id.0.clone()));
        }
        validate_unit(unit, &resources)?;
    }
    let mut boost_ids: BTreeSet<&BoostId> = BTreeSet::new();
    for boost in &cfg.boosts {
        if !boost_ids.insert(&boost.id) {
            return Err(ValidationError::DuplicateId(boost.id.0.clone()));
        }
        validate_boost(boost, &resources)?;
    }
    Ok(())
}
