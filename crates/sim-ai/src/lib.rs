#![deny(warnings)]

//! Purchase-ordering strategies for the event simulation.
//!
//! Three layers: [`priority`] expands a configuration into the template of
//! purchasable steps and replays candidate orderings deterministically;
//! [`search`] runs multi-restart simulated annealing plus exhaustive
//! single-swap refinement over those orderings, using the replay as its
//! fitness function; [`greedy`] is the marginal-value baseline the search
//! is measured against.

pub mod greedy;
pub mod priority;
pub mod search;

pub use greedy::greedy_run;
pub use priority::{build_template, EvalError, Evaluator, PriorityStep, PurchaseRecord, RunReport};
pub use search::{
    hill_climb, optimize, perturb, CancelToken, SearchError, SearchOutcome, SearchParams,
};
