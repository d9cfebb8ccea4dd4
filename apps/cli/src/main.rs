#![deny(warnings)]

//! Headless CLI: loads an event scenario, runs the greedy baseline and the
//! annealing search, and prints the comparison with full purchase logs.

use anyhow::{Context, Result};
use sim_ai::{greedy_run, optimize, CancelToken, Evaluator, RunReport, SearchParams};
use sim_core::{validate_event, EventConfig};
use sim_econ::EconomyState;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Default scenario, compiled in so the binary runs without any files.
const OTHER_TOWER_JSON: &str = include_str!("../data/other_tower.json");

struct Args {
    config: Option<String>,
    params: SearchParams,
    greedy_only: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: None,
        params: SearchParams::default(),
        greedy_only: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next(),
            "--iterations" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.params.iterations = v;
                }
            }
            "--restarts" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.params.restarts = v;
                }
            }
            "--passes" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.params.hill_climb_passes = v;
                }
            }
            "--step-ms" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.params.step_ms = v;
                }
            }
            "--seed" => {
                if let Some(v) = it.next().and_then(|s| s.parse().ok()) {
                    args.params.seed = v;
                }
            }
            "--greedy-only" => args.greedy_only = true,
            _ => {}
        }
    }
    args
}

fn fmt_damage(n: f64) -> String {
    if n >= 1e12 {
        format!("{:.2}T", n / 1e12)
    } else if n >= 1e9 {
        format!("{:.2}B", n / 1e9)
    } else if n >= 1e6 {
        format!("{:.2}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.2}K", n / 1e3)
    } else {
        format!("{:.0}", n)
    }
}

fn print_section(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("  {title}");
    println!("{}", "=".repeat(60));
}

fn print_state(state: &EconomyState, cfg: &EventConfig) {
    println!("  Units:");
    for unit in &cfg.units {
        if let Some(us) = state.units.get(&unit.id) {
            let status = if us.unlocked { "unlocked" } else { "locked" };
            println!("    {:15} Lv{:2}  ({status})", unit.name, us.level);
        }
    }
    println!("  Boosts:");
    for boost in &cfg.boosts {
        let level = state.boosts.get(&boost.id).copied().unwrap_or(0);
        println!("    {:20} Lv{}/{}", boost.name, level, boost.max_level);
    }
}

fn print_report(report: &RunReport, cfg: &EventConfig) {
    println!("  Final damage : {}", fmt_damage(report.damage));
    println!("\n  Purchase log:");
    if report.log.is_empty() {
        println!("    (no purchases)");
    }
    for entry in &report.log {
        println!("    {:5.2}h  {}", entry.elapsed_hours, entry.description);
    }
    println!("\n  Final state:");
    print_state(&report.final_state, cfg);
}

fn load_scenario(path: Option<&str>) -> Result<EventConfig> {
    let cfg: EventConfig = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading scenario {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing scenario {path}"))?
        }
        None => serde_json::from_str(OTHER_TOWER_JSON).context("parsing built-in scenario")?,
    };
    validate_event(&cfg)?;
    Ok(cfg)
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args();
    let cfg = load_scenario(args.config.as_deref())?;
    info!(
        event = %cfg.name,
        units = cfg.units.len(),
        boosts = cfg.boosts.len(),
        duration_h = cfg.duration_ms / 3_600_000.0,
        "scenario loaded"
    );

    let greedy = greedy_run(&cfg, args.params.step_ms)?;
    print_section("GREEDY BASELINE");
    print_report(&greedy, &cfg);

    if args.greedy_only {
        return Ok(());
    }

    let cancel = CancelToken::new();
    let outcome = optimize(&cfg, &args.params, &cancel)?;
    let evaluator = Evaluator::new(&cfg, args.params.step_ms);
    let annealed = evaluator.replay_with_log(&outcome.ordering)?;
    print_section("SIMULATED ANNEALING");
    print_report(&annealed, &cfg);

    print_section("SUMMARY");
    let pct = if greedy.damage > 0.0 {
        (annealed.damage / greedy.damage - 1.0) * 100.0
    } else {
        0.0
    };
    println!("  {:<24} {:>12}  {:>10}", "Strategy", "Damage", "vs Greedy");
    println!("  {}", "-".repeat(48));
    println!(
        "  {:<24} {:>12}  {:>10}",
        "Greedy",
        fmt_damage(greedy.damage),
        "(baseline)"
    );
    println!(
        "  {:<24} {:>12}  {:>+9.1}%",
        "Simulated Annealing",
        fmt_damage(annealed.damage),
        pct
    );

    Ok(())
}
