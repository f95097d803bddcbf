//! Reconciliation report
//!
//! Runs lot-failure reconciliation only and prints what happened to every
//! (model, component) pair.

use std::{collections::BTreeMap, path::PathBuf};

use partcast_engine::{
    config::EngineConfig,
    reconcile::{PairDiagnostics, Reconciler},
    record::UnitObservation,
};
use partcast_stats::descriptive::DescriptiveStats;

use crate::{command::input::InputArg, util::Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ReconcileArg {
    #[clap(flatten)]
    input: InputArg,
    /// Lifetime cap in days [default: 1095]
    #[arg(long)]
    lifetime_cap: Option<u32>,
    /// Write the unit observations as JSON to this path
    #[arg(long)]
    observations: Option<PathBuf>,
}

pub(crate) fn run(arg: &ReconcileArg) -> anyhow::Result<()> {
    let inputs = arg.input.load()?;
    let reconciliation = Reconciler {
        stat_codes: &inputs.stat_codes,
        cutoff: inputs.cutoff,
        lifetime_cap_days: arg
            .lifetime_cap
            .unwrap_or(EngineConfig::default().lifetime_cap_days),
    }
    .reconcile(&inputs.acquisitions, &inputs.failures);

    println!("Reconciliation Report (cutoff {})", inputs.cutoff);
    println!("==========================================\n");

    let mut lifetimes = BTreeMap::<(&str, &str), Vec<f64>>::new();
    for obs in &reconciliation.observations {
        lifetimes
            .entry((obs.model.as_str(), obs.component_code.as_str()))
            .or_default()
            .push(f64::from(obs.lifetime_days));
    }

    print_header();
    for (model, pairs) in &reconciliation.diagnostics {
        for (component, diag) in pairs {
            let stats = lifetimes
                .get(&(model.as_str(), component.as_str()))
                .and_then(|values| DescriptiveStats::new(values.iter().copied()));
            let excluded = reconciliation
                .errors
                .get(model)
                .is_some_and(|errors| errors.contains_key(component));
            print_row(model, component, diag, stats.as_ref(), excluded);
        }
    }

    let errors = reconciliation
        .errors
        .values()
        .flat_map(BTreeMap::values)
        .collect::<Vec<_>>();
    if !errors.is_empty() {
        println!("\nExcluded pairs (marked * above):");
        for error in errors {
            println!("  {error}");
        }
    }

    let total = reconciliation.observations.len();
    let failed = reconciliation
        .observations
        .iter()
        .filter(|o| o.status.is_event())
        .count();
    println!("\n{total} unit observations ({failed} failed, {} censored)", total - failed);

    if let Some(path) = &arg.observations {
        Output::save_json::<Vec<UnitObservation>>(
            &reconciliation.observations,
            Some(path.as_path()),
        )?;
        println!("Observations saved to: {}", path.display());
    }
    Ok(())
}

fn print_header() {
    println!(
        "  {:<12} {:<16} {:>9} {:>7} {:>9} {:>10} {:>6} {:>8} {:>7} {:>7} {:>9} {:>9} {:>9}",
        "Model",
        "Component",
        "Acquired",
        "Failed",
        "Censored",
        "Unmatched",
        "Late",
        "Undated",
        "Future",
        "Capped",
        "Mean(d)",
        "Median(d)",
        "Max(d)",
    );
    println!("  {}", "-".repeat(134));
}

fn print_row(
    model: &str,
    component: &str,
    diag: &PairDiagnostics,
    stats: Option<&DescriptiveStats>,
    excluded: bool,
) {
    let fmt = |value: Option<f64>| value.map_or_else(|| "N/A".to_owned(), |v| format!("{v:.1}"));
    println!(
        "{} {:<12} {:<16} {:>9} {:>7} {:>9} {:>10} {:>6} {:>8} {:>7} {:>7} {:>9} {:>9} {:>9}",
        if excluded { '*' } else { ' ' },
        model,
        component,
        diag.acquired,
        diag.failed,
        diag.censored,
        diag.unmatched_failures,
        diag.late_failures,
        diag.undated_lots,
        diag.future_units,
        diag.capped,
        fmt(stats.map(|s| s.mean)),
        fmt(stats.map(|s| s.median)),
        fmt(stats.map(|s| s.max)),
    );
}
