//! Forecast command
//!
//! Runs the full pipeline, writes the report as JSON and prints a summary
//! table to stderr.

use std::{num::NonZeroUsize, path::PathBuf};

use anyhow::Context as _;
use partcast_engine::{
    config::EngineConfig,
    forecast::{ForecastReport, ForecastRequest, Forecaster, GroupBy, GroupOutcome},
    projection::{HorizonProjection, RELIABLE_LABEL},
};

use crate::{
    command::input::InputArg,
    util::{self, Output},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ForecastArg {
    #[clap(flatten)]
    input: InputArg,
    /// Group observations by `component` or `stat`
    #[arg(long, default_value = "component")]
    group_by: GroupBy,
    /// Models to forecast (comma-separated); every model present in both inputs when omitted
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,
    /// Directory receiving one chart per group
    #[arg(long, default_value = "./charts")]
    charts_dir: PathBuf,
    /// Report output path; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
    /// Engine configuration JSON; every field is optional
    #[arg(long)]
    config: Option<PathBuf>,
    /// Minimum risk-set size for the reliable horizon
    #[arg(long)]
    threshold: Option<usize>,
    /// Bootstrap seed for reproducible bands
    #[arg(long)]
    seed: Option<u64>,
    /// Worker threads
    #[arg(long)]
    workers: Option<NonZeroUsize>,
}

impl ForecastArg {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => util::read_json_file::<EngineConfig, _>("engine config", path)?,
            None => EngineConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config.risk_set_threshold = threshold;
        }
        if let Some(seed) = self.seed {
            config.bootstrap.seed = Some(seed);
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        Ok(config)
    }
}

pub(crate) fn run(arg: &ForecastArg) -> anyhow::Result<()> {
    let forecaster =
        Forecaster::new(arg.engine_config()?).context("Invalid engine configuration")?;
    let inputs = arg.input.load()?;

    let report = forecaster.run(&ForecastRequest {
        acquisitions: &inputs.acquisitions,
        failures: &inputs.failures,
        stat_codes: &inputs.stat_codes,
        cutoff: inputs.cutoff,
        models: (!arg.models.is_empty()).then_some(arg.models.as_slice()),
        group_by: arg.group_by,
        chart_dir: &arg.charts_dir,
    });

    print_summary(&report, forecaster.config());
    Output::save_json(&report, arg.output.as_deref())?;
    if let Some(path) = &arg.output {
        eprintln!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn print_summary(report: &ForecastReport, config: &EngineConfig) {
    let labels = config
        .horizons_months
        .iter()
        .map(ToString::to_string)
        .chain([RELIABLE_LABEL.to_owned()])
        .collect::<Vec<_>>();

    eprintln!(
        "Forecast Summary (group by {}, seed {})",
        report.group_by, report.seed
    );
    eprintln!("Failure probability per horizon: Kaplan-Meier / Weibull\n");

    let mut header = format!(
        "  {:<12} {:<16} {:<10} {:>7} {:>8} {:>8}",
        "Model", "Key", "Status", "Units", "Failures", "Reliable"
    );
    for label in &labels {
        header.push_str(&format!(" {:>15}", format!("P({label})")));
    }
    eprintln!("{header}");
    eprintln!("  {}", "-".repeat(header.len() - 2));

    for (model, groups) in &report.groups {
        for (key, outcome) in groups {
            let line = match outcome {
                GroupOutcome::Projected(record) => {
                    let mut line = format!(
                        "  {:<12} {:<16} {:<10} {:>7} {:>8} {:>8}",
                        model,
                        key,
                        "projected",
                        record.units,
                        record.failures,
                        record.reliable_horizon_month
                    );
                    for label in &labels {
                        line.push_str(&format!(" {:>15}", horizon_cell(record.horizon(label))));
                    }
                    line
                }
                GroupOutcome::Skipped { reason } => {
                    format!("  {model:<12} {key:<16} {:<10} {reason}", "skipped")
                }
                GroupOutcome::Failed { error } => {
                    format!("  {model:<12} {key:<16} {:<10} {error}", "failed")
                }
            };
            eprintln!("{line}");
        }
    }

    if report.unmapped_units > 0 {
        eprintln!("\n{} units had no STAT code", report.unmapped_units);
    }
    eprintln!();
}

fn horizon_cell(horizon: Option<&HorizonProjection>) -> String {
    let Some(h) = horizon else {
        return "-".to_owned();
    };
    format!(
        "{} / {}",
        util::percent(h.km.map(|e| e.value)),
        util::percent(h.weibull.map(|e| e.value))
    )
}
