//! Input files shared by the subcommands

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{NaiveDate, Utc};
use partcast_engine::record::{AcquisitionRow, FailureRow, StatCodeMap};
use tracing::info;

use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct InputArg {
    /// Acquisition rows: JSON array of `{model, component_code, acquisition_date, quantity}`
    pub acquisitions: PathBuf,
    /// Failure rows: JSON array of `{model, component_code, failure_date}`
    pub failures: PathBuf,
    /// Component code to STAT code map: JSON object
    #[arg(long)]
    pub stat_codes: Option<PathBuf>,
    /// Censoring date (YYYY-MM-DD); today when omitted
    #[arg(long)]
    pub cutoff: Option<NaiveDate>,
}

#[derive(Debug)]
pub(crate) struct Inputs {
    pub acquisitions: Vec<AcquisitionRow>,
    pub failures: Vec<FailureRow>,
    pub stat_codes: StatCodeMap,
    pub cutoff: NaiveDate,
}

impl InputArg {
    pub(crate) fn load(&self) -> anyhow::Result<Inputs> {
        let acquisitions: Vec<AcquisitionRow> =
            util::read_json_file("acquisitions", &self.acquisitions)?;
        let failures: Vec<FailureRow> = util::read_json_file("failures", &self.failures)?;
        let stat_codes: StatCodeMap = self
            .stat_codes
            .as_ref()
            .map(|path| util::read_json_file("STAT code", path))
            .transpose()
            .context("Failed to load STAT codes")?
            .unwrap_or_default();
        let cutoff = self.cutoff.unwrap_or_else(|| Utc::now().date_naive());

        info!(
            acquisitions = acquisitions.len(),
            failures = failures.len(),
            stat_codes = stat_codes.len(),
            %cutoff,
            "inputs loaded"
        );
        Ok(Inputs {
            acquisitions,
            failures,
            stat_codes,
            cutoff,
        })
    }
}
