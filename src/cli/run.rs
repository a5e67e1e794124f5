//! Single cycle for `rung run`.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::live::CycleOutcome;

use super::{report_outcome, Project};

pub fn run_once(root: &Path) -> Result<()> {
    let project = Project::load(root)?;
    let mut runner = project.runner()?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let started = Instant::now();
    let alerts = match rt.block_on(runner.run_cycle()) {
        Ok(alerts) => alerts,
        Err(e) => {
            report_outcome(&CycleOutcome::Failed(e));
            anyhow::bail!("Run failed");
        }
    };

    report_outcome(&CycleOutcome::Updated {
        alerts: alerts.len(),
        elapsed: started.elapsed(),
    });
    println!("{}", serde_json::to_string_pretty(&alerts)?);
    Ok(())
}
