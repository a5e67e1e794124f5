//! `rung inspect`: print every extension's exported config.

use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};

use super::Project;

pub fn run_inspect(root: &Path) -> Result<()> {
    let project = Project::load(root)?;
    let runner = project.runner()?;

    let configs: Map<String, Value> = runner.inspect()?.into_iter().collect();
    println!("{}", serde_json::to_string_pretty(&configs)?);
    Ok(())
}
