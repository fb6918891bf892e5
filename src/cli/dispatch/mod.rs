use crate::cli::{actions::Action, commands::ARG_CONFIG};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if the configuration path is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config = matches
        .get_one::<PathBuf>(ARG_CONFIG)
        .cloned()
        .context("missing required argument: --config")?;

    Ok(Action::Server { config })
}
