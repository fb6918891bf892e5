use crate::cli::{actions::Action, commands, dispatch};
use anyhow::Result;
use std::ffi::OsString;

/// Main entry point for the CLI - builds and returns the Action
///
/// Telemetry is set up by the action once the configuration (and its log
/// level and log file) has been loaded.
///
/// # Errors
///
/// Returns an error if argument parsing or action dispatch fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches_from(normalize_args(std::env::args_os()));

    dispatch::handler(&matches)
}

/// Accept the single-dash long form (`-config=<path>`, `-config <path>`).
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-config") => OsString::from("--config"),
            Some(value) if value.starts_with("-config=") => OsString::from(format!("-{value}")),
            _ => arg,
        })
        .collect()
}
