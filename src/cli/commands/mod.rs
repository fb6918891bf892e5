use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};
use std::path::PathBuf;

pub const ARG_CONFIG: &str = "config";
pub const ENV_CONFIG: &str = "MFASERVER_CONFIG";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    Command::new("mfaserver")
        .about("TOTP multi-factor enrolment and validation")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_CONFIG)
                .short('c')
                .long("config")
                .help("Path to the JSON configuration file")
                .env(ENV_CONFIG)
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "mfaserver");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "TOTP multi-factor enrolment and validation"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_config() {
        temp_env::with_vars([(ENV_CONFIG, None::<String>)], || {
            for args in [
                vec!["mfaserver", "--config", "/etc/mfaserver.json"],
                vec!["mfaserver", "-c", "/etc/mfaserver.json"],
                vec!["mfaserver", "--config=/etc/mfaserver.json"],
            ] {
                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<PathBuf>(ARG_CONFIG),
                    Some(&PathBuf::from("/etc/mfaserver.json"))
                );
            }
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars([(ENV_CONFIG, Some("/srv/mfa/config.json"))], || {
            let matches = new().get_matches_from(vec!["mfaserver"]);
            assert_eq!(
                matches.get_one::<PathBuf>(ARG_CONFIG),
                Some(&PathBuf::from("/srv/mfa/config.json"))
            );
        });
    }

    #[test]
    fn test_config_required() {
        temp_env::with_vars([(ENV_CONFIG, None::<String>)], || {
            let result = new().try_get_matches_from(vec!["mfaserver"]);
            assert_eq!(
                result.unwrap_err().kind(),
                clap::error::ErrorKind::MissingRequiredArgument
            );
        });
    }
}
