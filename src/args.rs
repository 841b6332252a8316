//! Command-line argument parsing.
//!
//! Two commands: `run` (the default) drives the service off the real clock,
//! `simulate` replays a time span against a simulated clock. Global flags may
//! appear anywhere on the line.

/// What the binary should do.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the service on the real clock
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
    },
    /// Replay `[from, to]` against a simulated clock
    Simulate {
        debug_enabled: bool,
        config_dir: Option<String>,
        from: String,
        to: String,
        timezone: Option<String>,
    },
    ShowHelp,
    ShowVersion,
    /// Show help because the arguments could not be understood
    ShowHelpDueToError,
}

/// Result of parsing the command line.
#[derive(Debug, PartialEq)]
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse arguments, including the program name in first position.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut config_dir: Option<String> = None;
        let mut from: Option<String> = None;
        let mut to: Option<String> = None;
        let mut timezone: Option<String> = None;
        let mut command: Option<String> = None;
        let mut error = false;

        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();
        let mut iter = args_vec.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => display_help = true,
                "--version" | "-V" | "-v" => display_version = true,
                "--debug" | "-d" => debug_enabled = true,
                "--config" | "-c" | "--from" | "--to" | "--tz" => {
                    let Some(value) = iter.next() else {
                        log_warning!("Missing value for {arg}");
                        error = true;
                        continue;
                    };
                    let slot = match arg.as_str() {
                        "--config" | "-c" => &mut config_dir,
                        "--from" => &mut from,
                        "--to" => &mut to,
                        _ => &mut timezone,
                    };
                    *slot = Some(value);
                }
                "run" | "simulate" | "sim" if command.is_none() => {
                    command = Some(arg.clone());
                }
                _ => {
                    log_warning!("Unknown argument: {arg}");
                    error = true;
                }
            }
        }

        let action = if display_version {
            CliAction::ShowVersion
        } else if display_help {
            CliAction::ShowHelp
        } else if error {
            CliAction::ShowHelpDueToError
        } else {
            match command.as_deref() {
                Some("simulate" | "sim") => match (from, to) {
                    (Some(from), Some(to)) => CliAction::Simulate {
                        debug_enabled,
                        config_dir,
                        from,
                        to,
                        timezone,
                    },
                    _ => {
                        log_warning!("simulate needs both --from and --to");
                        CliAction::ShowHelpDueToError
                    }
                },
                _ if from.is_some() || to.is_some() || timezone.is_some() => {
                    log_warning!("--from, --to and --tz only apply to simulate");
                    CliAction::ShowHelpDueToError
                }
                _ => CliAction::Run {
                    debug_enabled,
                    config_dir,
                },
            }
        };

        ParsedArgs { action }
    }

    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    crate::logger::write_output(&format!("┗ {}\n", env!("CARGO_PKG_DESCRIPTION")));
}

/// Displays the help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("night-display [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <dir>     Use custom configuration directory");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("run                    Run on the real clock (default)");
    log_indented!("simulate, sim          Replay a time span on a simulated clock");
    log_indented!("    --from <time>      Start, \"YYYY-MM-DD HH:MM:SS\"");
    log_indented!("    --to <time>        End, \"YYYY-MM-DD HH:MM:SS\"");
    log_indented!("    --tz <zone>        IANA timezone (defaults to the configured one)");
    log_end!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliAction {
        let mut full = vec!["night-display"];
        full.extend_from_slice(args);
        ParsedArgs::parse(full).action
    }

    #[test]
    fn test_parse_no_args() {
        assert_eq!(
            parse(&[]),
            CliAction::Run {
                debug_enabled: false,
                config_dir: None,
            }
        );
    }

    #[test]
    fn test_parse_run_with_flags() {
        assert_eq!(
            parse(&["-d", "run", "--config", "/tmp/nd"]),
            CliAction::Run {
                debug_enabled: true,
                config_dir: Some("/tmp/nd".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_simulate() {
        assert_eq!(
            parse(&[
                "simulate",
                "--from",
                "2026-10-15 12:00:00",
                "--to",
                "2026-10-17 12:00:00",
                "--tz",
                "Asia/Tokyo",
            ]),
            CliAction::Simulate {
                debug_enabled: false,
                config_dir: None,
                from: "2026-10-15 12:00:00".to_string(),
                to: "2026-10-17 12:00:00".to_string(),
                timezone: Some("Asia/Tokyo".to_string()),
            }
        );
    }

    #[test]
    fn test_simulate_requires_both_ends() {
        assert_eq!(
            parse(&["sim", "--from", "2026-10-15 12:00:00"]),
            CliAction::ShowHelpDueToError
        );
    }

    #[test]
    fn test_simulation_flags_without_simulate() {
        assert_eq!(parse(&["--tz", "UTC"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_missing_flag_value() {
        assert_eq!(parse(&["--config"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_unknown_argument() {
        assert_eq!(parse(&["--geo"]), CliAction::ShowHelpDueToError);
        assert_eq!(parse(&["run", "run"]), CliAction::ShowHelpDueToError);
    }

    #[test]
    fn test_version_takes_precedence() {
        assert_eq!(parse(&["--version", "--help", "--bogus"]), CliAction::ShowVersion);
        assert_eq!(parse(&["-d", "-h"]), CliAction::ShowHelp);
    }
}
