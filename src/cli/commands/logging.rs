//! `-v` / `TURNSTILE_LOG_LEVEL`: repeat the flag, or name a level.

use clap::{Arg, ArgAction, Command, builder::ValueParser};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<u8, String> {
        let value = value.trim();
        if let Ok(count) = value.parse::<u8>()
            && count <= 5
        {
            return Ok(count);
        }

        LEVEL_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(value))
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| {
                format!(
                    "invalid log level '{value}', expected 0-5 or one of: {}",
                    LEVEL_NAMES.join(", ")
                )
            })
    })
}

/// Level for a verbosity count. `None` leaves the subscriber at its ERROR default.
#[must_use]
pub const fn level_for(verbosity: u8) -> Option<Level> {
    match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("TURNSTILE_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
