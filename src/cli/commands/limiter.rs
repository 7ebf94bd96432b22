use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, builder::ValueParser};

pub const ARG_LIMITER_RPS: &str = "limiter-rps";
pub const ARG_LIMITER_BURST: &str = "limiter-burst";
pub const ARG_LIMITER_ENABLED: &str = "limiter-enabled";
pub const ARG_LIMITER_JANITOR_INTERVAL_SECONDS: &str = "limiter-janitor-interval-seconds";
pub const ARG_LIMITER_IDLE_TIMEOUT_SECONDS: &str = "limiter-idle-timeout-seconds";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub requests_per_second: f64,
    pub burst: u32,
    pub enabled: bool,
    pub janitor_interval_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub trust_proxy_headers: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing from the matches.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            requests_per_second: matches
                .get_one::<f64>(ARG_LIMITER_RPS)
                .copied()
                .context("missing required argument: --limiter-rps")?,
            burst: matches
                .get_one::<u32>(ARG_LIMITER_BURST)
                .copied()
                .context("missing required argument: --limiter-burst")?,
            enabled: matches
                .get_one::<bool>(ARG_LIMITER_ENABLED)
                .copied()
                .unwrap_or(true),
            janitor_interval_seconds: matches
                .get_one::<u64>(ARG_LIMITER_JANITOR_INTERVAL_SECONDS)
                .copied()
                .context("missing required argument: --limiter-janitor-interval-seconds")?,
            idle_timeout_seconds: matches
                .get_one::<u64>(ARG_LIMITER_IDLE_TIMEOUT_SECONDS)
                .copied()
                .context("missing required argument: --limiter-idle-timeout-seconds")?,
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        })
    }
}

#[must_use]
pub fn validator_requests_per_second() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<f64, String> {
        match value.parse::<f64>() {
            Ok(rps) if rps.is_finite() && rps > 0.0 => Ok(rps),
            Ok(_) => Err("requests per second must be greater than zero".to_string()),
            Err(_) => Err("requests per second must be a number".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LIMITER_RPS)
                .long(ARG_LIMITER_RPS)
                .help("Requests per second refilled into each client's bucket")
                .env("TURNSTILE_LIMITER_RPS")
                .default_value("2")
                .value_parser(validator_requests_per_second()),
        )
        .arg(
            Arg::new(ARG_LIMITER_BURST)
                .long(ARG_LIMITER_BURST)
                .help("Maximum requests a client may make in a burst")
                .env("TURNSTILE_LIMITER_BURST")
                .default_value("4")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LIMITER_ENABLED)
                .long(ARG_LIMITER_ENABLED)
                .help("Enable per-client rate limiting")
                .env("TURNSTILE_LIMITER_ENABLED")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_LIMITER_JANITOR_INTERVAL_SECONDS)
                .long(ARG_LIMITER_JANITOR_INTERVAL_SECONDS)
                .help("How often idle clients are evicted, in seconds")
                .env("TURNSTILE_LIMITER_JANITOR_INTERVAL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_LIMITER_IDLE_TIMEOUT_SECONDS)
                .long(ARG_LIMITER_IDLE_TIMEOUT_SECONDS)
                .help("Idle time after which a client's bucket is evicted, in seconds")
                .env("TURNSTILE_LIMITER_IDLE_TIMEOUT_SECONDS")
                .default_value("180")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Key clients by X-Forwarded-For / X-Real-IP instead of the peer address")
                .env("TURNSTILE_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}
