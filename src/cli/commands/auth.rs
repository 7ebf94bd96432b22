use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_AUTHENTICATION_TOKEN_TTL_SECONDS: &str = "authentication-token-ttl-seconds";
pub const ARG_ACTIVATION_TOKEN_TTL_SECONDS: &str = "activation-token-ttl-seconds";
pub const ARG_TOKEN_ENTROPY_BYTES: &str = "token-entropy-bytes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub authentication_token_ttl_seconds: u64,
    pub activation_token_ttl_seconds: u64,
    pub token_entropy_bytes: usize,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing from the matches.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let entropy = matches
            .get_one::<u64>(ARG_TOKEN_ENTROPY_BYTES)
            .copied()
            .context("missing required argument: --token-entropy-bytes")?;

        Ok(Self {
            authentication_token_ttl_seconds: matches
                .get_one::<u64>(ARG_AUTHENTICATION_TOKEN_TTL_SECONDS)
                .copied()
                .context("missing required argument: --authentication-token-ttl-seconds")?,
            activation_token_ttl_seconds: matches
                .get_one::<u64>(ARG_ACTIVATION_TOKEN_TTL_SECONDS)
                .copied()
                .context("missing required argument: --activation-token-ttl-seconds")?,
            token_entropy_bytes: usize::try_from(entropy)
                .context("token entropy does not fit in memory")?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTHENTICATION_TOKEN_TTL_SECONDS)
                .long(ARG_AUTHENTICATION_TOKEN_TTL_SECONDS)
                .help("Lifetime of authentication tokens in seconds")
                .env("TURNSTILE_AUTHENTICATION_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_ACTIVATION_TOKEN_TTL_SECONDS)
                .long(ARG_ACTIVATION_TOKEN_TTL_SECONDS)
                .help("Lifetime of activation tokens in seconds")
                .env("TURNSTILE_ACTIVATION_TOKEN_TTL_SECONDS")
                .default_value("259200")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_TOKEN_ENTROPY_BYTES)
                .long(ARG_TOKEN_ENTROPY_BYTES)
                .help("Random bytes per issued token (minimum 16)")
                .env("TURNSTILE_TOKEN_ENTROPY_BYTES")
                .default_value("32")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(16..=1024)),
        )
}
