use crate::{
    api::{
        self,
        handlers::auth::{AuthConfig, RateLimitConfig},
    },
    cli::commands::{auth, limiter},
};
use anyhow::Result;
use std::time::Duration;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub auth: auth::Options,
    pub limiter: limiter::Options,
}

impl Args {
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_authentication_token_ttl_seconds(self.auth.authentication_token_ttl_seconds)
            .with_activation_token_ttl_seconds(self.auth.activation_token_ttl_seconds)
            .with_token_entropy_bytes(self.auth.token_entropy_bytes)
            .with_trust_proxy_headers(self.limiter.trust_proxy_headers)
    }

    #[must_use]
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new()
            .with_requests_per_second(self.limiter.requests_per_second)
            .with_burst(self.limiter.burst)
            .with_enabled(self.limiter.enabled)
            .with_janitor_interval(Duration::from_secs(self.limiter.janitor_interval_seconds))
            .with_idle_timeout(Duration::from_secs(self.limiter.idle_timeout_seconds))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is rejected or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let auth_config = args.auth_config();
    let rate_limit_config = args.rate_limit_config();

    api::new(args.port, args.dsn, auth_config, rate_limit_config).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        ("limiter_enabled", args.limiter.enabled.to_string()),
        (
            "limiter_rps",
            args.limiter.requests_per_second.to_string(),
        ),
        ("limiter_burst", args.limiter.burst.to_string()),
        (
            "trust_proxy_headers",
            args.limiter.trust_proxy_headers.to_string(),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "turnstile {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::TokenScope;

    fn args() -> Args {
        Args {
            port: 8080,
            dsn: None,
            auth: auth::Options {
                authentication_token_ttl_seconds: 60,
                activation_token_ttl_seconds: 120,
                token_entropy_bytes: 24,
            },
            limiter: limiter::Options {
                requests_per_second: 5.0,
                burst: 7,
                enabled: false,
                janitor_interval_seconds: 30,
                idle_timeout_seconds: 90,
                trust_proxy_headers: true,
            },
        }
    }

    #[test]
    fn builds_configs_from_options() {
        let args = args();

        let auth = args.auth_config();
        assert_eq!(
            auth.token_ttl(TokenScope::Authentication),
            Duration::from_secs(60)
        );
        assert_eq!(
            auth.token_ttl(TokenScope::Activation),
            Duration::from_secs(120)
        );
        assert_eq!(auth.token_entropy_bytes(), 24);
        assert!(auth.trust_proxy_headers());

        let limiter = args.rate_limit_config();
        assert!((limiter.requests_per_second() - 5.0).abs() < f64::EPSILON);
        assert_eq!(limiter.burst(), 7);
        assert!(!limiter.enabled());
        assert_eq!(limiter.janitor_interval(), Duration::from_secs(30));
        assert_eq!(limiter.idle_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn redacts_dsn_password() {
        assert_eq!(
            redact_dsn("postgres://user:secret@db:5432/turnstile"),
            "postgres://user:REDACTED@db:5432/turnstile"
        );
        assert_eq!(
            redact_dsn("postgres://db:5432/turnstile"),
            "postgres://db:5432/turnstile"
        );
        assert_eq!(redact_dsn("not a url"), "invalid-dsn");
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit(" abc "), "abc");
    }
}
