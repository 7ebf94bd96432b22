use crate::api::handlers::auth::{Permission, TokenScope};
use crate::cli::{
    actions::{Action, grant, server, token},
    commands::{self, auth, limiter},
};
use anyhow::{Context, Result};
use clap::ArgMatches;
use uuid::Uuid;

fn required_dsn(matches: &ArgMatches) -> Result<String> {
    matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")
}

fn user_id(matches: &ArgMatches) -> Result<Uuid> {
    matches
        .get_one::<Uuid>(commands::ARG_USER_ID)
        .copied()
        .context("missing required argument: --user-id")
}

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::CMD_TOKEN, sub)) => Ok(Action::Token(token::Args {
            dsn: required_dsn(sub)?,
            user_id: user_id(sub)?,
            scope: sub
                .get_one::<TokenScope>(commands::ARG_SCOPE)
                .copied()
                .unwrap_or(TokenScope::Authentication),
            ttl_seconds: sub.get_one::<u64>(commands::ARG_TTL_SECONDS).copied(),
            auth: auth::Options::parse(sub)?,
        })),
        Some((commands::CMD_GRANT, sub)) => Ok(Action::Grant(grant::Args {
            dsn: required_dsn(sub)?,
            user_id: user_id(sub)?,
            permissions: sub
                .get_many::<Permission>(commands::ARG_PERMISSION)
                .map(|values| values.copied().collect())
                .unwrap_or_default(),
        })),
        _ => Ok(Action::Server(server::Args {
            port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
            dsn: matches.get_one::<String>(commands::ARG_DSN).cloned(),
            auth: auth::Options::parse(matches)?,
            limiter: limiter::Options::parse(matches)?,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV: [&str; 2] = ["TURNSTILE_DSN", "TURNSTILE_PORT"];

    #[test]
    fn server_without_dsn_uses_memory() -> Result<()> {
        temp_env::with_vars_unset(ENV, || {
            let matches = commands::new().get_matches_from(vec!["turnstile", "--port", "9000"]);
            let Action::Server(args) = handler(&matches)? else {
                panic!("expected server action");
            };
            assert_eq!(args.port, 9000);
            assert!(args.dsn.is_none());
            assert_eq!(args.auth.token_entropy_bytes, 32);
            assert_eq!(args.limiter.burst, 4);
            Ok(())
        })
    }

    #[test]
    fn token_requires_dsn() {
        temp_env::with_vars_unset(ENV, || {
            let user_id = Uuid::new_v4().to_string();
            let matches = commands::new().get_matches_from(vec![
                "turnstile",
                "token",
                "--user-id",
                user_id.as_str(),
            ]);
            let err = handler(&matches).err().map(|e| e.to_string());
            assert_eq!(err.as_deref(), Some("missing required argument: --dsn"));
        });
    }

    #[test]
    fn token_action() -> Result<()> {
        temp_env::with_vars_unset(ENV, || {
            let user_id = Uuid::new_v4();
            let id = user_id.to_string();
            let matches = commands::new().get_matches_from(vec![
                "turnstile",
                "--dsn",
                "postgres://localhost/turnstile",
                "token",
                "--user-id",
                id.as_str(),
                "--ttl-seconds",
                "60",
            ]);
            let Action::Token(args) = handler(&matches)? else {
                panic!("expected token action");
            };
            assert_eq!(args.user_id, user_id);
            assert_eq!(args.scope, TokenScope::Authentication);
            assert_eq!(args.ttl_seconds, Some(60));
            assert_eq!(args.dsn, "postgres://localhost/turnstile");
            Ok(())
        })
    }

    #[test]
    fn grant_action() -> Result<()> {
        temp_env::with_vars_unset(ENV, || {
            let id = Uuid::new_v4().to_string();
            let matches = commands::new().get_matches_from(vec![
                "turnstile",
                "grant",
                "--dsn",
                "postgres://localhost/turnstile",
                "--user-id",
                id.as_str(),
                "--permission",
                "movies:write",
            ]);
            let Action::Grant(args) = handler(&matches)? else {
                panic!("expected grant action");
            };
            assert_eq!(args.permissions, vec![Permission::MoviesWrite]);
            Ok(())
        })
    }
}
