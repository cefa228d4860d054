//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the server action with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    commands::validate(matches).map_err(|err| anyhow::anyhow!(err))?;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let jwt_secret = matches
        .get_one::<String>(commands::ARG_JWT_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --jwt-secret")?;
    let master_secret = matches
        .get_one::<String>(commands::ARG_MASTER_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --master-secret")?;
    let token_ttl_seconds = matches
        .get_one::<i64>("token-ttl")
        .copied()
        .unwrap_or(3600);
    let credentials_path = matches
        .get_one::<String>("credentials-path")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("vigilo-admin-credentials.json"));
    let system_resources: Vec<String> = matches
        .get_many::<String>(commands::ARG_SYSTEM_RESOURCE)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret,
        master_secret,
        token_ttl_seconds,
        credentials_path,
        system_resources,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars(
            [
                ("VIGILO_PORT", None::<&str>),
                ("VIGILO_TOKEN_TTL", None::<&str>),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec![
                    "vigilo",
                    "--dsn",
                    "postgres://localhost/vigilo",
                    "--jwt-secret",
                    "0123456789abcdef0123456789abcdef",
                    "--master-secret",
                    "0123456789abcdef",
                    "--token-ttl",
                    "600",
                ]);

                let action = handler(&matches).expect("valid matches");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://localhost/vigilo");
                assert_eq!(args.token_ttl_seconds, 600);
                assert_eq!(
                    args.jwt_secret.expose_secret(),
                    "0123456789abcdef0123456789abcdef"
                );
                assert!(!args.system_resources.is_empty());
            },
        );
    }

    #[test]
    fn handler_rejects_weak_secrets() {
        temp_env::with_vars([("VIGILO_JWT_SECRET", None::<&str>)], || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "vigilo",
                "--dsn",
                "postgres://localhost/vigilo",
                "--jwt-secret",
                "weak",
                "--master-secret",
                "0123456789abcdef",
            ]);
            assert!(handler(&matches).is_err());
        });
    }
}
