use crate::{api, cli::globals::GlobalArgs};
use anyhow::Result;
use secrecy::SecretString;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub master_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub credentials_path: PathBuf,
    pub system_resources: Vec<String>,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the database is unreachable, the schema bootstrap
/// fails, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let globals = GlobalArgs {
        jwt_secret: args.jwt_secret,
        master_secret: args.master_secret,
        token_ttl_seconds: args.token_ttl_seconds,
        credentials_path: args.credentials_path,
        system_resources: args.system_resources,
    };

    api::new(args.port, args.dsn, &globals).await
}
