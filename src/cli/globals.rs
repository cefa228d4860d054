use secrecy::SecretString;
use std::path::PathBuf;

use crate::bootstrap::BootstrapConfig;

/// Runtime configuration shared with every handler via an extension.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    /// Signing secret for minted tokens.
    pub jwt_secret: SecretString,
    /// Master secret for client-secret encryption.
    pub master_secret: SecretString,
    /// Lifetime of short-lived tokens.
    pub token_ttl_seconds: i64,
    /// Destination of the one-time admin credentials artifact.
    pub credentials_path: PathBuf,
    /// System resources seeded next to the global wildcard resource.
    pub system_resources: Vec<String>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString, master_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            master_secret,
            token_ttl_seconds: 3600,
            credentials_path: PathBuf::from("vigilo-admin-credentials.json"),
            system_resources: Vec::new(),
        }
    }

    #[must_use]
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            system_resources: self.system_resources.clone(),
            master_secret: self.master_secret.clone(),
            credentials_path: self.credentials_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(
            SecretString::from("jwt".to_string()),
            SecretString::from("master".to_string()),
        );
        assert_eq!(args.jwt_secret.expose_secret(), "jwt");
        assert_eq!(args.master_secret.expose_secret(), "master");
        assert_eq!(args.token_ttl_seconds, 3600);
        assert!(args.system_resources.is_empty());
    }

    #[test]
    fn bootstrap_config_carries_master_secret() {
        let mut args = GlobalArgs::new(
            SecretString::from("jwt".to_string()),
            SecretString::from("master".to_string()),
        );
        args.system_resources = vec!["OAUTH2_user".to_string()];

        let config = args.bootstrap_config();
        assert_eq!(config.master_secret.expose_secret(), "master");
        assert_eq!(config.system_resources, vec!["OAUTH2_user"]);
        assert_eq!(
            config.credentials_path,
            PathBuf::from("vigilo-admin-credentials.json")
        );
    }
}
