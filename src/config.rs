//! Bootstrap configuration parsed from CLI flags and environment variables.
//!
//! Every flag falls back to an environment variable so the binary can be
//! configured entirely from a Compose `environment:` block. The parsed
//! [`Cli`] is validated once into a [`BootstrapConfig`], which is what the
//! rest of the program receives.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::provision::ConflictPolicy;
use crate::request::{ADMIN_DATABASE, DEFAULT_OWNER_DATABASE};
use crate::secrets::{self, DEFAULT_SECRETS_DIR};

pub const DEFAULT_MONGO_URI: &str = "mongodb://127.0.0.1:27017";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MONGO_DATABASE is not set; pass --database or set MONGO_DATABASE")]
    MissingDatabase,
    #[error("{setting} must not be blank")]
    Blank { setting: &'static str },
    #[error("both {var} and {var}_FILE are set; use one")]
    ConflictingRootCredential { var: &'static str },
    #[error("connect timeout must be at least one second")]
    ZeroConnectTimeout,
    #[error("root credentials need both a username and a password")]
    IncompleteRootCredential,
    #[error("failed to read {var}_FILE at {}: {source}", path.display())]
    CredentialFile {
        var: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mongo-bootstrap", about = "Create the application MongoDB user at container startup")]
pub struct Cli {
    /// Directory holding the `mongo-username` and `mongo-password` secrets.
    #[arg(long, env = "SECRETS_DIR", default_value = DEFAULT_SECRETS_DIR)]
    pub secrets_dir: PathBuf,

    /// Application database the user gets `readWrite` on.
    #[arg(long, env = "MONGO_DATABASE")]
    pub database: Option<String>,

    /// Database the user gets `dbOwner` on.
    #[arg(long, env = "MONGO_OWNER_DATABASE", default_value = DEFAULT_OWNER_DATABASE)]
    pub owner_database: String,

    /// Database the user is created in.
    #[arg(long, env = "MONGO_USER_DATABASE", default_value = ADMIN_DATABASE)]
    pub user_database: String,

    #[arg(long, env = "MONGO_URI", default_value = DEFAULT_MONGO_URI)]
    pub uri: String,

    #[arg(long, env = "MONGO_INITDB_ROOT_USERNAME")]
    pub root_username: Option<String>,

    #[arg(long, env = "MONGO_INITDB_ROOT_USERNAME_FILE")]
    pub root_username_file: Option<PathBuf>,

    #[arg(long, env = "MONGO_INITDB_ROOT_PASSWORD", hide_env_values = true)]
    pub root_password: Option<String>,

    #[arg(long, env = "MONGO_INITDB_ROOT_PASSWORD_FILE")]
    pub root_password_file: Option<PathBuf>,

    #[arg(long, env = "BOOTSTRAP_CONFLICT_POLICY", value_enum, default_value_t = ConflictPolicy::Lenient)]
    pub conflict_policy: ConflictPolicy,

    #[arg(long, env = "MONGO_CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,
}

/// Settings the provisioning procedure consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub target_database: String,
    pub owner_database: String,
    pub user_database: String,
    pub policy: ConflictPolicy,
}

#[derive(Clone, PartialEq, Eq)]
pub struct RootCredential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RootCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoSettings {
    pub uri: String,
    pub root: Option<RootCredential>,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub secrets_dir: PathBuf,
    pub provision: ProvisionSettings,
    pub mongo: MongoSettings,
}

impl BootstrapConfig {
    /// Validate parsed flags into a typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if `MONGO_DATABASE` is missing or blank, a database
    /// name is blank, or the root credentials are contradictory or unreadable.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let target_database = cli
            .database
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty())
            .ok_or(ConfigError::MissingDatabase)?;
        let owner_database = non_blank("owner database", cli.owner_database)?;
        let user_database = non_blank("user database", cli.user_database)?;
        let uri = non_blank("MongoDB URI", cli.uri)?;
        if cli.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroConnectTimeout);
        }

        let username = resolve_credential("MONGO_INITDB_ROOT_USERNAME", cli.root_username, cli.root_username_file)?;
        let password = resolve_credential("MONGO_INITDB_ROOT_PASSWORD", cli.root_password, cli.root_password_file)?;
        let root = match (username, password) {
            (Some(username), Some(password)) => Some(RootCredential { username, password }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteRootCredential),
        };

        Ok(Self {
            secrets_dir: cli.secrets_dir,
            provision: ProvisionSettings {
                target_database,
                owner_database,
                user_database,
                policy: cli.conflict_policy,
            },
            mongo: MongoSettings { uri, root, connect_timeout: Duration::from_secs(cli.connect_timeout_secs) },
        })
    }
}

/// Treat a missing `.env` as normal; pass every other load error through.
///
/// # Errors
///
/// Returns the load error unless it only says the file was not found.
pub fn ignore_missing_env_file(
    result: Result<PathBuf, dotenvy::Error>,
) -> Result<Option<PathBuf>, dotenvy::Error> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn non_blank(setting: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Blank { setting });
    }
    Ok(trimmed.to_owned())
}

/// Resolve a value given either inline or via a `_FILE` path, as the
/// official `mongo` image does for its root credentials.
fn resolve_credential(
    var: &'static str,
    inline: Option<String>,
    file: Option<PathBuf>,
) -> Result<Option<String>, ConfigError> {
    match (inline, file) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingRootCredential { var }),
        (Some(value), None) => Ok(Some(value.trim().to_owned()).filter(|v| !v.is_empty())),
        (None, Some(path)) => {
            let value =
                secrets::read_trimmed(&path).map_err(|source| ConfigError::CredentialFile { var, path, source })?;
            Ok(Some(value).filter(|v| !v.is_empty()))
        }
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
