//! MongoDB client setup and the driver-backed [`AdminCommands`].
//!
//! SYSTEM CONTEXT
//! ==============
//! Startup builds one `mongodb::Client` authenticated as the root user and
//! wraps it in [`MongoAdmin`]. The driver connects lazily, so nothing goes
//! over the wire until the first administrative command.
//!
//! TELEMETRY
//! =========
//! `disable_telemetry` sends `setFreeMonitoring` to turn off the server's
//! free cloud monitoring. Servers 7.0 and later removed that feature, so on
//! those the command fails and the run only logs a warning.

use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, Credential};
use mongodb::Client;

use crate::config::{MongoSettings, RootCredential};
use crate::provision::{AdminCommands, AdminError};
use crate::request::{ADMIN_DATABASE, UserProvisioningRequest};

pub const APP_NAME: &str = "mongo-bootstrap";

/// Build client options from the configured URI, timeouts and root login.
///
/// # Errors
///
/// Returns an error if the connection string cannot be parsed.
pub async fn client_options(settings: &MongoSettings) -> Result<ClientOptions, mongodb::error::Error> {
    let mut options = ClientOptions::parse(&settings.uri).await?;
    options.app_name = Some(APP_NAME.to_owned());
    options.connect_timeout = Some(settings.connect_timeout);
    options.server_selection_timeout = Some(settings.connect_timeout);
    if let Some(root) = &settings.root {
        options.credential = Some(root_credential(root));
    }
    Ok(options)
}

/// Create the MongoDB client.
///
/// # Errors
///
/// Returns an error if the options are invalid.
pub async fn connect(settings: &MongoSettings) -> Result<Client, mongodb::error::Error> {
    let options = client_options(settings).await?;
    let hosts: Vec<String> = options.hosts.iter().map(ToString::to_string).collect();
    let client = Client::with_options(options)?;
    tracing::info!(?hosts, authenticated = settings.root.is_some(), "mongodb client ready");
    Ok(client)
}

fn root_credential(root: &RootCredential) -> Credential {
    let mut credential = Credential::default();
    credential.username = Some(root.username.clone());
    credential.password = Some(root.password.clone());
    credential.source = Some(ADMIN_DATABASE.to_owned());
    credential
}

impl From<mongodb::error::Error> for AdminError {
    fn from(err: mongodb::error::Error) -> Self {
        let code = match err.kind.as_ref() {
            ErrorKind::Command(command) => Some(command.code),
            _ => None,
        };
        Self::new(code, err.to_string())
    }
}

// =============================================================================
// ADMIN COMMANDS
// =============================================================================

pub struct MongoAdmin {
    client: Client,
    user_database: String,
}

impl MongoAdmin {
    #[must_use]
    pub fn new(client: Client, user_database: impl Into<String>) -> Self {
        Self { client, user_database: user_database.into() }
    }
}

#[async_trait::async_trait]
impl AdminCommands for MongoAdmin {
    async fn disable_telemetry(&self) -> Result<(), AdminError> {
        self.client
            .database(ADMIN_DATABASE)
            .run_command(doc! { "setFreeMonitoring": 1, "action": "disable" })
            .await?;
        Ok(())
    }

    async fn create_user(&self, request: &UserProvisioningRequest) -> Result<(), AdminError> {
        self.client
            .database(&self.user_database)
            .run_command(request.to_command())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
