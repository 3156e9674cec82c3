mod config;
mod db;
mod provision;
mod request;
mod secrets;

use std::process::ExitCode;

use clap::Parser;

use crate::config::{BootstrapConfig, Cli};
use crate::provision::{BootstrapError, ProvisionOutcome};
use crate::secrets::SecretStore;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    match config::ignore_missing_env_file(dotenvy::dotenv()) {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), ".env loaded"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) => {
            tracing::info!(?outcome, "bootstrap finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "bootstrap failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ProvisionOutcome, BootstrapError> {
    let config = BootstrapConfig::from_cli(cli)?;
    let secrets = SecretStore::new(&config.secrets_dir);
    tracing::debug!(secrets = %secrets.root().display(), database = %config.provision.target_database, "config loaded");
    let client = db::connect(&config.mongo).await?;
    let admin = db::MongoAdmin::new(client, &config.provision.user_database);

    let mut stdout = std::io::stdout().lock();
    provision::bootstrap(&config.provision, &secrets, &admin, &mut stdout)
        .await?
        .into_result()
}
