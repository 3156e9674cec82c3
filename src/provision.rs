//! User provisioning and the bootstrap procedure that drives it.
//!
//! DESIGN
//! ======
//! The procedure is strictly linear: load both secrets (fatal on failure),
//! disable telemetry (fire and forget), then submit `createUser` exactly once.
//! Database access goes through [`AdminCommands`] so the ordering and outcome
//! rules can be exercised without a live server.
//!
//! OUTCOMES
//! ========
//! Under [`ConflictPolicy::Lenient`] every `createUser` failure is reported as
//! "already exists", whatever its cause. [`ConflictPolicy::Strict`] only does
//! that for the server's duplicate-user error and surfaces everything else.

use std::io::{self, Write};

use crate::config::ProvisionSettings;
use crate::request::UserProvisioningRequest;
use crate::secrets::{PASSWORD_SECRET, SecretError, SecretStore, USERNAME_SECRET};

/// Server error code for `createUser` on an existing user.
pub const USER_ALREADY_EXISTS_CODE: i32 = 51003;

const TELEMETRY_NOTICE: &str = "Disable usage data collection.";

// =============================================================================
// ERRORS
// =============================================================================

/// A failed administrative command, detached from driver types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AdminError {
    pub code: Option<i32>,
    pub message: String,
}

impl AdminError {
    #[must_use]
    pub fn new(code: Option<i32>, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    #[must_use]
    pub fn is_user_exists(&self) -> bool {
        self.code == Some(USER_ALREADY_EXISTS_CODE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("mongodb client setup failed: {0}")]
    Client(#[from] mongodb::error::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error("user provisioning failed: {0}")]
    ProvisionFailed(String),
}

// =============================================================================
// ADMIN SEAM
// =============================================================================

/// Administrative commands issued against the target database system.
#[async_trait::async_trait]
pub trait AdminCommands: Send + Sync {
    /// Turn off the server's anonymous usage-data collection.
    async fn disable_telemetry(&self) -> Result<(), AdminError>;

    /// Create the user described by `request` with its role grants.
    async fn create_user(&self, request: &UserProvisioningRequest) -> Result<(), AdminError>;
}

// =============================================================================
// POLICY & OUTCOME
// =============================================================================

/// How a failed `createUser` call is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConflictPolicy {
    /// Any failure is reported as "already exists".
    #[default]
    Lenient,
    /// Only the server's duplicate-user error counts as "already exists".
    /// Every other failure ends the run with a non-zero exit.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
    Failed(String),
}

impl ProvisionOutcome {
    /// Map the outcome to the run's result: `Failed` becomes an error so the
    /// process exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::ProvisionFailed`] for a `Failed` outcome.
    pub fn into_result(self) -> Result<Self, BootstrapError> {
        match self {
            Self::Failed(reason) => Err(BootstrapError::ProvisionFailed(reason)),
            outcome => Ok(outcome),
        }
    }
}

#[must_use]
pub fn classify_failure(err: &AdminError, policy: ConflictPolicy) -> ProvisionOutcome {
    match policy {
        ConflictPolicy::Lenient => ProvisionOutcome::AlreadyExists,
        ConflictPolicy::Strict if err.is_user_exists() => ProvisionOutcome::AlreadyExists,
        ConflictPolicy::Strict => ProvisionOutcome::Failed(err.to_string()),
    }
}

// =============================================================================
// PROCEDURE
// =============================================================================

fn notice(out: &mut dyn Write, line: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{line}")?;
    out.flush()
}

/// Assemble the request from the secret mount and the injected settings.
///
/// # Errors
///
/// Returns the first secret that cannot be read.
pub fn load_request(
    settings: &ProvisionSettings,
    secrets: &SecretStore,
) -> Result<UserProvisioningRequest, SecretError> {
    let password = secrets.read_secret(PASSWORD_SECRET)?;
    let username = secrets.read_secret(USERNAME_SECRET)?;
    Ok(UserProvisioningRequest::new(
        username,
        password,
        settings.target_database.clone(),
        &settings.owner_database,
    ))
}

/// Disable telemetry once. Failures are logged and otherwise ignored.
///
/// # Errors
///
/// Returns an error only if the notice cannot be written to `out`.
pub async fn disable_telemetry<A>(admin: &A, out: &mut dyn Write) -> io::Result<()>
where
    A: AdminCommands + ?Sized,
{
    notice(out, TELEMETRY_NOTICE)?;
    if let Err(e) = admin.disable_telemetry().await {
        tracing::warn!(error = %e, code = ?e.code, "could not disable telemetry; continuing");
    }
    Ok(())
}

/// Submit `createUser` once and classify the result.
///
/// # Errors
///
/// Returns an error only if the outcome line cannot be written to `out`.
pub async fn provision_user<A>(
    request: &UserProvisioningRequest,
    admin: &A,
    policy: ConflictPolicy,
    out: &mut dyn Write,
) -> io::Result<ProvisionOutcome>
where
    A: AdminCommands + ?Sized,
{
    let user = request.username.as_str();
    let outcome = match admin.create_user(request).await {
        Ok(()) => ProvisionOutcome::Created,
        Err(e) => {
            tracing::debug!(user, error = %e, code = ?e.code, "createUser rejected");
            classify_failure(&e, policy)
        }
    };

    match &outcome {
        ProvisionOutcome::Created => {
            tracing::info!(user, database = %request.target_database, "user created");
            notice(out, &format!("Adding user: {user}"))?;
        }
        ProvisionOutcome::AlreadyExists => {
            tracing::info!(user, "user already exists");
            notice(out, &format!("User already exists: {user}"))?;
        }
        ProvisionOutcome::Failed(reason) => {
            tracing::error!(user, %reason, "user creation failed");
        }
    }
    Ok(outcome)
}

/// Run the whole procedure: secrets, telemetry, then user creation.
///
/// # Errors
///
/// Secret failures abort before any administrative command is issued.
/// Output write failures are also returned. A `Failed` outcome is returned
/// as `Ok` for the caller to act on.
pub async fn bootstrap<A>(
    settings: &ProvisionSettings,
    secrets: &SecretStore,
    admin: &A,
    out: &mut dyn Write,
) -> Result<ProvisionOutcome, BootstrapError>
where
    A: AdminCommands + ?Sized,
{
    let request = load_request(settings, secrets)?;
    disable_telemetry(admin, out).await?;
    Ok(provision_user(&request, admin, settings.policy, out).await?)
}

#[cfg(test)]
#[path = "provision_test.rs"]
mod tests;
