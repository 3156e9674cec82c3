use std::collections::HashSet;
use std::sync::Mutex;

use super::*;
use crate::request::{DEFAULT_OWNER_DATABASE, RoleGrant, RoleName};
use crate::secrets::test_helpers::TempSecrets;

// =========================================================================
// MockAdmin
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    DisableTelemetry,
    CreateUser(String),
}

/// Records every call. Behaves like a server: a second `createUser` for the
/// same name is rejected with the duplicate-user code.
#[derive(Default)]
struct MockAdmin {
    calls: Mutex<Vec<Call>>,
    requests: Mutex<Vec<UserProvisioningRequest>>,
    users: Mutex<HashSet<String>>,
    telemetry_error: Option<AdminError>,
    create_error: Option<AdminError>,
}

impl MockAdmin {
    fn failing_create(err: AdminError) -> Self {
        Self { create_error: Some(err), ..Self::default() }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn create_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::CreateUser(_))).count()
    }
}

#[async_trait::async_trait]
impl AdminCommands for MockAdmin {
    async fn disable_telemetry(&self) -> Result<(), AdminError> {
        self.calls.lock().unwrap().push(Call::DisableTelemetry);
        match &self.telemetry_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn create_user(&self, request: &UserProvisioningRequest) -> Result<(), AdminError> {
        self.calls.lock().unwrap().push(Call::CreateUser(request.username.clone()));
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = &self.create_error {
            return Err(err.clone());
        }
        if !self.users.lock().unwrap().insert(request.username.clone()) {
            return Err(AdminError::new(
                Some(USER_ALREADY_EXISTS_CODE),
                format!("User \"{}@admin\" already exists", request.username),
            ));
        }
        Ok(())
    }
}

fn settings(policy: ConflictPolicy) -> ProvisionSettings {
    ProvisionSettings {
        target_database: "app".into(),
        owner_database: DEFAULT_OWNER_DATABASE.into(),
        user_database: "admin".into(),
        policy,
    }
}

fn timeout_error() -> AdminError {
    AdminError::new(None, "Server selection timeout: No available servers")
}

async fn run(admin: &MockAdmin, secrets: &TempSecrets, policy: ConflictPolicy) -> (ProvisionOutcome, String) {
    let mut out = Vec::new();
    let outcome = bootstrap(&settings(policy), &secrets.store(), admin, &mut out).await.unwrap();
    (outcome, String::from_utf8(out).unwrap())
}

// =========================================================================
// bootstrap: happy path and idempotence
// =========================================================================

#[tokio::test]
async fn bootstrap_creates_user_and_logs_notices() {
    let secrets = TempSecrets::with_credentials("alice\n", "hunter2\n");
    let admin = MockAdmin::default();

    let (outcome, out) = run(&admin, &secrets, ConflictPolicy::Lenient).await;

    assert_eq!(outcome, ProvisionOutcome::Created);
    assert_eq!(out, "\nDisable usage data collection.\n\nAdding user: alice\n");
    assert_eq!(admin.calls(), vec![Call::DisableTelemetry, Call::CreateUser("alice".into())]);
}

#[tokio::test]
async fn bootstrap_second_run_reports_already_exists() {
    let secrets = TempSecrets::with_credentials("alice", "hunter2");
    let admin = MockAdmin::default();

    let (first, _) = run(&admin, &secrets, ConflictPolicy::Lenient).await;
    let (second, out) = run(&admin, &secrets, ConflictPolicy::Lenient).await;

    assert_eq!(first, ProvisionOutcome::Created);
    assert_eq!(second, ProvisionOutcome::AlreadyExists);
    assert_eq!(out, "\nDisable usage data collection.\n\nUser already exists: alice\n");
    assert_eq!(admin.create_count(), 2);
}

#[tokio::test]
async fn bootstrap_submits_trimmed_credentials_and_fixed_roles() {
    let secrets = TempSecrets::with_credentials("alice\n", "  hunter2 \n");
    let admin = MockAdmin::default();

    run(&admin, &secrets, ConflictPolicy::Lenient).await;

    let requests = admin.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.username, "alice");
    assert_eq!(req.password, "hunter2");
    assert_eq!(req.target_database, "app");
    assert_eq!(
        req.role_grants,
        vec![
            RoleGrant::new(RoleName::ReadWrite, "admin"),
            RoleGrant::new(RoleName::ReadWrite, "app"),
            RoleGrant::new(RoleName::DbOwner, DEFAULT_OWNER_DATABASE),
        ]
    );
}

// =========================================================================
// bootstrap: fatal secrets
// =========================================================================

#[tokio::test]
async fn bootstrap_missing_password_aborts_before_any_command() {
    let secrets = TempSecrets::new();
    secrets.write(crate::secrets::USERNAME_SECRET, "alice\n");
    let admin = MockAdmin::default();
    let mut out = Vec::new();

    let err = bootstrap(&settings(ConflictPolicy::Lenient), &secrets.store(), &admin, &mut out)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::Secret(SecretError::Unavailable { ref name, .. }) if name == "mongo-password"));
    assert!(admin.calls().is_empty());
    assert!(out.is_empty());
}

#[tokio::test]
async fn bootstrap_missing_username_aborts_before_any_command() {
    let secrets = TempSecrets::new();
    secrets.write(crate::secrets::PASSWORD_SECRET, "hunter2\n");
    let admin = MockAdmin::default();
    let mut out = Vec::new();

    let err = bootstrap(&settings(ConflictPolicy::Lenient), &secrets.store(), &admin, &mut out)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("mongo-username"));
    assert_eq!(admin.create_count(), 0);
}

// =========================================================================
// bootstrap: telemetry ordering
// =========================================================================

#[tokio::test]
async fn telemetry_precedes_creation_on_failure_path() {
    let secrets = TempSecrets::with_credentials("alice", "hunter2");
    let admin = MockAdmin::failing_create(timeout_error());

    run(&admin, &secrets, ConflictPolicy::Lenient).await;

    assert_eq!(admin.calls(), vec![Call::DisableTelemetry, Call::CreateUser("alice".into())]);
}

#[tokio::test]
async fn telemetry_failure_does_not_stop_provisioning() {
    let secrets = TempSecrets::with_credentials("alice", "hunter2");
    let admin = MockAdmin {
        telemetry_error: Some(AdminError::new(Some(59), "no such command: 'setFreeMonitoring'")),
        ..MockAdmin::default()
    };

    let (outcome, out) = run(&admin, &secrets, ConflictPolicy::Strict).await;

    assert_eq!(outcome, ProvisionOutcome::Created);
    assert!(out.ends_with("\nAdding user: alice\n"));
    assert_eq!(admin.calls().len(), 2);
}

// =========================================================================
// Conflict policy
// =========================================================================

#[tokio::test]
async fn lenient_policy_reclassifies_any_error_as_already_exists() {
    let secrets = TempSecrets::with_credentials("alice", "hunter2");
    let admin = MockAdmin::failing_create(timeout_error());

    let (outcome, out) = run(&admin, &secrets, ConflictPolicy::Lenient).await;

    assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
    assert!(out.ends_with("\nUser already exists: alice\n"));
    assert_eq!(admin.create_count(), 1);
}

#[tokio::test]
async fn strict_policy_accepts_duplicate_user() {
    let secrets = TempSecrets::with_credentials("alice", "hunter2");
    let admin = MockAdmin::failing_create(AdminError::new(Some(USER_ALREADY_EXISTS_CODE), "already exists"));

    let (outcome, out) = run(&admin, &secrets, ConflictPolicy::Strict).await;

    assert_eq!(outcome, ProvisionOutcome::AlreadyExists);
    assert!(out.ends_with("\nUser already exists: alice\n"));
}

#[tokio::test]
async fn strict_policy_surfaces_other_errors() {
    let secrets = TempSecrets::with_credentials("alice", "hunter2");
    let admin = MockAdmin::failing_create(AdminError::new(Some(13), "not authorized on admin to execute command"));

    let (outcome, out) = run(&admin, &secrets, ConflictPolicy::Strict).await;

    assert_eq!(outcome, ProvisionOutcome::Failed("not authorized on admin to execute command".into()));
    assert_eq!(out, "\nDisable usage data collection.\n");
}

#[test]
fn classify_failure_table() {
    let dup = AdminError::new(Some(USER_ALREADY_EXISTS_CODE), "dup");
    let other = AdminError::new(Some(11000), "E11000 duplicate key");
    let no_code = timeout_error();

    assert_eq!(classify_failure(&dup, ConflictPolicy::Lenient), ProvisionOutcome::AlreadyExists);
    assert_eq!(classify_failure(&other, ConflictPolicy::Lenient), ProvisionOutcome::AlreadyExists);
    assert_eq!(classify_failure(&no_code, ConflictPolicy::Lenient), ProvisionOutcome::AlreadyExists);
    assert_eq!(classify_failure(&dup, ConflictPolicy::Strict), ProvisionOutcome::AlreadyExists);
    assert_eq!(classify_failure(&other, ConflictPolicy::Strict), ProvisionOutcome::Failed("E11000 duplicate key".into()));
    assert!(matches!(classify_failure(&no_code, ConflictPolicy::Strict), ProvisionOutcome::Failed(_)));
}

#[test]
fn default_policy_is_lenient() {
    assert_eq!(ConflictPolicy::default(), ConflictPolicy::Lenient);
}

// =========================================================================
// load_request
// =========================================================================

#[test]
fn load_request_uses_owner_database_override() {
    let secrets = TempSecrets::with_credentials("bob", "pw");
    let settings = ProvisionSettings { owner_database: "test_orders".into(), ..settings(ConflictPolicy::Lenient) };

    let req = load_request(&settings, &secrets.store()).unwrap();
    assert_eq!(req.role_grants[2], RoleGrant::new(RoleName::DbOwner, "test_orders"));
}

// =========================================================================
// ProvisionOutcome::into_result
// =========================================================================

#[test]
fn into_result_passes_success_outcomes_through() {
    assert_eq!(ProvisionOutcome::Created.into_result().unwrap(), ProvisionOutcome::Created);
    assert_eq!(ProvisionOutcome::AlreadyExists.into_result().unwrap(), ProvisionOutcome::AlreadyExists);
}

#[test]
fn into_result_turns_failed_into_error() {
    let err = ProvisionOutcome::Failed("not authorized".into()).into_result().unwrap_err();
    assert!(matches!(err, BootstrapError::ProvisionFailed(ref reason) if reason == "not authorized"));
    assert_eq!(err.to_string(), "user provisioning failed: not authorized");
}

#[tokio::test]
async fn strict_run_with_other_error_ends_in_error() {
    let secrets = TempSecrets::with_credentials("alice", "hunter2");
    let admin = MockAdmin::failing_create(timeout_error());

    let (outcome, _) = run(&admin, &secrets, ConflictPolicy::Strict).await;

    assert!(matches!(outcome.into_result(), Err(BootstrapError::ProvisionFailed(_))));
}
