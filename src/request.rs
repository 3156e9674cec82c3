//! User provisioning request and the `createUser` command it renders to.

use std::fmt;

use mongodb::bson::{Document, doc};

pub const ADMIN_DATABASE: &str = "admin";

/// Database granted `dbOwner` unless overridden. Carried over from the
/// generated init script, where it named the project's test database.
pub const DEFAULT_OWNER_DATABASE: &str = "test_pyproject_starter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleName {
    ReadWrite,
    DbOwner,
}

impl RoleName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadWrite => "readWrite",
            Self::DbOwner => "dbOwner",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (role, database) authorization scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: RoleName,
    pub db: String,
}

impl RoleGrant {
    #[must_use]
    pub fn new(role: RoleName, db: impl Into<String>) -> Self {
        Self { role, db: db.into() }
    }

    fn to_document(&self) -> Document {
        doc! { "role": self.role.as_str(), "db": self.db.as_str() }
    }
}

/// The fixed grant list, in submission order.
#[must_use]
pub fn role_grants(target_database: &str, owner_database: &str) -> Vec<RoleGrant> {
    vec![
        RoleGrant::new(RoleName::ReadWrite, ADMIN_DATABASE),
        RoleGrant::new(RoleName::ReadWrite, target_database),
        RoleGrant::new(RoleName::DbOwner, owner_database),
    ]
}

#[derive(Clone, PartialEq, Eq)]
pub struct UserProvisioningRequest {
    pub username: String,
    pub password: String,
    pub target_database: String,
    pub role_grants: Vec<RoleGrant>,
}

impl UserProvisioningRequest {
    #[must_use]
    pub fn new(username: String, password: String, target_database: String, owner_database: &str) -> Self {
        let role_grants = role_grants(&target_database, owner_database);
        Self { username, password, target_database, role_grants }
    }

    /// Render as `{ createUser, pwd, roles }`.
    #[must_use]
    pub fn to_command(&self) -> Document {
        let roles: Vec<Document> = self.role_grants.iter().map(RoleGrant::to_document).collect();
        doc! {
            "createUser": self.username.as_str(),
            "pwd": self.password.as_str(),
            "roles": roles,
        }
    }
}

impl fmt::Debug for UserProvisioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserProvisioningRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("target_database", &self.target_database)
            .field("role_grants", &self.role_grants)
            .finish()
    }
}

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;
