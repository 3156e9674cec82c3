//! Secret loader for orchestrator-mounted secret files.
//!
//! DESIGN
//! ======
//! Each secret is a single file under a fixed directory (`/run/secrets` for
//! Docker and Compose). The file name is the secret name and the content is
//! the value, usually with a trailing newline that has to be stripped.

use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_SECRETS_DIR: &str = "/run/secrets";
pub const USERNAME_SECRET: &str = "mongo-username";
pub const PASSWORD_SECRET: &str = "mongo-password";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {name} unavailable at {}: {source}", path.display())]
    Unavailable {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("secret {name} is empty")]
    Empty { name: String },
}

/// Read-only view over a secrets directory.
#[derive(Debug, Clone)]
pub struct SecretStore {
    root: PathBuf,
}

impl SecretStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read secret `name` with surrounding whitespace stripped.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Unavailable`] when the file is missing,
    /// unreadable or not UTF-8, and [`SecretError::Empty`] when nothing is
    /// left after trimming.
    pub fn read_secret(&self, name: &str) -> Result<String, SecretError> {
        let path = self.root.join(name);
        let value = read_trimmed(&path).map_err(|source| SecretError::Unavailable {
            name: name.to_owned(),
            path: path.clone(),
            source,
        })?;
        if value.is_empty() {
            return Err(SecretError::Empty { name: name.to_owned() });
        }
        tracing::debug!(secret = name, path = %path.display(), "secret loaded");
        Ok(value)
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new(DEFAULT_SECRETS_DIR)
    }
}

/// Read a UTF-8 text file and trim it.
///
/// # Errors
///
/// Returns the underlying I/O error; invalid UTF-8 surfaces as
/// [`io::ErrorKind::InvalidData`].
pub fn read_trimmed(path: &Path) -> io::Result<String> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw.trim().to_owned())
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "secrets_test.rs"]
mod tests;
