//! Locally generated user identifier.
//!
//! Used only to bucket conversations on the server. It is not a credential.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::Result;

const IDENTITY_FILE: &str = "user_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    id: String,
    path: PathBuf,
}

impl UserIdentity {
    /// Default location next to `config.json`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Config::config_dir()?.join(IDENTITY_FILE))
    }

    /// Read the stored identifier, creating and persisting one on first use.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let stored = fs::read_to_string(path)?;
            let stored = stored.trim();
            if is_valid(stored) {
                return Ok(Self {
                    id: stored.to_string(),
                    path: path.to_path_buf(),
                });
            }
        }
        Self::regenerate(path)
    }

    /// Replace the stored identifier with a fresh one.
    pub fn regenerate(path: &Path) -> Result<Self> {
        let id = generate();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &id)?;
        info!(user_id = %id, "stored new user identifier");
        Ok(Self {
            id,
            path: path.to_path_buf(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn generate() -> String {
    format!("user_{}", uuid::Uuid::new_v4().simple())
}

fn is_valid(id: &str) -> bool {
    id.strip_prefix("user_")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
}
