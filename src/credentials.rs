//! Credential sets for device access, loaded from a YAML/JSON document or
//! from the environment. Read-only once constructed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const ENV_USER: &str = "PATHTRACE_USER";
pub const ENV_PASS: &str = "PATHTRACE_PASS";
pub const ENV_SECRET: &str = "PATHTRACE_SECRET";
pub const ENV_SSH_KEY: &str = "PATHTRACE_SSH_KEY";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("reading credential file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing credential file {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSet {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Enable secret on Cisco platforms.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub ssh_key_file: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
}

impl CredentialSet {
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn has_key(&self) -> bool {
        self.ssh_key_file.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct CredentialDoc {
    #[serde(default)]
    credentials: HashMap<String, CredentialSet>,
}

/// Named credential sets; devices reference them by `credentials_ref`.
#[derive(Debug, Default)]
pub struct CredentialStore {
    sets: HashMap<String, CredentialSet>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the given file when it exists, otherwise fall back to the
    /// single `default` set from the environment (if present).
    pub fn load(path: Option<&Path>) -> Result<Self, CredentialError> {
        if let Some(path) = path {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Self::from_env())
    }

    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        let text = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let doc: CredentialDoc = if is_yaml(path) {
            serde_yaml::from_str(&text).map_err(|e| CredentialError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            serde_json::from_str(&text).map_err(|e| CredentialError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        };
        tracing::info!(sets = doc.credentials.len(), "loaded credential file");
        Ok(Self {
            sets: doc.credentials,
        })
    }

    /// Build the `default` set from `PATHTRACE_*` environment variables.
    /// Returns an empty store when no username is exported.
    pub fn from_env() -> Self {
        let mut store = Self::new();
        if let Ok(username) = std::env::var(ENV_USER) {
            store.add(
                "default",
                CredentialSet {
                    username,
                    password: std::env::var(ENV_PASS).ok(),
                    secret: std::env::var(ENV_SECRET).ok(),
                    ssh_key_file: std::env::var(ENV_SSH_KEY).ok(),
                    api_token: None,
                },
            );
            tracing::info!("loaded default credentials from environment");
        }
        store
    }

    pub fn add(&mut self, name: impl Into<String>, set: CredentialSet) {
        self.sets.insert(name.into(), set);
    }

    pub fn get(&self, name: &str) -> Option<&CredentialSet> {
        self.sets.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
