//! Persisted auth session: the bearer token backing every API call.
//!
//! The file is re-read on every `read_token` call. A login, logout, or
//! token refresh performed elsewhere is therefore respected by the next
//! session open without restarting the process.

use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    infra::error::AppError,
    usecases::contracts::{AuthToken, TokenSource},
};

const SESSION_READ_FAILED: &str = "SESSION_READ_FAILED";
const SESSION_PARSE_FAILED: &str = "SESSION_PARSE_FAILED";

#[derive(Debug, Serialize, Deserialize)]
struct PersistedAuth {
    token: String,
    user_id: i64,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    auth_file: PathBuf,
}

impl SessionStore {
    pub fn new(auth_file: PathBuf) -> Self {
        Self { auth_file }
    }

    pub fn save(&self, auth: &AuthToken) -> Result<(), AppError> {
        let persisted = PersistedAuth {
            token: auth.bearer.clone(),
            user_id: auth.user_id,
        };
        let raw = toml::to_string(&persisted).map_err(AppError::SessionEncode)?;

        if let Some(parent) = self.auth_file.parent() {
            fs::create_dir_all(parent).map_err(|source| AppError::StorageDirCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(&self.auth_file, raw).map_err(|source| AppError::SessionWrite {
            path: self.auth_file.clone(),
            source,
        })
    }

    /// Removes the persisted session. Returns whether a session existed.
    pub fn clear(&self) -> Result<bool, AppError> {
        if !self.auth_file.exists() {
            return Ok(false);
        }

        fs::remove_file(&self.auth_file)
            .map(|()| true)
            .map_err(|source| AppError::SessionRemove {
                path: self.auth_file.clone(),
                source,
            })
    }
}

impl TokenSource for SessionStore {
    fn read_token(&self) -> Option<AuthToken> {
        let raw = match fs::read_to_string(&self.auth_file) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(
                    code = SESSION_READ_FAILED,
                    path = %self.auth_file.display(),
                    error = %error,
                    "persisted session unreadable; treating as logged out"
                );
                return None;
            }
        };

        match toml::from_str::<PersistedAuth>(&raw) {
            Ok(persisted) => Some(AuthToken {
                bearer: persisted.token,
                user_id: persisted.user_id,
            }),
            Err(error) => {
                tracing::warn!(
                    code = SESSION_PARSE_FAILED,
                    path = %self.auth_file.display(),
                    error = %error,
                    "persisted session corrupt; treating as logged out"
                );
                None
            }
        }
    }
}
