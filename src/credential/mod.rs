//! Login credential handling
//!
//! This module covers:
//! - The credential bundle (session token, CSRF token, device id, user id,
//!   long-lived refresh token)
//! - Loading credentials from environment variables with JSON-file overrides
//! - A shared store that serializes refresh attempts so concurrent tasks
//!   never race each other into redundant refreshes

use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

use crate::{HarvestError, Result};

/// A bilibili login credential bundle.
///
/// Loaded once at startup and only ever mutated by a refresh. `ac_time_value`
/// is the long-lived refresh token; without it a `-352` expiry is terminal.
#[derive(Debug, Clone)]
pub struct Credential {
    pub sessdata: String,
    pub bili_jct: String,
    pub buvid3: String,
    pub dede_user_id: String,
    pub ac_time_value: String,
}

impl Credential {
    /// Formats the cookie header sent with every API request.
    pub fn cookie_header(&self) -> String {
        let mut parts = vec![format!("SESSDATA={}", self.sessdata)];
        if !self.bili_jct.is_empty() {
            parts.push(format!("bili_jct={}", self.bili_jct));
        }
        if !self.buvid3.is_empty() {
            parts.push(format!("buvid3={}", self.buvid3));
        }
        if !self.dede_user_id.is_empty() {
            parts.push(format!("DedeUserID={}", self.dede_user_id));
        }
        parts.join("; ")
    }

    /// Returns true if the bundle carries the long-lived refresh token.
    pub fn can_refresh(&self) -> bool {
        !self.ac_time_value.is_empty()
    }
}

/// On-disk credential file shape.
///
/// The field names match what the platform's cookie export produces, hence
/// the mixed casing.
#[derive(Debug, Default, Deserialize)]
struct CredentialFile {
    #[serde(rename = "SESSDATA", default)]
    sessdata: Option<String>,
    #[serde(default)]
    bili_jct: Option<String>,
    #[serde(default)]
    buvid3: Option<String>,
    #[serde(rename = "DedeUserID", default)]
    dede_user_id: Option<String>,
    #[serde(default)]
    ac_time_value: Option<String>,
}

/// Loads a credential from environment variables and an optional JSON file.
///
/// Environment variables (`BILI_SESSDATA`, `BILI_JCT`, `BILI_BUVID3`,
/// `BILI_DEDEUSERID`, `BILI_AC_TIME_VALUE`) provide defaults; file values
/// override them when present. A missing `SESSDATA` means there is no
/// credential at all and the crawler runs anonymously.
pub fn load(config_path: Option<&Path>) -> Option<Credential> {
    load_with_env(|name| std::env::var(name).ok(), config_path)
}

/// Same as [`load`] but with an injectable environment lookup.
pub fn load_with_env<E>(get_env: E, config_path: Option<&Path>) -> Option<Credential>
where
    E: Fn(&str) -> Option<String>,
{
    let mut sessdata = get_env("BILI_SESSDATA");
    let mut bili_jct = get_env("BILI_JCT");
    let mut buvid3 = get_env("BILI_BUVID3");
    let mut dede_user_id = get_env("BILI_DEDEUSERID");
    let mut ac_time_value = get_env("BILI_AC_TIME_VALUE");

    if let Some(path) = config_path {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<CredentialFile>(&content) {
                Ok(file) => {
                    tracing::info!("Loaded credential overrides from {}", path.display());
                    if file.sessdata.is_some() {
                        sessdata = file.sessdata;
                    }
                    if file.bili_jct.is_some() {
                        bili_jct = file.bili_jct;
                    }
                    if file.buvid3.is_some() {
                        buvid3 = file.buvid3;
                    }
                    if file.dede_user_id.is_some() {
                        dede_user_id = file.dede_user_id;
                    }
                    if file.ac_time_value.is_some() {
                        ac_time_value = file.ac_time_value;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to parse credential file {}: {}", path.display(), e);
                }
            },
            Err(e) => {
                tracing::warn!("Credential file {} not readable: {}", path.display(), e);
            }
        }
    }

    let sessdata = match sessdata {
        Some(s) if !s.is_empty() => s,
        _ => {
            tracing::warn!("No SESSDATA found; running without a credential");
            return None;
        }
    };

    Some(Credential {
        sessdata,
        bili_jct: bili_jct.unwrap_or_default(),
        buvid3: buvid3.unwrap_or_default(),
        dede_user_id: dede_user_id.unwrap_or_default(),
        ac_time_value: ac_time_value.unwrap_or_default(),
    })
}

/// Tokens returned by a successful refresh call.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub sessdata: String,
    pub bili_jct: String,
    pub refresh_token: String,
}

/// Shared credential store with serialized refresh.
///
/// The store is the only piece of state mutated by concurrent tasks. A
/// generation counter under the refresh mutex collapses concurrent refresh
/// requests into one remote call: waiters that observe a bumped generation
/// return without re-triggering the refresh.
pub struct CredentialStore {
    inner: RwLock<Option<Credential>>,
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
}

impl CredentialStore {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            inner: RwLock::new(credential),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Cookie header for the current credential, if any.
    pub async fn cookie_header(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(Credential::cookie_header)
    }

    /// Number of completed refreshes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Runs a refresh through the single-flight gate.
    ///
    /// `do_refresh` receives the current CSRF token and refresh token and
    /// performs the remote call. If another task completed a refresh while
    /// this one was waiting for the gate, the call returns Ok without
    /// invoking `do_refresh` again.
    pub async fn refresh_with<F, Fut>(&self, do_refresh: F) -> Result<()>
    where
        F: FnOnce(String, String) -> Fut,
        Fut: std::future::Future<Output = Result<RefreshedTokens>>,
    {
        let before = self.generation();
        let _gate = self.refresh_gate.lock().await;
        if self.generation() != before {
            tracing::debug!("credential already refreshed by a concurrent task");
            return Ok(());
        }

        let (csrf, refresh_token) = {
            let inner = self.inner.read().await;
            let credential = inner.as_ref().ok_or(HarvestError::RefreshUnavailable)?;
            if !credential.can_refresh() {
                return Err(HarvestError::RefreshUnavailable);
            }
            (credential.bili_jct.clone(), credential.ac_time_value.clone())
        };

        let tokens = do_refresh(csrf, refresh_token).await?;

        let mut inner = self.inner.write().await;
        if let Some(credential) = inner.as_mut() {
            credential.sessdata = tokens.sessdata;
            credential.bili_jct = tokens.bili_jct;
            if !tokens.refresh_token.is_empty() {
                credential.ac_time_value = tokens.refresh_token;
            }
        }
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }
}
