//! Per-subject credential storage
//!
//! Maps a subject id (the provider's numeric user id) to the bearer token and
//! the profile snapshot taken at authorization time. The most recent
//! authorization for a subject overwrites any earlier one.
//!
//! The store is in-memory by default. When constructed with `load`, every
//! mutation is also written to a JSON file using atomic temp-file + rename so
//! sessions survive a restart. A tokio Mutex serializes mutations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Stable numeric identifier of a user at the provider.
pub type SubjectId = u64;

/// A subject's bearer token and cached profile.
///
/// `Debug` output redacts the token.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: Secret<String>,
    /// Profile exactly as the provider returned it; opaque to this layer
    pub profile: Value,
}

/// On-disk shape of one credential.
#[derive(Deserialize)]
struct StoredCredential {
    access_token: String,
    profile: Value,
}

#[derive(Serialize)]
struct StoredCredentialRef<'a> {
    access_token: &'a str,
    profile: &'a Value,
}

pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<HashMap<SubjectId, Credential>>,
}

impl CredentialStore {
    /// Empty store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Load credentials from the given file path and persist every change
    /// back to it.
    ///
    /// If the file doesn't exist, creates it as `{}`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let stored: HashMap<SubjectId, StoredCredential> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), subjects = stored.len(), "loaded credentials");
            stored
                .into_iter()
                .map(|(subject_id, stored)| {
                    (
                        subject_id,
                        Credential {
                            access_token: Secret::new(stored.access_token),
                            profile: stored.profile,
                        },
                    )
                })
                .collect()
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            let state = HashMap::new();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Clone of the credential for `subject_id`, if one is stored.
    pub async fn get(&self, subject_id: SubjectId) -> Option<Credential> {
        let state = self.state.lock().await;
        state.get(&subject_id).cloned()
    }

    /// Insert or replace the credential for `subject_id`.
    ///
    /// If the file write fails the previous credential (or its absence) is
    /// restored, so memory never holds what the file does not.
    pub async fn put(
        &self,
        subject_id: SubjectId,
        access_token: Secret<String>,
        profile: Value,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let previous = state.insert(
            subject_id,
            Credential {
                access_token,
                profile,
            },
        );
        if let Err(e) = self.persist(&state).await {
            match previous {
                Some(credential) => state.insert(subject_id, credential),
                None => state.remove(&subject_id),
            };
            warn!(subject_id, error = %e, "credential not stored, write failed");
            return Err(e);
        }
        debug!(subject_id, replaced = previous.is_some(), "stored credential");
        Ok(())
    }

    /// Revoke the credential for `subject_id`.
    ///
    /// Returns the removed credential if it existed. A failed file write
    /// leaves the credential in place.
    pub async fn remove(&self, subject_id: SubjectId) -> Result<Option<Credential>> {
        let mut state = self.state.lock().await;
        let Some(removed) = state.remove(&subject_id) else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&state).await {
            state.insert(subject_id, removed);
            warn!(subject_id, error = %e, "credential not removed, write failed");
            return Err(e);
        }
        debug!(subject_id, "removed credential");
        Ok(Some(removed))
    }

    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    async fn persist(&self, state: &HashMap<SubjectId, Credential>) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, state).await,
            None => Ok(()),
        }
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 since the file contains
/// bearer tokens.
async fn write_atomic(path: &Path, state: &HashMap<SubjectId, Credential>) -> Result<()> {
    let stored: HashMap<SubjectId, StoredCredentialRef<'_>> = state
        .iter()
        .map(|(subject_id, credential)| {
            (
                *subject_id,
                StoredCredentialRef {
                    access_token: credential.access_token.expose(),
                    profile: &credential.profile,
                },
            )
        })
        .collect();
    let json = serde_json::to_string_pretty(&stored)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn profile(id: u64, login: &str) -> Value {
        json!({"id": id, "login": login, "avatar_url": format!("https://avatars.example/{id}")})
    }

    #[tokio::test]
    async fn put_then_get_returns_token_and_profile() {
        let store = CredentialStore::in_memory();
        store
            .put(42, Secret::from("tok_1"), profile(42, "alice"))
            .await
            .unwrap();

        let credential = store.get(42).await.unwrap();
        assert_eq!(credential.access_token.expose(), "tok_1");
        assert_eq!(credential.profile, profile(42, "alice"));
        assert!(store.get(7).await.is_none());
        assert!(!store.is_persistent());
    }

    #[tokio::test]
    async fn latest_authorization_overwrites() {
        let store = CredentialStore::in_memory();
        store
            .put(42, Secret::from("tok_old"), profile(42, "alice"))
            .await
            .unwrap();
        store
            .put(42, Secret::from("tok_new"), profile(42, "alice-renamed"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let credential = store.get(42).await.unwrap();
        assert_eq!(credential.access_token.expose(), "tok_new");
        assert_eq!(credential.profile["login"], "alice-renamed");
    }

    #[tokio::test]
    async fn remove_revokes_credential() {
        let store = CredentialStore::in_memory();
        store
            .put(1, Secret::from("tok_1"), profile(1, "a"))
            .await
            .unwrap();
        store
            .put(2, Secret::from("tok_2"), profile(2, "b"))
            .await
            .unwrap();

        let removed = store.remove(1).await.unwrap();
        assert!(removed.is_some());
        assert!(store.get(1).await.is_none());
        assert!(store.get(2).await.is_some());
        assert_eq!(store.len().await, 1);

        assert!(store.remove(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credential_debug_does_not_leak_token() {
        let store = CredentialStore::in_memory();
        store
            .put(42, Secret::from("gho_supersecret"), profile(42, "alice"))
            .await
            .unwrap();
        let debug = format!("{:?}", store.get(42).await.unwrap());
        assert!(!debug.contains("gho_supersecret"), "got: {debug}");
        assert!(debug.contains("alice"));
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        assert!(store.is_persistent());
        store
            .put(42, Secret::from("tok_1"), profile(42, "alice"))
            .await
            .unwrap();

        let reloaded = CredentialStore::load(path).await.unwrap();
        let credential = reloaded.get(42).await.unwrap();
        assert_eq!(credential.access_token.expose(), "tok_1");
        assert_eq!(credential.profile["login"], "alice");
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        assert!(!path.exists());
        let store = CredentialStore::load(path.clone()).await.unwrap();
        assert!(store.is_empty().await);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed, json!({}));
    }

    #[tokio::test]
    async fn revocation_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        store
            .put(42, Secret::from("tok_1"), profile(42, "alice"))
            .await
            .unwrap();
        store.remove(42).await.unwrap();

        let reloaded = CredentialStore::load(path).await.unwrap();
        assert!(reloaded.is_empty().await);
    }

    /// Store whose backing directory has been removed after `load`, so every
    /// later write fails.
    async fn store_with_vanished_dir() -> (tempfile::TempDir, PathBuf, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        tokio::fs::create_dir(&sub).await.unwrap();
        let path = sub.join("credentials.json");
        let store = CredentialStore::load(path.clone()).await.unwrap();
        (dir, sub, store)
    }

    #[tokio::test]
    async fn failed_write_does_not_store_credential() {
        let (_dir, sub, store) = store_with_vanished_dir().await;
        store
            .put(7, Secret::from("tok_7"), profile(7, "bob"))
            .await
            .unwrap();
        tokio::fs::remove_dir_all(&sub).await.unwrap();

        let result = store
            .put(42, Secret::from("tok_1"), profile(42, "alice"))
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(store.get(42).await.is_none());

        let result = store
            .put(7, Secret::from("tok_7b"), profile(7, "bob-renamed"))
            .await;
        assert!(result.is_err());
        let kept = store.get(7).await.unwrap();
        assert_eq!(kept.access_token.expose(), "tok_7");
        assert_eq!(kept.profile["login"], "bob");
    }

    #[tokio::test]
    async fn failed_write_keeps_credential_on_remove() {
        let (_dir, sub, store) = store_with_vanished_dir().await;
        store
            .put(42, Secret::from("tok_1"), profile(42, "alice"))
            .await
            .unwrap();
        tokio::fs::remove_dir_all(&sub).await.unwrap();

        let result = store.remove(42).await;
        assert!(matches!(result, Err(Error::Io(_))));
        let kept = store.get(42).await.unwrap();
        assert_eq!(kept.access_token.expose(), "tok_1");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let result = CredentialStore::load(path).await;
        assert!(matches!(result, Err(Error::CredentialParse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = CredentialStore::load(path.clone()).await.unwrap();
        store
            .put(42, Secret::from("tok_1"), profile(42, "alice"))
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let store = Arc::new(CredentialStore::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put(i, Secret::new(format!("tok_{i}")), profile(i, "user"))
                    .await
                    .unwrap();
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.len().await, 10);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: HashMap<String, Value> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 10);
    }
}
