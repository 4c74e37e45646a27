//! Durable snapshot of the Chat Store and User Directory.
//!
//! One JSON document, replaced atomically (temp file + rename) on every
//! save. Loading never fails startup: a corrupt file is moved aside to a
//! timestamped backup and the server starts empty.

use parlor_common::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{error, info, warn};

use crate::directory::{UserDirectory, UserRecord};
use crate::error::PersistenceError;
use crate::pair::PairKey;
use crate::store::{ChatStore, Group};
use crate::util::unix_millis;

pub const DEFAULT_DATA_FILE: &str = "server_data.json";

#[derive(Serialize)]
struct PrivateChatRef<'a> {
    users: &'a PairKey,
    messages: &'a [ChatMessage],
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    private_chats: Vec<PrivateChatRef<'a>>,
    group_chats: &'a BTreeMap<String, Group>,
    user_data: &'a BTreeMap<String, UserRecord>,
}

#[derive(Deserialize)]
struct PrivateChatEntry {
    users: PairKey,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    private_chats: Vec<PrivateChatEntry>,
    #[serde(default)]
    group_chats: BTreeMap<String, Group>,
    #[serde(default)]
    user_data: BTreeMap<String, UserRecord>,
}

/// What `load` found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Missing,
    Empty,
    Loaded,
    /// The file did not decode; it was moved to `backup` when possible.
    Recovered { backup: Option<PathBuf> },
    /// The file exists but could not be read; it is left untouched.
    Unreadable,
}

#[derive(Debug, Default)]
pub struct LoadedData {
    pub chats: ChatStore,
    pub users: UserDirectory,
}

#[derive(Debug, Clone)]
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Persistence { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// `server_data.json` -> `server_data_<label>_<millis>.json`, with a
    /// `_<n>` suffix from the second attempt on.
    fn backup_name(&self, label: &str, millis: i64, attempt: u32) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".into());
        let mut name = format!("{stem}_{label}_{millis}");
        if attempt > 0 {
            name.push_str(&format!("_{attempt}"));
        }
        if let Some(ext) = self.path.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        self.path.with_file_name(name)
    }

    // first backup name not already on disk; saves and repairs run under
    // the state write lock, so nobody races for it
    async fn free_backup_path(&self, label: &str, millis: i64) -> PathBuf {
        let mut attempt = 0;
        loop {
            let candidate = self.backup_name(label, millis, attempt);
            if !fs::try_exists(&candidate).await.unwrap_or(false) {
                return candidate;
            }
            attempt += 1;
        }
    }

    pub async fn load(&self) -> (LoadedData, LoadStatus) {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no snapshot at {}, starting empty", self.path.display());
                return (LoadedData::default(), LoadStatus::Missing);
            }
            Err(e) => {
                error!("cannot read snapshot {}: {e}", self.path.display());
                return (LoadedData::default(), LoadStatus::Unreadable);
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            warn!("snapshot {} is empty, starting empty", self.path.display());
            return (LoadedData::default(), LoadStatus::Empty);
        }

        match decode(&raw) {
            Ok(data) => {
                info!(
                    "loaded {} private chats, {} groups, {} users",
                    data.chats.private_chats().len(),
                    data.chats.groups().len(),
                    data.users.len()
                );
                (data, LoadStatus::Loaded)
            }
            Err(e) => {
                error!("snapshot {} is corrupt: {e}", self.path.display());
                let backup = match self.backup("backup").await {
                    Ok(backup) => backup,
                    Err(e) => {
                        error!("could not move corrupt snapshot aside: {e}");
                        None
                    }
                };
                (LoadedData::default(), LoadStatus::Recovered { backup })
            }
        }
    }

    /// Writes the full state to a temp file, then renames it over the live
    /// snapshot. The temp file is removed on failure.
    pub async fn save(&self, chats: &ChatStore, users: &UserDirectory) -> Result<(), PersistenceError> {
        let snapshot = SnapshotRef {
            private_chats: chats
                .private_chats()
                .iter()
                .map(|(users, messages)| PrivateChatRef { users, messages })
                .collect(),
            group_chats: chats.groups(),
            user_data: users.records(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.temp_path();
        if let Err(e) = self.replace_with(&tmp, &bytes).await {
            if let Err(rm) = fs::remove_file(&tmp).await {
                if rm.kind() != ErrorKind::NotFound {
                    warn!("could not remove {}: {rm}", tmp.display());
                }
            }
            return Err(e);
        }

        info!(
            "snapshot saved: {} private chats, {} groups",
            chats.private_chats().len(),
            chats.groups().len()
        );
        Ok(())
    }

    async fn replace_with(&self, tmp: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| PersistenceError::io(dir, e))?;
        }
        let mut file = fs::File::create(tmp)
            .await
            .map_err(|e| PersistenceError::io(tmp, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| PersistenceError::io(tmp, e))?;
        file.sync_all()
            .await
            .map_err(|e| PersistenceError::io(tmp, e))?;
        drop(file);
        fs::rename(tmp, &self.path)
            .await
            .map_err(|e| PersistenceError::io(&self.path, e))
    }

    /// Moves the live snapshot to a timestamped backup. `None` when there
    /// was nothing to move.
    pub async fn backup(&self, label: &str) -> Result<Option<PathBuf>, PersistenceError> {
        let target = self.free_backup_path(label, unix_millis()).await;
        match fs::rename(&self.path, &target).await {
            Ok(()) => {
                info!("snapshot backed up to {}", target.display());
                Ok(Some(target))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(&self.path, e)),
        }
    }
}

fn decode(raw: &[u8]) -> Result<LoadedData, serde_json::Error> {
    let snapshot: Snapshot = serde_json::from_slice(raw)?;
    let mut private = BTreeMap::new();
    for entry in snapshot.private_chats {
        // two entries for the same pair (written in both orders) merge
        private
            .entry(entry.users)
            .or_insert_with(Vec::new)
            .extend(entry.messages);
    }
    Ok(LoadedData {
        chats: ChatStore::from_parts(private, snapshot.group_chats),
        users: UserDirectory::from_records(snapshot.user_data),
    })
}
