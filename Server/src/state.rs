/*
State: everything the connection tasks share. One RwLock guards the whole
aggregate, so there is a single lock to take and no ordering to get wrong.
Mutating commands keep the write guard until the snapshot is on disk,
which also serializes saves.
*/

use parlor_common::{GroupChatSummary, MemberInfo, PrivateChatSummary, ServerToClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};

use crate::directory::UserDirectory;
use crate::error::PersistenceError;
use crate::persistence::{LoadStatus, Persistence};
use crate::sessions::SessionRegistry;
use crate::store::ChatStore;

pub type Tx = mpsc::Sender<ServerToClient>;
pub type Rx = mpsc::Receiver<ServerToClient>;
pub type SharedState = Arc<RwLock<State>>;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_QUEUE: usize = 256;

#[derive(Debug)]
pub struct State {
    pub sessions: SessionRegistry,
    pub chats: ChatStore,
    pub users: UserDirectory,
    persistence: Persistence,
}

/// Counters reported by the console `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub online: usize,
    pub private_chats: usize,
    pub groups: Vec<String>,
    pub users: Vec<String>,
}

impl State {
    pub fn new(persistence: Persistence) -> Self {
        State {
            sessions: SessionRegistry::default(),
            chats: ChatStore::default(),
            users: UserDirectory::default(),
            persistence,
        }
    }

    /// Builds the state from the snapshot on disk. Never fails: see
    /// [`Persistence::load`].
    pub async fn load(persistence: Persistence) -> (Self, LoadStatus) {
        let (data, status) = persistence.load().await;
        let mut state = State::new(persistence);
        state.chats = data.chats;
        state.users = data.users;
        (state, status)
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// Saves a snapshot; failures are logged and the in-memory state
    /// stays authoritative.
    pub async fn persist(&self) -> bool {
        match self.persistence.save(&self.chats, &self.users).await {
            Ok(()) => true,
            Err(e) => {
                error!("saving snapshot failed: {e}");
                false
            }
        }
    }

    /// Operator escape hatch: back up the current snapshot, wipe chats and
    /// users, and write the empty state. Live sessions are kept.
    pub async fn repair(&mut self) -> Result<Option<PathBuf>, PersistenceError> {
        info!("repairing data");
        let backup = self.persistence.backup("repair_backup").await?;
        self.chats.clear();
        self.users.clear();
        self.persistence.save(&self.chats, &self.users).await?;
        info!("data reset to empty state");
        Ok(backup)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            online: self.sessions.len(),
            private_chats: self.chats.private_chats().len(),
            groups: self.chats.groups().keys().cloned().collect(),
            users: self.users.usernames().map(str::to_owned).collect(),
        }
    }

    /// The `chats_update` envelope describing every chat `username` is in.
    pub fn chats_update(&self, username: &str) -> ServerToClient {
        let private_chats = self
            .chats
            .private_chats_of(username)
            .filter_map(|(key, log)| {
                let other = key.other(username)?;
                Some(PrivateChatSummary {
                    user: other.to_owned(),
                    local_ip: self.users.local_address_of(other),
                    server_ip: self.users.server_address_of(other),
                    last_message: log.last().cloned(),
                })
            })
            .collect();
        let group_chats = self
            .chats
            .groups_of(username)
            .map(|(name, g)| GroupChatSummary {
                group_name: name.to_owned(),
                creator: g.creator.clone(),
                last_message: g.messages.last().cloned(),
            })
            .collect();
        ServerToClient::ChatsUpdate {
            private_chats,
            group_chats,
        }
    }

    /// Push a fresh `chats_update` to `username` if online.
    pub fn refresh_chats(&self, username: &str) {
        if self.sessions.is_online(username) {
            self.sessions.send(username, self.chats_update(username));
        }
    }

    pub fn member_info(&self, username: &str) -> MemberInfo {
        MemberInfo {
            username: username.to_owned(),
            local_ip: self.users.local_address_of(username),
            server_ip: self.users.server_address_of(username),
            online: self.sessions.is_online(username),
        }
    }
}
