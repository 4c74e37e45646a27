use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Network identity of a user as of their last registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Address the client reported for itself.
    pub local_ip: Option<String>,
    /// Address the server observed on the connection.
    pub server_ip: String,
    pub last_seen: DateTime<Utc>,
}

/// Username -> last known addresses. Records outlive the session so that
/// history views can still show addresses for offline senders.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UserDirectory {
    users: BTreeMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn from_records(users: BTreeMap<String, UserRecord>) -> Self {
        UserDirectory { users }
    }

    pub fn records(&self) -> &BTreeMap<String, UserRecord> {
        &self.users
    }

    pub fn record_registration(
        &mut self,
        username: &str,
        local_ip: Option<String>,
        server_ip: impl Into<String>,
    ) {
        self.users.insert(
            username.to_owned(),
            UserRecord {
                local_ip,
                server_ip: server_ip.into(),
                last_seen: Utc::now(),
            },
        );
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    /// `None` means unknown: never registered, or registered without
    /// reporting a local address.
    pub fn local_address_of(&self, username: &str) -> Option<String> {
        self.users.get(username).and_then(|r| r.local_ip.clone())
    }

    /// `None` means the user never registered.
    pub fn server_address_of(&self, username: &str) -> Option<String> {
        self.users.get(username).map(|r| r.server_ip.clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
