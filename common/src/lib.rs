//! Wire protocol shared by the parlor server and its clients.
//!
//! Envelopes travel as NDJSON: one JSON object per line, discriminated by
//! the `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest accepted envelope line, in bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// A single chat message, as stored in history and as forwarded to peers.
///
/// Addresses are `None` when the sender has never registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from: String,
    pub local_ip: Option<String>,
    pub server_ip: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Private,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateChatSummary {
    pub user: String,
    pub local_ip: Option<String>,
    pub server_ip: Option<String>,
    pub last_message: Option<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChatSummary {
    pub group_name: String,
    pub creator: String,
    pub last_message: Option<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub username: String,
    pub local_ip: Option<String>,
    pub server_ip: Option<String>,
    pub online: bool,
}

/// Requests sent by a client.
///
/// The identity fields (`from`, `creator`, `username`) are optional: the
/// server acts as the registered session user and only checks that a
/// claimed identity, when present, matches it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientToServer {
    Register {
        username: String,
        #[serde(default)]
        local_ip: Option<String>,
    },
    PrivateMessage {
        to: String,
        text: String,
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        message_id: Option<Value>,
    },
    GroupMessage {
        group: String,
        text: String,
        #[serde(default)]
        from: Option<String>,
    },
    CreateGroup {
        group_name: String,
        #[serde(default)]
        creator: Option<String>,
    },
    JoinGroup {
        group_name: String,
        #[serde(default)]
        username: Option<String>,
    },
    GetChatHistory {
        chat_type: ChatType,
        chat_id: String,
        #[serde(default)]
        username: Option<String>,
    },
    GetGroupMembers {
        group_name: String,
        #[serde(default)]
        username: Option<String>,
    },
    RenameGroup {
        group_name: String,
        new_name: String,
        #[serde(default)]
        username: Option<String>,
    },
    DeleteGroup {
        group_name: String,
        #[serde(default)]
        username: Option<String>,
    },
    LeaveGroup {
        group_name: String,
        #[serde(default)]
        username: Option<String>,
    },
    Ping,
}

impl ClientToServer {
    /// Every `type` tag a client may send.
    pub const TYPES: &'static [&'static str] = &[
        "register",
        "private_message",
        "group_message",
        "create_group",
        "join_group",
        "get_chat_history",
        "get_group_members",
        "rename_group",
        "delete_group",
        "leave_group",
        "ping",
    ];

    pub fn kind(&self) -> &'static str {
        use ClientToServer::*;
        match self {
            Register { .. } => "register",
            PrivateMessage { .. } => "private_message",
            GroupMessage { .. } => "group_message",
            CreateGroup { .. } => "create_group",
            JoinGroup { .. } => "join_group",
            GetChatHistory { .. } => "get_chat_history",
            GetGroupMembers { .. } => "get_group_members",
            RenameGroup { .. } => "rename_group",
            DeleteGroup { .. } => "delete_group",
            LeaveGroup { .. } => "leave_group",
            Ping => "ping",
        }
    }

    /// The identity the client says it is acting as, if it sent one.
    pub fn claimed_identity(&self) -> Option<&str> {
        use ClientToServer::*;
        match self {
            PrivateMessage { from, .. } | GroupMessage { from, .. } => from.as_deref(),
            CreateGroup { creator, .. } => creator.as_deref(),
            JoinGroup { username, .. }
            | GetChatHistory { username, .. }
            | GetGroupMembers { username, .. }
            | RenameGroup { username, .. }
            | DeleteGroup { username, .. }
            | LeaveGroup { username, .. } => username.as_deref(),
            Register { .. } | Ping => None,
        }
    }
}

/// Responses and broadcasts sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerToClient {
    ServerIpAssigned {
        server_ip: String,
    },
    ChatsUpdate {
        private_chats: Vec<PrivateChatSummary>,
        group_chats: Vec<GroupChatSummary>,
    },
    PrivateMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },
    MessageSent {
        message_id: Option<Value>,
        timestamp: DateTime<Utc>,
    },
    GroupMessage {
        group: String,
        #[serde(flatten)]
        message: ChatMessage,
    },
    GroupCreated {
        group_name: String,
    },
    GroupJoined {
        group_name: String,
    },
    ChatHistory {
        chat_type: ChatType,
        chat_id: String,
        history: Vec<ChatMessage>,
    },
    GroupMembers {
        group_name: String,
        members: Vec<MemberInfo>,
    },
    Error {
        code: ErrorCode,
        reason: String,
    },
    Pong,
}

impl ServerToClient {
    pub fn error(code: ErrorCode, reason: impl Into<String>) -> Self {
        ServerToClient::Error {
            code,
            reason: reason.into(),
        }
    }
}

/// Machine-readable classification carried by `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedEnvelope,
    UnsupportedType,
    NotRegistered,
    InvalidName,
    EmptyMessage,
    IdentityMismatch,
    GroupNotFound,
    GroupExists,
    NotCreator,
    NotMember,
    AlreadyMember,
    CreatorCannotLeave,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("envelope has no type tag")]
    MissingType,
    #[error("unsupported envelope type '{0}'")]
    UnsupportedType(String),
    #[error("envelope exceeds the maximum line length")]
    FrameTooLong,
}

impl ProtocolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::UnsupportedType(_) => ErrorCode::UnsupportedType,
            _ => ErrorCode::MalformedEnvelope,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Parse one NDJSON line into a request, telling apart bad JSON, a
/// missing tag and a tag this server does not know.
pub fn parse_envelope(line: &str) -> Result<ClientToServer> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let tag = match value.get("type") {
        Some(Value::String(tag)) => tag.clone(),
        _ => return Err(ProtocolError::MissingType),
    };
    if !ClientToServer::TYPES.contains(&tag.as_str()) {
        return Err(ProtocolError::UnsupportedType(tag));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
