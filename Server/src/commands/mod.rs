/*
Dispatcher: one module per envelope type. Handlers return a
PolicyViolation instead of touching state when a guard fails; dispatch
turns it into an `error` envelope for the requester.
*/

use chrono::Utc;
use parlor_common::{ChatMessage, ClientToServer, ServerToClient};
use tracing::info;

use crate::connection::Conn;
use crate::error::PolicyViolation;
use crate::state::{SharedState, State};

pub mod chat_history;
pub mod create_group;
pub mod delete_group;
pub mod group_members;
pub mod group_message;
pub mod join_group;
pub mod leave_group;
pub mod ping;
pub mod private_message;
pub mod register;
pub mod rename_group;

pub async fn dispatch(msg: ClientToServer, conn: &mut Conn, state: &SharedState) {
    let kind = msg.kind();
    if let Err(violation) = route(msg, conn, state).await {
        info!("{kind} from {} refused: {violation}", conn.label());
        conn.reply(ServerToClient::error(violation.code(), violation.to_string()));
    }
}

async fn route(msg: ClientToServer, conn: &mut Conn, state: &SharedState) -> Result<(), PolicyViolation> {
    use ClientToServer::*;

    let user = match &msg {
        Register { username, local_ip } => {
            return register::handle(username.clone(), local_ip.clone(), conn, state).await;
        }
        Ping => return ping::handle(conn),
        _ => acting_user(&msg, conn)?,
    };
    let conn = &*conn;

    match msg {
        PrivateMessage {
            to,
            text,
            message_id,
            ..
        } => private_message::handle(to, text, message_id, &user, conn, state).await,
        GroupMessage { group, text, .. } => group_message::handle(group, text, &user, state).await,
        CreateGroup { group_name, .. } => create_group::handle(group_name, &user, conn, state).await,
        JoinGroup { group_name, .. } => join_group::handle(group_name, &user, conn, state).await,
        GetChatHistory {
            chat_type, chat_id, ..
        } => chat_history::handle(chat_type, chat_id, &user, conn, state).await,
        GetGroupMembers { group_name, .. } => group_members::handle(group_name, &user, conn, state).await,
        RenameGroup {
            group_name,
            new_name,
            ..
        } => rename_group::handle(group_name, new_name, &user, state).await,
        DeleteGroup { group_name, .. } => delete_group::handle(group_name, &user, state).await,
        LeaveGroup { group_name, .. } => leave_group::handle(group_name, &user, conn, state).await,
        Register { .. } | Ping => Ok(()),
    }
}

/// The registered user of this connection, checked against any identity
/// the envelope claims.
fn acting_user(msg: &ClientToServer, conn: &Conn) -> Result<String, PolicyViolation> {
    let registered = conn.username().ok_or(PolicyViolation::NotRegistered)?;
    if let Some(claimed) = msg.claimed_identity() {
        if claimed != registered {
            return Err(PolicyViolation::IdentityMismatch {
                registered: registered.to_owned(),
                claimed: claimed.to_owned(),
            });
        }
    }
    Ok(registered.to_owned())
}

/// New message from `from`, with the sender's addresses as the directory
/// knows them and the server's clock.
fn stamp(st: &State, from: &str, text: String) -> ChatMessage {
    ChatMessage {
        from: from.to_owned(),
        local_ip: st.users.local_address_of(from),
        server_ip: st.users.server_address_of(from),
        text,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Persistence;
    use crate::state::{Rx, OUTBOUND_QUEUE};
    use parlor_common::{ChatType, ErrorCode};
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Client {
        conn: Conn,
        rx: Rx,
    }

    impl Client {
        fn new(ip: &str) -> Self {
            let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
            Client {
                conn: Conn::new(Uuid::new_v4(), ip.into(), tx),
                rx,
            }
        }

        async fn send(&mut self, state: &SharedState, msg: ClientToServer) {
            dispatch(msg, &mut self.conn, state).await;
        }

        async fn register(&mut self, state: &SharedState, name: &str) {
            self.send(
                state,
                ClientToServer::Register {
                    username: name.into(),
                    local_ip: Some(format!("192.168.0.{}", name.len())),
                },
            )
            .await;
            self.drain();
        }

        fn drain(&mut self) -> Vec<ServerToClient> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }

        fn last_error(&mut self) -> Option<ErrorCode> {
            self.drain().into_iter().rev().find_map(|m| match m {
                ServerToClient::Error { code, .. } => Some(code),
                _ => None,
            })
        }
    }

    fn setup() -> (TempDir, SharedState) {
        let dir = tempdir().unwrap();
        let state = State::new(Persistence::new(dir.path().join("data.json"))).into_shared();
        (dir, state)
    }

    fn create(name: &str) -> ClientToServer {
        ClientToServer::CreateGroup {
            group_name: name.into(),
            creator: None,
        }
    }

    fn join(name: &str) -> ClientToServer {
        ClientToServer::JoinGroup {
            group_name: name.into(),
            username: None,
        }
    }

    fn group_msg(group: &str, text: &str) -> ClientToServer {
        ClientToServer::GroupMessage {
            group: group.into(),
            text: text.into(),
            from: None,
        }
    }

    fn history(chat_type: ChatType, chat_id: &str) -> ClientToServer {
        ClientToServer::GetChatHistory {
            chat_type,
            chat_id: chat_id.into(),
            username: None,
        }
    }

    fn history_of(msgs: Vec<ServerToClient>) -> Vec<ChatMessage> {
        msgs.into_iter()
            .find_map(|m| match m {
                ServerToClient::ChatHistory { history, .. } => Some(history),
                _ => None,
            })
            .expect("no chat_history envelope")
    }

    #[tokio::test]
    async fn register_assigns_ip_and_sends_chats() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.7");
        alice
            .send(
                &state,
                ClientToServer::Register {
                    username: "alice".into(),
                    local_ip: Some("192.168.1.2".into()),
                },
            )
            .await;

        let out = alice.drain();
        assert_eq!(
            out[0],
            ServerToClient::ServerIpAssigned {
                server_ip: "10.0.0.7".into()
            }
        );
        assert!(matches!(out[1], ServerToClient::ChatsUpdate { .. }));

        let st = state.read().await;
        assert!(st.sessions.is_online("alice"));
        assert_eq!(st.users.local_address_of("alice").as_deref(), Some("192.168.1.2"));
        assert_eq!(st.users.server_address_of("alice").as_deref(), Some("10.0.0.7"));
        assert!(st.persistence().path().exists());
    }

    #[tokio::test]
    async fn unregistered_connection_is_refused() {
        let (_dir, state) = setup();
        let mut anon = Client::new("10.0.0.1");
        anon.send(&state, create("team")).await;
        assert_eq!(anon.last_error(), Some(ErrorCode::NotRegistered));
        assert!(state.read().await.chats.groups().is_empty());

        anon.send(&state, ClientToServer::Ping).await;
        assert_eq!(anon.drain(), vec![ServerToClient::Pong]);
    }

    #[tokio::test]
    async fn claimed_identity_must_match_session() {
        let (_dir, state) = setup();
        let mut bob = Client::new("10.0.0.2");
        bob.register(&state, "bob").await;
        bob.send(
            &state,
            ClientToServer::CreateGroup {
                group_name: "team".into(),
                creator: Some("alice".into()),
            },
        )
        .await;
        assert_eq!(bob.last_error(), Some(ErrorCode::IdentityMismatch));
        assert!(state.read().await.chats.groups().is_empty());
    }

    #[tokio::test]
    async fn group_scenario() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        let mut bob = Client::new("10.0.0.2");
        alice.register(&state, "alice").await;
        bob.register(&state, "bob").await;

        alice.send(&state, create("team")).await;
        let out = alice.drain();
        assert_eq!(
            out[0],
            ServerToClient::GroupCreated {
                group_name: "team".into()
            }
        );
        assert!(matches!(&out[1], ServerToClient::ChatsUpdate { group_chats, .. } if group_chats.len() == 1));

        bob.send(&state, join("team")).await;
        let out = bob.drain();
        assert_eq!(
            out[0],
            ServerToClient::GroupJoined {
                group_name: "team".into()
            }
        );
        {
            let st = state.read().await;
            let members: Vec<_> = st.chats.group("team").unwrap().members.iter().cloned().collect();
            assert_eq!(members, ["alice", "bob"]);
        }

        alice.send(&state, group_msg("team", "hi")).await;
        let received = bob.drain();
        match &received[..] {
            [ServerToClient::GroupMessage { group, message }] => {
                assert_eq!(group, "team");
                assert_eq!(message.from, "alice");
                assert_eq!(message.text, "hi");
                assert_eq!(message.server_ip.as_deref(), Some("10.0.0.1"));
            }
            other => panic!("unexpected {other:?}"),
        }
        // the sender gets its own copy too
        assert_eq!(alice.drain().len(), 1);

        bob.send(&state, history(ChatType::Group, "team")).await;
        let log = history_of(bob.drain());
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].text, "hi");
        assert_eq!(log[0].from, "alice");
    }

    #[tokio::test]
    async fn non_member_cannot_post() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        let mut eve = Client::new("10.0.0.9");
        alice.register(&state, "alice").await;
        eve.register(&state, "eve").await;
        alice.send(&state, create("team")).await;
        alice.drain();

        eve.send(&state, group_msg("team", "spam")).await;
        assert_eq!(eve.last_error(), Some(ErrorCode::NotMember));
        assert!(alice.drain().is_empty());
        assert!(state.read().await.chats.group("team").unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn private_messages_reach_recipient_and_ack_sender() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        let mut bob = Client::new("10.0.0.2");
        alice.register(&state, "alice").await;
        bob.register(&state, "bob").await;

        alice
            .send(
                &state,
                ClientToServer::PrivateMessage {
                    to: "bob".into(),
                    text: "hello".into(),
                    from: Some("alice".into()),
                    message_id: Some(serde_json::json!("m-1")),
                },
            )
            .await;

        let to_bob = bob.drain();
        assert!(matches!(&to_bob[0], ServerToClient::PrivateMessage { message } if message.text == "hello"));
        assert!(matches!(&to_bob[1], ServerToClient::ChatsUpdate { private_chats, .. }
            if private_chats.len() == 1 && private_chats[0].user == "alice"));

        let to_alice = alice.drain();
        assert!(matches!(&to_alice[..], [ServerToClient::MessageSent { message_id: Some(id), .. }] if id == "m-1"));

        bob.send(
            &state,
            ClientToServer::PrivateMessage {
                to: "alice".into(),
                text: "hey".into(),
                from: None,
                message_id: None,
            },
        )
        .await;
        bob.drain();
        alice.drain();

        alice.send(&state, history(ChatType::Private, "bob")).await;
        let from_alice = history_of(alice.drain());
        bob.send(&state, history(ChatType::Private, "alice")).await;
        let from_bob = history_of(bob.drain());
        assert_eq!(from_alice, from_bob);
        assert_eq!(from_alice.len(), 2);

        // idempotent reads
        bob.send(&state, history(ChatType::Private, "alice")).await;
        assert_eq!(history_of(bob.drain()), from_bob);
    }

    #[tokio::test]
    async fn offline_recipient_still_gets_history() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        alice.register(&state, "alice").await;
        alice
            .send(
                &state,
                ClientToServer::PrivateMessage {
                    to: "dave".into(),
                    text: "are you there?".into(),
                    from: None,
                    message_id: None,
                },
            )
            .await;
        assert!(matches!(&alice.drain()[..], [ServerToClient::MessageSent { .. }]));

        let st = state.read().await;
        assert_eq!(st.chats.private_history("dave", "alice").len(), 1);
        match st.chats_update("alice") {
            ServerToClient::ChatsUpdate { private_chats, .. } => {
                assert_eq!(private_chats[0].user, "dave");
                assert_eq!(private_chats[0].server_ip, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn rename_keeps_log_and_members() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        let mut bob = Client::new("10.0.0.2");
        alice.register(&state, "alice").await;
        bob.register(&state, "bob").await;
        alice.send(&state, create("team")).await;
        bob.send(&state, join("team")).await;
        alice.send(&state, group_msg("team", "hi")).await;
        alice.drain();
        bob.drain();

        bob.send(
            &state,
            ClientToServer::RenameGroup {
                group_name: "team".into(),
                new_name: "squad".into(),
                username: None,
            },
        )
        .await;
        assert_eq!(bob.last_error(), Some(ErrorCode::NotCreator));

        alice
            .send(
                &state,
                ClientToServer::RenameGroup {
                    group_name: "team".into(),
                    new_name: "squad".into(),
                    username: Some("alice".into()),
                },
            )
            .await;
        for client in [&mut alice, &mut bob] {
            let out = client.drain();
            assert!(matches!(&out[..], [ServerToClient::ChatsUpdate { group_chats, .. }]
                if group_chats[0].group_name == "squad"));
        }

        bob.send(&state, history(ChatType::Group, "squad")).await;
        assert_eq!(history_of(bob.drain()).len(), 1);
        bob.send(&state, history(ChatType::Group, "team")).await;
        assert!(history_of(bob.drain()).is_empty());

        let st = state.read().await;
        assert_eq!(st.chats.group("squad").unwrap().members.len(), 2);
    }

    #[tokio::test]
    async fn delete_by_creator_only() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        let mut bob = Client::new("10.0.0.2");
        alice.register(&state, "alice").await;
        bob.register(&state, "bob").await;
        alice.send(&state, create("team")).await;
        bob.send(&state, join("team")).await;
        alice.drain();
        bob.drain();

        let delete = |who: Option<&str>| ClientToServer::DeleteGroup {
            group_name: "team".into(),
            username: who.map(str::to_owned),
        };

        let before = state.read().await.chats.clone();
        bob.send(&state, delete(None)).await;
        assert_eq!(bob.last_error(), Some(ErrorCode::NotCreator));
        assert_eq!(state.read().await.chats, before);

        alice.send(&state, delete(Some("alice"))).await;
        assert!(matches!(&bob.drain()[..], [ServerToClient::ChatsUpdate { group_chats, .. }] if group_chats.is_empty()));
        assert!(state.read().await.chats.group("team").is_none());

        bob.send(&state, group_msg("team", "anyone?")).await;
        assert_eq!(bob.last_error(), Some(ErrorCode::GroupNotFound));
        bob.send(
            &state,
            ClientToServer::GetGroupMembers {
                group_name: "team".into(),
                username: None,
            },
        )
        .await;
        assert_eq!(bob.last_error(), Some(ErrorCode::GroupNotFound));
    }

    #[tokio::test]
    async fn leave_and_creator_guard() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        let mut bob = Client::new("10.0.0.2");
        alice.register(&state, "alice").await;
        bob.register(&state, "bob").await;
        alice.send(&state, create("team")).await;
        bob.send(&state, join("team")).await;
        alice.drain();
        bob.drain();

        let leave = ClientToServer::LeaveGroup {
            group_name: "team".into(),
            username: None,
        };
        alice.send(&state, leave.clone()).await;
        assert_eq!(alice.last_error(), Some(ErrorCode::CreatorCannotLeave));

        bob.send(&state, leave.clone()).await;
        assert!(matches!(&bob.drain()[..], [ServerToClient::ChatsUpdate { group_chats, .. }] if group_chats.is_empty()));
        bob.send(&state, leave).await;
        assert_eq!(bob.last_error(), Some(ErrorCode::NotMember));

        let st = state.read().await;
        let members: Vec<_> = st.chats.group("team").unwrap().members.iter().cloned().collect();
        assert_eq!(members, ["alice"]);
    }

    #[tokio::test]
    async fn members_listing_includes_addresses() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        let mut bob = Client::new("10.0.0.2");
        alice.register(&state, "alice").await;
        bob.register(&state, "bob").await;
        alice.send(&state, create("team")).await;
        bob.send(&state, join("team")).await;
        alice.drain();
        bob.drain();

        let ask = ClientToServer::GetGroupMembers {
            group_name: "team".into(),
            username: None,
        };
        alice.send(&state, ask.clone()).await;
        match &alice.drain()[..] {
            [ServerToClient::GroupMembers { group_name, members }] => {
                assert_eq!(group_name, "team");
                assert_eq!(members.len(), 2);
                assert_eq!(members[1].username, "bob");
                assert_eq!(members[1].server_ip.as_deref(), Some("10.0.0.2"));
                assert!(members[1].online);
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut eve = Client::new("10.0.0.9");
        eve.register(&state, "eve").await;
        eve.send(&state, ask).await;
        assert_eq!(eve.last_error(), Some(ErrorCode::NotMember));
    }

    #[tokio::test]
    async fn duplicate_group_and_bad_names() {
        let (_dir, state) = setup();
        let mut alice = Client::new("10.0.0.1");
        alice.register(&state, "alice").await;
        alice.send(&state, create("team")).await;
        alice.drain();
        alice.send(&state, create("team")).await;
        assert_eq!(alice.last_error(), Some(ErrorCode::GroupExists));
        alice.send(&state, create("   ")).await;
        assert_eq!(alice.last_error(), Some(ErrorCode::InvalidName));
        alice.send(&state, group_msg("team", "  ")).await;
        assert_eq!(alice.last_error(), Some(ErrorCode::EmptyMessage));

        let mut nobody = Client::new("10.0.0.3");
        nobody
            .send(
                &state,
                ClientToServer::Register {
                    username: "has space".into(),
                    local_ip: None,
                },
            )
            .await;
        assert_eq!(nobody.last_error(), Some(ErrorCode::InvalidName));
        assert!(nobody.conn.username().is_none());
    }

    #[tokio::test]
    async fn same_username_twice_keeps_one_session() {
        let (_dir, state) = setup();
        let mut first = Client::new("10.0.0.1");
        let mut second = Client::new("10.0.0.2");
        first.register(&state, "carol").await;
        second.register(&state, "carol").await;

        let st = state.read().await;
        assert_eq!(st.sessions.len(), 1);
        assert_eq!(st.sessions.lookup("carol").unwrap().conn_id, second.conn.id);
        assert_eq!(st.users.server_address_of("carol").as_deref(), Some("10.0.0.2"));
    }

    #[tokio::test]
    async fn reregistering_under_new_name_releases_old_one() {
        let (_dir, state) = setup();
        let mut client = Client::new("10.0.0.1");
        client.register(&state, "old").await;
        client.register(&state, "new").await;

        let st = state.read().await;
        assert!(!st.sessions.is_online("old"));
        assert!(st.sessions.is_online("new"));
        assert_eq!(client.conn.username(), Some("new"));
    }
}
