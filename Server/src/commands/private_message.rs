/*
Appends to the private conversation of the pair, forwards to the recipient
when online and acknowledges the sender. Offline recipients find the
message in their history later.
*/

use parlor_common::ServerToClient;
use serde_json::Value;
use tracing::info;

use super::stamp;
use crate::connection::Conn;
use crate::error::PolicyViolation;
use crate::state::SharedState;
use crate::util::preview;
use crate::validation::{validate_text, validate_username};

pub async fn handle(
    to: String,
    text: String,
    message_id: Option<Value>,
    from: &str,
    conn: &Conn,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    validate_username(&to)?;
    validate_text(&text)?;

    let mut st = state.write().await;
    let message = stamp(&st, from, text);
    st.chats.append_private(from, &to, message.clone());
    info!("private message {from} -> {to}: {}", preview(&message.text));

    st.persist().await;

    let timestamp = message.timestamp;
    if st.sessions.send(&to, ServerToClient::PrivateMessage { message }) {
        st.refresh_chats(&to);
    }
    conn.reply(ServerToClient::MessageSent {
        message_id,
        timestamp,
    });
    Ok(())
}
