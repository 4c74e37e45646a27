/*
Appends a message to a group the sender belongs to and fans it out to every
online member, the sender included. Each member has its own outbound queue,
so a slow member only delays itself.
*/

use parlor_common::ServerToClient;
use tracing::info;

use super::stamp;
use crate::error::PolicyViolation;
use crate::state::SharedState;
use crate::util::preview;
use crate::validation::{validate_group_name, validate_text};

pub async fn handle(
    group: String,
    text: String,
    from: &str,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    let name = validate_group_name(&group)?;
    validate_text(&text)?;

    let mut st = state.write().await;
    let message = stamp(&st, from, text);
    let members: Vec<String> = st
        .chats
        .append_group_message(name, from, message.clone())?
        .members
        .iter()
        .cloned()
        .collect();
    info!("group message {from} -> {name}: {}", preview(&message.text));

    st.persist().await;

    for member in &members {
        st.sessions.send(
            member,
            ServerToClient::GroupMessage {
                group: name.to_owned(),
                message: message.clone(),
            },
        );
    }
    Ok(())
}
