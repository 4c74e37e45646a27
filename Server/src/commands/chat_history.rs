use parlor_common::{ChatType, ServerToClient};

use crate::connection::Conn;
use crate::error::PolicyViolation;
use crate::state::SharedState;
use crate::validation::validate_group_name;

pub async fn handle(
    chat_type: ChatType,
    chat_id: String,
    username: &str,
    conn: &Conn,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    let st = state.read().await;
    let history = match chat_type {
        ChatType::Private => st.chats.private_history(username, &chat_id).to_vec(),
        ChatType::Group => {
            let name = validate_group_name(&chat_id)?;
            st.chats.group_history(name, username)?.to_vec()
        }
    };
    drop(st);

    conn.reply(ServerToClient::ChatHistory {
        chat_type,
        chat_id,
        history,
    });
    Ok(())
}
