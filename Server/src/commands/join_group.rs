use parlor_common::ServerToClient;
use tracing::info;

use crate::connection::Conn;
use crate::error::PolicyViolation;
use crate::state::SharedState;
use crate::validation::validate_group_name;

pub async fn handle(
    group_name: String,
    username: &str,
    conn: &Conn,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    let name = validate_group_name(&group_name)?;

    let mut st = state.write().await;
    st.chats.join_group(name, username)?;
    info!("{username} joined group {name}");

    st.persist().await;

    conn.reply(ServerToClient::GroupJoined {
        group_name: name.to_owned(),
    });
    conn.reply(st.chats_update(username));
    Ok(())
}
