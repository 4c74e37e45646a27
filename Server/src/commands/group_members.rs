use parlor_common::ServerToClient;
use tracing::debug;

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

    let st = state.read().await;
    let members = st
        .chats
        .list_members(name, username)?
        .iter()
        .map(|m| st.member_info(m))
        .collect();
    debug!("{username} listed members of {name}");

    conn.reply(ServerToClient::GroupMembers {
        group_name: name.to_owned(),
        members,
    });
    Ok(())
}
