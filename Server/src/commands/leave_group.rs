/*
Removes the requester from a group. The creator has to delete the group
instead of leaving it.
*/

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
    st.chats.leave_group(name, username)?;
    info!("{username} left group {name}");

    st.persist().await;

    conn.reply(st.chats_update(username));
    Ok(())
}
