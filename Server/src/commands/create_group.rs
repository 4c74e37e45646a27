use parlor_common::ServerToClient;
use tracing::info;

use crate::connection::Conn;
use crate::error::PolicyViolation;
use crate::state::SharedState;
use crate::validation::validate_group_name;

pub async fn handle(
    group_name: String,
    creator: &str,
    conn: &Conn,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    let name = validate_group_name(&group_name)?;

    let mut st = state.write().await;
    st.chats.create_group(name, creator)?;
    info!("group {name} created by {creator}");

    st.persist().await;

    conn.reply(ServerToClient::GroupCreated {
        group_name: name.to_owned(),
    });
    conn.reply(st.chats_update(creator));
    Ok(())
}
