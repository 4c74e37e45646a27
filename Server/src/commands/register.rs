/*
Registers the connection under a username: records the addresses in the
user directory, installs the session (last writer wins) and sends back the
observed address plus the user's chat list.
*/

use parlor_common::ServerToClient;
use tracing::{info, warn};

use crate::connection::Conn;
use crate::error::PolicyViolation;
use crate::sessions::SessionHandle;
use crate::state::SharedState;
use crate::validation::validate_username;

pub async fn handle(
    username: String,
    local_ip: Option<String>,
    conn: &mut Conn,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    validate_username(&username)?;

    let mut st = state.write().await;

    // same connection switching names: drop the old binding first
    if let Some(previous) = conn.username().filter(|p| *p != username) {
        st.sessions.remove(previous, conn.id);
    }

    let replaced = st.sessions.register(
        &username,
        SessionHandle {
            conn_id: conn.id,
            tx: conn.tx.clone(),
        },
    );
    if replaced.is_some_and(|old| old.conn_id != conn.id) {
        warn!("{username} registered from another connection, previous session replaced");
    }

    st.users
        .record_registration(&username, local_ip.clone(), conn.peer_ip.clone());
    info!(
        "user {username} registered (local {}, server {})",
        local_ip.as_deref().unwrap_or("unknown"),
        conn.peer_ip
    );
    conn.set_username(username.clone());

    st.persist().await;

    conn.reply(ServerToClient::ServerIpAssigned {
        server_ip: conn.peer_ip.clone(),
    });
    conn.reply(st.chats_update(&username));
    Ok(())
}
