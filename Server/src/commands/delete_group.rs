use tracing::info;

use crate::error::PolicyViolation;
use crate::state::SharedState;
use crate::validation::validate_group_name;

pub async fn handle(
    group_name: String,
    username: &str,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    let name = validate_group_name(&group_name)?;

    let mut st = state.write().await;
    let removed = st.chats.delete_group(name, username)?;
    info!(
        "group {name} deleted by {username} ({} messages dropped)",
        removed.messages.len()
    );

    st.persist().await;

    // former members still online get a list without the group
    for member in &removed.members {
        st.refresh_chats(member);
    }
    Ok(())
}
