use tracing::info;

use crate::error::PolicyViolation;
use crate::state::SharedState;
use crate::validation::validate_group_name;

pub async fn handle(
    group_name: String,
    new_name: String,
    username: &str,
    state: &SharedState,
) -> Result<(), PolicyViolation> {
    let name = validate_group_name(&group_name)?;
    let new_name = validate_group_name(&new_name)?;

    let mut st = state.write().await;
    let members: Vec<String> = st
        .chats
        .rename_group(name, new_name, username)?
        .members
        .iter()
        .cloned()
        .collect();
    info!("group {name} renamed to {new_name} by {username}");

    st.persist().await;

    for member in &members {
        st.refresh_chats(member);
    }
    Ok(())
}
