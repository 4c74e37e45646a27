use parlor_common::ServerToClient;

use crate::connection::Conn;
use crate::error::PolicyViolation;

pub fn handle(conn: &Conn) -> Result<(), PolicyViolation> {
    conn.reply(ServerToClient::Pong);
    Ok(())
}
