//! Session/state engine of the parlor chat relay: users register over a
//! TCP connection, exchange private and group messages, and the whole chat
//! model is snapshotted to disk after every change.

pub mod args;
pub mod commands;
pub mod connection;
pub mod console;
pub mod directory;
pub mod error;
pub mod logger;
pub mod pair;
pub mod persistence;
pub mod server;
pub mod sessions;
pub mod state;
pub mod store;
pub mod util;
pub mod validation;
