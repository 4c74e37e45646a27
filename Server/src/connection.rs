/*
Connection: one task per TCP client. Inbound frames are NDJSON lines
decoded by LinesCodec with a length cap; outbound envelopes go through a
bounded queue drained by a separate writer task, so whoever produces them
never waits on this peer's socket.
*/

use futures_util::{SinkExt, StreamExt};
use parlor_common::{parse_envelope, ProtocolError, ServerToClient, MAX_LINE_BYTES};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::{net::TcpStream, sync::mpsc, sync::watch, time::timeout};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::commands::dispatch;
use crate::server::stopped;
use crate::sessions::deliver;
use crate::state::{Rx, SharedState, Tx, OUTBOUND_QUEUE};

/// Longest a single envelope write may take before the peer is dropped.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection context handed to the command handlers.
#[derive(Debug)]
pub struct Conn {
    pub id: Uuid,
    /// Peer address as observed by the server.
    pub peer_ip: String,
    pub tx: Tx,
    username: Option<String>,
}

impl Conn {
    pub fn new(id: Uuid, peer_ip: String, tx: Tx) -> Self {
        Conn {
            id,
            peer_ip,
            tx,
            username: None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub(crate) fn set_username(&mut self, username: String) {
        self.username = Some(username);
    }

    pub fn label(&self) -> String {
        match &self.username {
            Some(name) => name.clone(),
            None => self.peer_ip.clone(),
        }
    }

    pub fn reply(&self, msg: ServerToClient) -> bool {
        deliver(&self.tx, msg, &self.label())
    }
}

pub async fn handle_conn(
    stream: TcpStream,
    state: SharedState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let peer = stream.peer_addr()?;
    let (reader, writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    let mut writer = FramedWrite::new(writer, LinesCodec::new());

    let (tx, mut rx): (Tx, Rx) = mpsc::channel(OUTBOUND_QUEUE);

    let mut writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let line = match serde_json::to_string(&msg) {
                Ok(s) => s,
                Err(e) => {
                    error!("serialize error: {e}");
                    continue;
                }
            };
            match timeout(WRITE_TIMEOUT, writer.send(line)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("write to {peer} failed: {e}");
                    break;
                }
                Err(_) => {
                    warn!("{peer} stalled for {WRITE_TIMEOUT:?}, dropping connection");
                    break;
                }
            }
        }
    });
    let mut writer_done = false;

    let mut conn = Conn::new(Uuid::new_v4(), peer.ip().to_string(), tx);
    info!("connection from {peer}");

    let result = loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_envelope(line) {
                        Ok(msg) => dispatch(msg, &mut conn, &state).await,
                        Err(e) => {
                            warn!("bad envelope from {}: {e}", conn.label());
                            conn.reply(ServerToClient::error(e.code(), e.to_string()));
                        }
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    // framing can't be trusted anymore
                    let e = ProtocolError::FrameTooLong;
                    warn!("{} sent an oversized frame, closing", conn.label());
                    conn.reply(ServerToClient::error(e.code(), e.to_string()));
                    break Ok(());
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
                    ) {
                        break Ok(());
                    }
                    break Err(anyhow::Error::from(e));
                }
                None => break Ok(()),
            },
            _ = &mut writer_task => {
                writer_done = true;
                break Ok(());
            }
            _ = stopped(&mut shutdown) => break Ok(()),
        }
    };

    // the registry entry goes away, chat history stays
    if let Some(name) = conn.username() {
        let mut st = state.write().await;
        if st.sessions.remove(name, conn.id) {
            info!("user {name} disconnected");
        }
    }
    info!("connection from {peer} closed");

    // let queued envelopes (e.g. a final error) reach the peer
    drop(conn);
    if !writer_done {
        let _ = timeout(WRITE_TIMEOUT, writer_task).await;
    }
    result
}
